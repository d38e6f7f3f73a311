//! Actor routing over the in-memory network

use actors::{
    DispatchError, DispatchOptions, Dispatcher, Restrictor, RouteOutcome, RoutePolicy,
    TaskObservers, UnknownActionPolicy,
};
use futures::future::{self, Either};
use network::{MemoryNetwork, MemoryTransport, Transport};
use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use types::{Action, ActionKind, Catalog, HandshakeRequest, MessageHeader, Ping, TransferOk};

fn encode(action: impl Into<Action>) -> Vec<u8> {
    Catalog::default().encode(&action.into()).unwrap().to_vec()
}

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], port))
}

type Log = Rc<RefCell<Vec<String>>>;

/// Dispatcher with two actors: `pings` takes pings from `x` only, `handshakes`
/// takes handshakes from anyone. Each logs what it received.
fn two_actor_setup(
    x: SocketAddr,
    options: DispatchOptions,
) -> (MemoryNetwork, Dispatcher<MemoryTransport>, Log) {
    let net = MemoryNetwork::new();
    let mut dispatcher = Dispatcher::new(net.bind(), Catalog::default(), options);
    let log: Log = Rc::default();

    dispatcher
        .register("pings", {
            let log = Rc::clone(&log);
            move |ctx| async move {
                for _ in 0u64.. {
                    let inbound = ctx.recv_kinds(&[ActionKind::Ping], Some(x)).await;
                    log.borrow_mut().push(format!("pings:{}", inbound.action.kind()));
                }
                Ok(())
            }
        })
        .unwrap();
    dispatcher
        .register("handshakes", {
            let log = Rc::clone(&log);
            move |ctx| async move {
                for _ in 0u64.. {
                    let inbound = ctx.recv_kinds(&[ActionKind::HandshakeRequest], None).await;
                    log.borrow_mut()
                        .push(format!("handshakes:{}", inbound.action.kind()));
                }
                Ok(())
            }
        })
        .unwrap();
    (net, dispatcher, log)
}

#[test]
fn test_disjoint_restrictors_route_as_published() {
    let (x, y) = (peer(1), peer(2));
    let (net, mut dispatcher, log) = two_actor_setup(x, DispatchOptions::default());
    let unmatched = RefCell::new(Vec::new());

    assert_eq!(
        dispatcher.route(x, &encode(Ping::new(1, 1))).unwrap(),
        RouteOutcome::Delivered(1)
    );
    assert_eq!(
        dispatcher.route(y, &encode(HandshakeRequest::new())).unwrap(),
        RouteOutcome::Delivered(1)
    );

    let me = dispatcher.transport().addr();
    let ping_from_y = encode(Ping::new(2, 2));
    net.inject(y, me, &ping_from_y);
    let summary = dispatcher
        .poll_and_route(|sender, bytes| unmatched.borrow_mut().push((sender, bytes.to_vec())))
        .unwrap();

    assert_eq!(summary.received, 1);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(*unmatched.borrow(), vec![(y, ping_from_y)]);
    assert_eq!(
        *log.borrow(),
        vec!["pings:ping".to_string(), "handshakes:handshake-request".to_string()]
    );

    // The ping actor is still waiting on x
    assert_eq!(
        dispatcher.route(x, &encode(Ping::new(3, 3))).unwrap(),
        RouteOutcome::Delivered(1)
    );
    assert_eq!(dispatcher.stats().unmatched, 1);
}

#[test]
fn test_try_accept_leaves_rejected_message_unconsumed() {
    let x = peer(1);
    let (_net, mut dispatcher, log) = two_actor_setup(x, DispatchOptions::default());
    let handshake = encode(HandshakeRequest::new());

    assert!(!dispatcher.try_accept("pings", x, &handshake).unwrap());
    assert!(log.borrow().is_empty());
    assert!(dispatcher.try_accept("handshakes", x, &handshake).unwrap());
    assert_eq!(log.borrow().len(), 1);

    assert!(matches!(
        dispatcher.try_accept("nobody", x, &handshake),
        Err(DispatchError::UnknownActor { .. })
    ));
}

#[test]
fn test_unknown_action_escalates_without_touching_actors() {
    let x = peer(1);
    let (_net, mut dispatcher, log) = two_actor_setup(x, DispatchOptions::default());
    let before = dispatcher.restrictor("pings");

    let mut bogus = encode(Ping::new(1, 1));
    bogus[..4].copy_from_slice(&99u32.to_le_bytes());
    let me = dispatcher.transport().local_addr().unwrap();
    dispatcher.transport().send(me, &bogus).unwrap();
    dispatcher.transport().send(me, &encode(HandshakeRequest::new())).unwrap();

    let err = dispatcher.poll_and_route(|_, _| {}).unwrap_err();
    assert!(matches!(err, DispatchError::UnknownAction { kind: 99, .. }));
    assert!(log.borrow().is_empty());
    assert_eq!(dispatcher.restrictor("pings"), before);
    assert_eq!(dispatcher.stats().unknown, 1);

    // The datagram behind the unknown one is still queued
    let summary = dispatcher.poll_and_route(|_, _| {}).unwrap();
    assert_eq!(summary.delivered, 1);
}

#[test]
fn test_unknown_action_drop_and_log() {
    let options = DispatchOptions {
        unknown_action: UnknownActionPolicy::DropAndLog,
        ..DispatchOptions::default()
    };
    let (_net, mut dispatcher, _log) = two_actor_setup(peer(1), options);
    let mut bogus = encode(Ping::new(1, 1));
    bogus[..4].copy_from_slice(&0u32.to_le_bytes());

    assert_eq!(dispatcher.route(peer(1), &bogus).unwrap(), RouteOutcome::Unknown);
}

#[test]
fn test_corrupted_datagram_is_dropped_and_counted() {
    let x = peer(1);
    let (_net, mut dispatcher, log) = two_actor_setup(x, DispatchOptions::default());
    let mut bytes = encode(Ping::new(1, 1));
    bytes[MessageHeader::SIZE + 2] ^= 0x40;

    assert_eq!(dispatcher.route(x, &bytes).unwrap(), RouteOutcome::Dropped);
    assert_eq!(dispatcher.route(x, &bytes[..5]).unwrap(), RouteOutcome::Dropped);
    assert_eq!(dispatcher.stats().dropped, 2);
    assert!(log.borrow().is_empty());
    // Still waiting for a good ping
    assert_eq!(
        dispatcher.route(x, &encode(Ping::new(1, 1))).unwrap(),
        RouteOutcome::Delivered(1)
    );
}

#[test]
fn test_only_well_formed_datagrams_reach_unmatched_handler() {
    let net = MemoryNetwork::new();
    let mut dispatcher = Dispatcher::with_defaults(net.bind());
    let me = dispatcher.transport().addr();
    let good = encode(Ping::new(1, 1));
    let mut corrupted = good.clone();
    corrupted[MessageHeader::SIZE] ^= 0x01;

    net.inject(peer(1), me, &good[..4]);
    net.inject(peer(1), me, &good[..MessageHeader::SIZE + 3]);
    net.inject(peer(1), me, &corrupted);
    net.inject(peer(1), me, &good);

    let seen = RefCell::new(Vec::new());
    let summary = dispatcher
        .poll_and_route(|_, bytes| seen.borrow_mut().push(bytes.to_vec()))
        .unwrap();

    assert_eq!(summary.received, 4);
    assert_eq!(summary.dropped, 3);
    assert_eq!(summary.unmatched, 1);
    assert_eq!(*seen.borrow(), vec![good]);
    assert_eq!(dispatcher.stats().unmatched, 1);
}

const TIMEOUT: u64 = 7;

/// Actor that takes one datagram unless the timeout event fires first
fn register_racer(dispatcher: &mut Dispatcher<MemoryTransport>, log: &Log) {
    let log = Rc::clone(log);
    dispatcher
        .register("racer", move |ctx| async move {
            match future::select(ctx.recv_any(None), ctx.wait(TIMEOUT)).await {
                Either::Left((inbound, _)) => {
                    log.borrow_mut().push(format!("got:{}", inbound.action.kind()))
                }
                Either::Right(((), _)) => log.borrow_mut().push("timeout".to_string()),
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_recv_loses_race_to_delivered_timeout() {
    let net = MemoryNetwork::new();
    let mut dispatcher = Dispatcher::with_defaults(net.bind());
    let log: Log = Rc::default();
    register_racer(&mut dispatcher, &log);

    assert_eq!(dispatcher.restrictor("racer"), Some(Restrictor::any()));
    assert_eq!(dispatcher.pending_events(&TIMEOUT), 1);
    assert_eq!(dispatcher.deliver(&(TIMEOUT + 1), ()), 0);

    assert_eq!(dispatcher.deliver(&TIMEOUT, ()), 1);
    assert_eq!(*log.borrow(), vec!["timeout".to_string()]);
    assert!(dispatcher.is_empty());
    assert_eq!(dispatcher.pending_events(&TIMEOUT), 0);
    assert_eq!(
        dispatcher.route(peer(1), &encode(Ping::new(1, 1))).unwrap(),
        RouteOutcome::Unmatched
    );
}

#[test]
fn test_recv_wins_race_and_withdraws_timeout() {
    let net = MemoryNetwork::new();
    let mut dispatcher = Dispatcher::with_defaults(net.bind());
    let log: Log = Rc::default();
    register_racer(&mut dispatcher, &log);

    assert_eq!(
        dispatcher.route(peer(1), &encode(TransferOk::new(1, 2))).unwrap(),
        RouteOutcome::Delivered(1)
    );
    assert_eq!(*log.borrow(), vec!["got:transfer-ok".to_string()]);
    assert!(dispatcher.is_empty());
    assert_eq!(dispatcher.pending_events(&TIMEOUT), 0);
    assert_eq!(dispatcher.deliver(&TIMEOUT, ()), 0);
}

#[test]
fn test_actors_wait_on_typed_events() {
    let net = MemoryNetwork::new();
    let mut dispatcher: Dispatcher<_, &'static str, u32> =
        Dispatcher::with_events(net.bind(), Catalog::default(), DispatchOptions::default());
    let seen = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b"] {
        let seen = Rc::clone(&seen);
        dispatcher
            .register(name, move |ctx| async move {
                let level = ctx.wait_until("level", |v| *v >= 3).await;
                seen.borrow_mut().push((ctx.name().to_string(), level));
                Ok(())
            })
            .unwrap();
    }

    assert_eq!(dispatcher.deliver(&"level", 2), 0);
    assert_eq!(dispatcher.pending_events(&"level"), 2);
    assert_eq!(dispatcher.deliver(&"level", 5), 2);
    assert_eq!(
        *seen.borrow(),
        vec![("a".to_string(), 5), ("b".to_string(), 5)]
    );
    assert!(dispatcher.is_empty());
}

#[test]
fn test_broadcast_and_first_match() {
    for (policy, expected) in [(RoutePolicy::Broadcast, 2), (RoutePolicy::FirstMatch, 1)] {
        let net = MemoryNetwork::new();
        let options = DispatchOptions {
            route_policy: policy,
            ..DispatchOptions::default()
        };
        let mut dispatcher = Dispatcher::new(net.bind(), Catalog::default(), options);
        let hits = Rc::new(Cell::new(0));
        for name in ["first", "second"] {
            let hits = Rc::clone(&hits);
            dispatcher
                .register(name, move |ctx| async move {
                    ctx.recv(Restrictor::any()).await;
                    hits.set(hits.get() + 1);
                    Ok(())
                })
                .unwrap();
        }

        let outcome = dispatcher.route(peer(1), &encode(TransferOk::new(1, 2))).unwrap();
        assert_eq!(outcome, RouteOutcome::Delivered(expected));
        assert_eq!(hits.get(), expected);
        assert_eq!(dispatcher.len(), 2 - expected);
    }
}

#[test]
fn test_duplicate_and_remove() {
    let net = MemoryNetwork::new();
    let mut dispatcher = Dispatcher::with_defaults(net.bind());
    let dropped = Rc::new(Cell::new(false));

    struct SetOnDrop(Rc<Cell<bool>>);
    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    dispatcher
        .register("solo", {
            let guard = SetOnDrop(Rc::clone(&dropped));
            move |ctx| async move {
                let _guard = guard;
                ctx.recv_any(None).await;
                Ok(())
            }
        })
        .unwrap();
    assert!(matches!(
        dispatcher.register("solo", |_| async { Ok(()) }),
        Err(DispatchError::DuplicateActor { .. })
    ));
    assert_eq!(dispatcher.restrictor("solo"), Some(Restrictor::any()));

    assert!(dispatcher.remove("solo"));
    assert!(dropped.get());
    assert!(!dispatcher.remove("solo"));
    assert_eq!(
        dispatcher.route(peer(1), &encode(Ping::new(1, 1))).unwrap(),
        RouteOutcome::Unmatched
    );
}

#[test]
fn test_actor_fault_goes_to_observer() {
    let net = MemoryNetwork::new();
    let mut dispatcher = Dispatcher::with_defaults(net.bind());
    let fault = Rc::new(RefCell::new(None));

    dispatcher
        .register_with(
            "strict",
            |ctx| async move {
                let inbound = ctx.recv_any(None).await;
                anyhow::ensure!(
                    inbound.action.kind() == ActionKind::HandshakeRequest,
                    "expected handshake, got {}",
                    inbound.action
                );
                Ok(())
            },
            TaskObservers::new().on_fault({
                let fault = Rc::clone(&fault);
                move |f| *fault.borrow_mut() = Some(f.error().to_string())
            }),
        )
        .unwrap();

    dispatcher.route(peer(1), &encode(TransferOk::new(1, 2))).unwrap();
    assert!(fault.borrow().as_deref().unwrap().starts_with("expected handshake"));
    assert!(dispatcher.is_empty());
    assert_eq!(dispatcher.unobserved_faults(), 0);
}

#[test]
fn test_ping_pong_ten_rounds() {
    const ROUNDS: u64 = 10;
    let net = MemoryNetwork::new();
    let mut left = Dispatcher::with_defaults(net.bind());
    let mut right = Dispatcher::with_defaults(net.bind());
    let left_addr = left.transport().addr();
    let right_addr = right.transport().addr();
    let finished = Rc::new(Cell::new(0));

    let done = || {
        let finished = Rc::clone(&finished);
        TaskObservers::new().on_complete(move |_: &()| finished.set(finished.get() + 1))
    };

    right
        .register_with(
            "ponger",
            move |ctx| async move {
                for _ in 0..ROUNDS {
                    let inbound = ctx.recv_kinds(&[ActionKind::Ping], Some(left_addr)).await;
                    let Action::Ping(ping) = &inbound.action else {
                        anyhow::bail!("unexpected {}", inbound.action);
                    };
                    ctx.reply(&inbound, Ping::new(ping.ping_id, ping.ping_ms + 1))?;
                }
                Ok(())
            },
            done(),
        )
        .unwrap();

    left.register_with(
        "pinger",
        move |ctx| async move {
            for round in 0..ROUNDS {
                let ping = Ping::new(round, 1000 * round as i64).with_transaction(500 + round);
                ctx.send(right_addr, &ping.into())?;
                let inbound = ctx.recv_kinds(&[ActionKind::Ping], Some(right_addr)).await;
                anyhow::ensure!(inbound.action.transaction_id() == 500 + round);
                let Action::Ping(pong) = inbound.action else {
                    anyhow::bail!("not a ping");
                };
                anyhow::ensure!(pong.ping_id == round && pong.ping_ms == 1000 * round as i64 + 1);
            }
            Ok(())
        },
        done(),
    )
    .unwrap();

    for _ in 0..(4 * ROUNDS) {
        if left.is_empty() && right.is_empty() {
            break;
        }
        right.poll_and_route(|_, _| panic!("ponger missed a datagram")).unwrap();
        left.poll_and_route(|_, _| panic!("pinger missed a datagram")).unwrap();
    }

    assert_eq!(finished.get(), 2);
    assert!(left.is_empty() && right.is_empty());
    assert_eq!(left.unobserved_faults() + right.unobserved_faults(), 0);
    assert_eq!(left.stats().delivered, ROUNDS);
    assert_eq!(right.stats().delivered, ROUNDS);
    assert_eq!(net.pending(left_addr) + net.pending(right_addr), 0);
}
