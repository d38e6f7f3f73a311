//! Correlator delivery, re-entrancy and cancellation behaviour

use actors::{Correlator, TaskObservers, TaskStatus};
use futures::future::{select, Either};
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

proptest! {
    /// N waits on one key, M of them with predicates that reject the value:
    /// exactly N - M resume and M stay pending
    #[test]
    fn rejecting_predicates_stay_pending(rejects in prop::collection::vec(any::<bool>(), 1..24)) {
        let correlator: Correlator<u32, u32> = Correlator::new();
        let resumed = Rc::new(Cell::new(0usize));

        let handles: Vec<_> = rejects
            .iter()
            .map(|&reject| {
                let resumed = Rc::clone(&resumed);
                correlator.spawn(
                    move |waiter| async move {
                        let value = waiter.wait_until(1, move |v: &u32| !reject || *v != 5).await;
                        resumed.set(resumed.get() + 1);
                        anyhow::Ok(value)
                    },
                    TaskObservers::new(),
                )
            })
            .collect();

        let rejecting = rejects.iter().filter(|&&r| r).count();
        let accepted = correlator.deliver(&1, 5);

        prop_assert_eq!(accepted, rejects.len() - rejecting);
        prop_assert_eq!(resumed.get(), rejects.len() - rejecting);
        prop_assert_eq!(correlator.pending_waits(&1), rejecting);
        for (handle, reject) in handles.iter().zip(&rejects) {
            let expected = if *reject { TaskStatus::Suspended } else { TaskStatus::Completed };
            prop_assert_eq!(handle.status(), expected);
        }
    }
}

#[test]
fn test_broadcast_in_registration_order() {
    let correlator: Correlator<&'static str, u64> = Correlator::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let _handles: Vec<_> = (0..3)
        .map(|n| {
            let order = Rc::clone(&order);
            correlator.spawn(
                move |waiter| async move {
                    let value = waiter.wait("tx").await;
                    order.borrow_mut().push((n, value));
                    anyhow::Ok(())
                },
                TaskObservers::new(),
            )
        })
        .collect();

    assert_eq!(correlator.deliver(&"tx", 9), 3);
    assert_eq!(*order.borrow(), vec![(0, 9), (1, 9), (2, 9)]);
    assert_eq!(correlator.live_tasks(), 0);
}

#[test]
fn test_reentrant_wait_on_same_key_is_not_resumed_twice() {
    let correlator: Correlator<u8, u32> = Correlator::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let handle = correlator.spawn(
        {
            let seen = Rc::clone(&seen);
            move |waiter| async move {
                loop {
                    let value = waiter.wait(0).await;
                    seen.borrow_mut().push(value);
                    if value == 3 {
                        return anyhow::Ok(());
                    }
                }
            }
        },
        TaskObservers::new(),
    );

    assert_eq!(correlator.deliver(&0, 1), 1);
    assert_eq!(*seen.borrow(), vec![1]);
    assert_eq!(correlator.pending_waits(&0), 1);

    assert_eq!(correlator.deliver(&0, 2), 1);
    assert_eq!(correlator.deliver(&0, 3), 1);
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    assert_eq!(handle.status(), TaskStatus::Completed);
}

#[test]
fn test_resumed_task_can_deliver_to_others() {
    let correlator: Correlator<&'static str, u32> = Correlator::new();
    let chain = Rc::new(RefCell::new(Vec::new()));

    let second = correlator.spawn(
        {
            let chain = Rc::clone(&chain);
            move |waiter| async move {
                let v = waiter.wait("second").await;
                chain.borrow_mut().push(("second", v));
                anyhow::Ok(())
            }
        },
        TaskObservers::new(),
    );
    let first = correlator.spawn(
        {
            let chain = Rc::clone(&chain);
            move |waiter| async move {
                let v = waiter.wait("first").await;
                chain.borrow_mut().push(("first", v));
                waiter.deliver(&"second", v * 10);
                chain.borrow_mut().push(("first-after", v));
                anyhow::Ok(())
            }
        },
        TaskObservers::new(),
    );

    correlator.deliver(&"first", 4);
    assert_eq!(
        *chain.borrow(),
        vec![("first", 4), ("second", 40), ("first-after", 4)]
    );
    assert!(first.is_finished() && second.is_finished());
}

#[test]
fn test_cancel_runs_no_more_code_and_drops_once() {
    let correlator: Correlator<u32, ()> = Correlator::new();
    let drops = Rc::new(Cell::new(0));
    let after_wait = Rc::new(Cell::new(false));

    let handle = correlator.spawn(
        {
            let (drops, after_wait) = (Rc::clone(&drops), Rc::clone(&after_wait));
            move |waiter| async move {
                let _resource = DropCounter(drops);
                waiter.wait(1).await;
                after_wait.set(true);
                anyhow::Ok(())
            }
        },
        TaskObservers::new(),
    );

    handle.cancel();
    assert_eq!(handle.status(), TaskStatus::Cancelled);
    assert_eq!(drops.get(), 1);
    assert_eq!(correlator.pending_total(), 0);
    assert_eq!(correlator.deliver(&1, ()), 0);
    assert!(!after_wait.get());

    drop(handle);
    drop(correlator);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_dropping_correlator_destroys_suspended_tasks() {
    let drops = Rc::new(Cell::new(0));
    let correlator: Correlator<u32, u32> = Correlator::new();
    for key in 0..4 {
        let drops = Rc::clone(&drops);
        correlator.spawn_detached(
            move |waiter| async move {
                let _resource = DropCounter(drops);
                waiter.wait(key).await;
                anyhow::Ok(())
            },
            TaskObservers::new(),
        );
    }
    assert_eq!(correlator.live_tasks(), 4);
    assert_eq!(correlator.pending_total(), 4);

    drop(correlator);
    assert_eq!(drops.get(), 4);
}

#[test]
fn test_observers_see_outcomes() {
    let correlator: Correlator<u8, i32> = Correlator::new();
    let completed = Rc::new(Cell::new(None));
    let faulted = Rc::new(RefCell::new(None));

    let ok = correlator.spawn(
        |waiter| async move { anyhow::Ok(waiter.wait(1).await * 2) },
        TaskObservers::new().on_complete({
            let completed = Rc::clone(&completed);
            move |value: &i32| completed.set(Some(*value))
        }),
    );
    let bad = correlator.spawn(
        |waiter| async move {
            let value = waiter.wait(2).await;
            anyhow::ensure!(value >= 0, "negative reading {value}");
            Ok(value)
        },
        TaskObservers::new().on_fault({
            let faulted = Rc::clone(&faulted);
            move |fault| *faulted.borrow_mut() = Some(fault.error().to_string())
        }),
    );

    correlator.deliver(&1, 21);
    correlator.deliver(&2, -1);

    assert_eq!(completed.get(), Some(42));
    assert_eq!(ok.take_result(), Some(42));
    assert_eq!(faulted.borrow().as_deref(), Some("negative reading -1"));
    assert_eq!(bad.status(), TaskStatus::Faulted);
    assert_eq!(correlator.unobserved_faults(), 0);
}

#[test]
fn test_unobserved_fault_is_counted() {
    let correlator: Correlator<u8, u8> = Correlator::new();
    let handle = correlator.spawn(
        |waiter| async move {
            waiter.wait(0).await;
            anyhow::bail!("no observer")
        },
        TaskObservers::<()>::new(),
    );
    correlator.deliver(&0, 0);
    assert_eq!(correlator.unobserved_faults(), 1);
    assert_eq!(
        handle.take_fault().map(|f| f.error().to_string()).as_deref(),
        Some("no observer")
    );
}

/// A reply races a separately delivered timeout through the same primitive
#[test]
fn test_reply_races_timeout() {
    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Reply(u32),
        Timeout,
    }

    let correlator: Correlator<u64, Event> = Correlator::new();
    let spawn_request = |tx: u64| {
        correlator.spawn(
            move |waiter| async move {
                let reply = waiter.wait_until(tx, |e| matches!(e, Event::Reply(_)));
                let timeout = waiter.wait_until(tx, |e| *e == Event::Timeout);
                let outcome = match select(reply, timeout).await {
                    Either::Left((event, _)) => event,
                    Either::Right((event, _)) => event,
                };
                anyhow::Ok(outcome)
            },
            TaskObservers::new(),
        )
    };

    let answered = spawn_request(1);
    let timed_out = spawn_request(2);
    assert_eq!(correlator.pending_total(), 4);

    correlator.deliver(&1, Event::Reply(7));
    correlator.deliver(&2, Event::Timeout);
    // Late events find nobody waiting
    assert_eq!(correlator.deliver(&1, Event::Timeout), 0);

    assert_eq!(answered.take_result(), Some(Event::Reply(7)));
    assert_eq!(timed_out.take_result(), Some(Event::Timeout));
    assert_eq!(correlator.pending_total(), 0);
}
