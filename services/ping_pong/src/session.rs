//! Drives dispatchers until both roles finish, a role faults, or the
//! network goes quiet

use crate::roles::{self, PingReport, PINGER, PONGER};
use actors::{Dispatcher, TaskObservers};
use anyhow::{anyhow, bail, Result};
use network::{MemoryNetwork, Transport, UdpConfig, UdpTransport};
use runtime_config::RuntimeConfig;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Collects results from the actors a session registers
#[derive(Default)]
struct Watch {
    report: Rc<RefCell<PingReport>>,
    faults: Rc<RefCell<Vec<String>>>,
}

impl Watch {
    fn observers(&self, actor: &'static str) -> TaskObservers<()> {
        let faults = Rc::clone(&self.faults);
        TaskObservers::new()
            .on_complete(move |_| info!("{} completed", actor))
            .on_fault(move |fault| {
                error!("{} faulted: {:#}", actor, fault.error());
                faults.borrow_mut().push(format!("{actor}: {:#}", fault.error()));
            })
    }

    fn check_faults(&self) -> Result<()> {
        let faults = self.faults.borrow();
        if faults.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("actor fault: {}", faults.join("; ")))
        }
    }

    fn finish(self, rounds: u64) -> Result<PingReport> {
        self.check_faults()?;
        let report = self.report.borrow().clone();
        if report.rounds != rounds {
            bail!("pinger finished {} of {} rounds", report.rounds, rounds);
        }
        Ok(report)
    }

    fn register_pinger<T: Transport + 'static>(
        &self,
        dispatcher: &mut Dispatcher<T>,
        peer: SocketAddr,
        rounds: u64,
    ) -> Result<()> {
        let report = Rc::clone(&self.report);
        dispatcher.register_with(
            PINGER,
            move |ctx| roles::pinger(ctx, peer, rounds, report),
            self.observers(PINGER),
        )?;
        Ok(())
    }

    fn register_ponger<T: Transport + 'static>(
        &self,
        dispatcher: &mut Dispatcher<T>,
        rounds: u64,
    ) -> Result<()> {
        dispatcher.register_with(
            PONGER,
            move |ctx| roles::ponger(ctx, rounds),
            self.observers(PONGER),
        )?;
        Ok(())
    }
}

fn pump<T: Transport + 'static>(dispatcher: &mut Dispatcher<T>) -> Result<()> {
    let catalog = dispatcher.catalog();
    dispatcher.poll_and_route(|sender, bytes| {
        warn!(%sender, datagram = %catalog.describe(bytes), "Unmatched datagram");
    })?;
    Ok(())
}

/// Both roles over one in-memory fabric, driven without a reactor
pub fn run_in_memory(config: &RuntimeConfig, rounds: u64) -> Result<PingReport> {
    let net = MemoryNetwork::new();
    let mut left = Dispatcher::new(net.bind(), config.catalog(), config.dispatch_options());
    let mut right = Dispatcher::new(net.bind(), config.catalog(), config.dispatch_options());
    let watch = Watch::default();

    watch.register_ponger(&mut right, rounds)?;
    watch.register_pinger(&mut left, right.transport().addr(), rounds)?;

    // Every exchange is one datagram each way
    for _ in 0..=(rounds + 1) * 2 {
        if left.is_empty() && right.is_empty() {
            break;
        }
        pump(&mut right)?;
        pump(&mut left)?;
        watch.check_faults()?;
    }
    if net.undeliverable() > 0 {
        warn!(count = net.undeliverable(), "Datagrams sent to unbound addresses");
    }
    watch.finish(rounds)
}

/// Both roles on two loopback UDP sockets in this process
pub async fn run_udp_local(
    config: &RuntimeConfig,
    rounds: u64,
    timeout: Duration,
) -> Result<PingReport> {
    let pinger_socket = UdpTransport::bind(config.udp_config()).await?;
    let ponger_socket = UdpTransport::bind(UdpConfig {
        bind_address: SocketAddr::new(config.transport.bind_address.ip(), 0),
        ..config.udp_config()
    })
    .await?;
    let ponger_addr = ponger_socket.local_addr()?;

    let mut left = Dispatcher::new(pinger_socket, config.catalog(), config.dispatch_options());
    let mut right = Dispatcher::new(ponger_socket, config.catalog(), config.dispatch_options());
    let watch = Watch::default();
    watch.register_ponger(&mut right, rounds)?;
    watch.register_pinger(&mut left, ponger_addr, rounds)?;

    while !(left.is_empty() && right.is_empty()) {
        tokio::select! {
            ready = left.transport().readable() => ready?,
            ready = right.transport().readable() => ready?,
            _ = tokio::time::sleep(timeout) => {
                bail!(
                    "no datagram within {:?}; waiting actors: {:?} {:?}",
                    timeout,
                    left.actor_names(),
                    right.actor_names()
                );
            }
        }
        pump(&mut left)?;
        pump(&mut right)?;
        watch.check_faults()?;
    }
    log_stats("pinger", left.transport());
    log_stats("ponger", right.transport());
    watch.finish(rounds)
}

/// One role on its own UDP socket, talking to a separate process
///
/// The pinger needs `peer`; the ponger learns its peer from the handshake.
pub async fn run_udp_role(
    config: &RuntimeConfig,
    peer: Option<SocketAddr>,
    rounds: u64,
    timeout: Duration,
) -> Result<Option<PingReport>> {
    let socket = UdpTransport::bind(config.udp_config()).await?;
    let mut dispatcher = Dispatcher::new(socket, config.catalog(), config.dispatch_options());
    let watch = Watch::default();

    match peer {
        Some(peer) => watch.register_pinger(&mut dispatcher, peer, rounds)?,
        None => watch.register_ponger(&mut dispatcher, rounds)?,
    }
    info!(
        addr = %dispatcher.transport().local_addr()?,
        actors = ?dispatcher.actor_names(),
        "Waiting for datagrams"
    );

    // The ponger waits indefinitely for its first handshake
    let mut started = peer.is_some();
    while !dispatcher.is_empty() {
        if started {
            tokio::time::timeout(timeout, dispatcher.transport().readable())
                .await
                .map_err(|_| anyhow!("no datagram within {:?}", timeout))??;
        } else {
            dispatcher.transport().readable().await?;
        }
        pump(&mut dispatcher)?;
        watch.check_faults()?;
        started = true;
    }
    log_stats("node", dispatcher.transport());

    match peer {
        Some(_) => watch.finish(rounds).map(Some),
        None => watch.check_faults().map(|()| None),
    }
}

fn log_stats(role: &str, transport: &UdpTransport) {
    let stats = transport.stats();
    info!(role, ?stats, "Socket counters");
}
