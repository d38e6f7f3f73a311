//! The two actors: a pinger that measures round trips and a ponger that
//! echoes them back

use actors::ActorContext;
use anyhow::{bail, ensure, Result};
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use types::{Action, ActionKind, HandshakeRequest, Ping};

pub const PINGER: &str = "pinger";
pub const PONGER: &str = "ponger";

/// Round-trip times seen by the pinger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingReport {
    pub rounds: u64,
    pub total_rtt: Duration,
    pub max_rtt: Duration,
}

impl PingReport {
    fn record(&mut self, rtt: Duration) {
        self.rounds += 1;
        self.total_rtt += rtt;
        self.max_rtt = self.max_rtt.max(rtt);
    }

    pub fn mean_rtt(&self) -> Duration {
        match u32::try_from(self.rounds) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(rounds) => self.total_rtt / rounds,
        }
    }
}

/// Handshake with `peer`, then send `rounds` pings and check each pong
pub async fn pinger(
    ctx: ActorContext,
    peer: SocketAddr,
    rounds: u64,
    report: Rc<RefCell<PingReport>>,
) -> Result<()> {
    ctx.send(peer, &HandshakeRequest::new().with_transaction(0).into())?;
    let ack = ctx
        .recv_kinds(&[ActionKind::HandshakeRequest], Some(peer))
        .await;
    debug!(actor = ctx.name(), %peer, ack = %ack.action, "Handshake complete");

    let started = Instant::now();
    for round in 0..rounds {
        let transaction = round + 1;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let ping = Ping::new(round, elapsed_ms).with_transaction(transaction);
        let sent_at = Instant::now();
        ctx.send(peer, &ping.into())?;

        let inbound = ctx.recv_kinds(&[ActionKind::Ping], Some(peer)).await;
        let Action::Ping(pong) = &inbound.action else {
            bail!("expected a ping back, got {}", inbound.action);
        };
        ensure!(
            pong.header.transaction_id == transaction && pong.ping_id == round,
            "{pong} does not answer round {round}"
        );
        ensure!(pong.ping_ms >= 0, "{pong} carries a negative clock");

        let rtt = sent_at.elapsed();
        debug!(round, rtt_us = rtt.as_micros() as u64, "Pong");
        report.borrow_mut().record(rtt);
    }
    info!(rounds, "Pinger done");
    Ok(())
}

/// Accept one handshake from anyone, then answer `rounds` pings from that
/// peer with the ponger's own clock
pub async fn ponger(ctx: ActorContext, rounds: u64) -> Result<()> {
    let hello = ctx.recv_kinds(&[ActionKind::HandshakeRequest], None).await;
    let peer = hello.sender;
    ctx.reply(&hello, HandshakeRequest::new())?;
    info!(actor = ctx.name(), %peer, "Accepted handshake");

    let started = Instant::now();
    for _ in 0..rounds {
        let inbound = ctx.recv_kinds(&[ActionKind::Ping], Some(peer)).await;
        let Action::Ping(ping) = &inbound.action else {
            bail!("restrictor let through {}", inbound.action);
        };
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        ctx.reply(&inbound, Ping::new(ping.ping_id, elapsed_ms))?;
    }
    info!(rounds, "Ponger done");
    Ok(())
}
