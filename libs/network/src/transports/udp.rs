//! UDP Network Transport Implementation
//!
//! One datagram carries exactly one encoded action, so there is no framing
//! beyond the datagram boundary itself. The socket is registered with the
//! tokio reactor; receive and send use the non-blocking `try_*` calls and
//! async drivers park on [`UdpTransport::readable`] between batches.

use super::Transport;
use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Largest payload an IPv4 UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// UDP transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Local address to bind to
    pub bind_address: SocketAddr,
    /// Maximum message size
    pub max_message_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_message_size: MAX_UDP_PAYLOAD,
        }
    }
}

/// UDP transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Oversize datagrams discarded on receive, or sends that would block
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    dropped: AtomicU64,
}

/// UDP transport for datagram communication
pub struct UdpTransport {
    config: UdpConfig,
    socket: UdpSocket,
    recv_buffer: Mutex<BytesMut>,
    counters: Counters,
}

impl UdpTransport {
    /// Bind a new UDP transport
    ///
    /// Must be called from within a tokio runtime context.
    pub async fn bind(config: UdpConfig) -> Result<Self> {
        if config.max_message_size > MAX_UDP_PAYLOAD {
            return Err(TransportError::configuration(
                format!("UDP max message size cannot exceed {MAX_UDP_PAYLOAD} bytes"),
                Some("max_message_size"),
            ));
        }
        if config.max_message_size == 0 {
            return Err(TransportError::configuration(
                "UDP max message size must be positive",
                Some("max_message_size"),
            ));
        }

        let socket = UdpSocket::bind(config.bind_address).await.map_err(|e| {
            TransportError::network_with_source(
                format!("Failed to bind UDP socket on {}", config.bind_address),
                e,
            )
        })?;

        // try_send_to only succeeds once the reactor has seen write readiness
        socket.writable().await.map_err(|e| {
            TransportError::network_with_source("UDP socket never became writable", e)
        })?;

        let local = socket.local_addr()?;
        info!(%local, max_message_size = config.max_message_size, "UDP transport listening");

        // One spare byte tells an exactly-full datagram from a truncated one
        let recv_buffer = BytesMut::zeroed(config.max_message_size + 1);

        Ok(Self {
            config,
            socket,
            recv_buffer: Mutex::new(recv_buffer),
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Wait until at least one datagram may be queued
    ///
    /// Readiness can be spurious; follow with `try_receive`.
    pub async fn readable(&self) -> Result<()> {
        self.socket
            .readable()
            .await
            .map_err(|e| TransportError::network_with_source("UDP readiness wait failed", e))
    }

    /// Get transport statistics
    pub fn stats(&self) -> UdpStats {
        UdpStats {
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Transport for UdpTransport {
    fn try_receive(&self) -> Result<Option<(SocketAddr, Bytes)>> {
        let mut buffer = self.recv_buffer.lock();
        loop {
            let (received, sender) = match self.socket.try_recv_from(&mut buffer[..]) {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => {
                    return Err(TransportError::network_with_source(
                        "Failed to receive UDP packet",
                        e,
                    ))
                }
            };

            if received > self.config.max_message_size {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%sender, max = self.config.max_message_size, "Dropping oversize UDP datagram");
                continue;
            }

            self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
            self.counters
                .bytes_received
                .fetch_add(received as u64, Ordering::Relaxed);
            debug!(%sender, bytes = received, "Received UDP packet");

            return Ok(Some((sender, Bytes::copy_from_slice(&buffer[..received]))));
        }
    }

    fn send(&self, addr: SocketAddr, data: &[u8]) -> Result<()> {
        if data.len() > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                max: self.config.max_message_size,
            });
        }

        match self.socket.try_send_to(data, addr) {
            Ok(sent) => {
                self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .bytes_sent
                    .fetch_add(sent as u64, Ordering::Relaxed);
                debug!(%addr, bytes = sent, "Sent UDP packet");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%addr, bytes = data.len(), "UDP send buffer full, datagram dropped");
                Ok(())
            }
            Err(e) => Err(TransportError::network_with_source(
                format!("Failed to send UDP packet to {addr}"),
                e,
            )),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to get local address", e))
    }
}
