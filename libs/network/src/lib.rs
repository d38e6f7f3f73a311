//! Network Infrastructure
//!
//! Datagram transports the actor dispatcher drains. Every transport is
//! non-blocking: `try_receive` returns `Ok(None)` when nothing is queued, and
//! `send` is best-effort, matching unreliable, unordered delivery.
//!
//! - [`UdpTransport`]: tokio `UdpSocket`
//! - [`MemoryNetwork`]: in-process fabric with synthetic loopback addresses

pub mod error;
pub mod transports;

pub use error::{Result, TransportError};
pub use transports::{
    MemoryNetwork, MemoryTransport, Transport, UdpConfig, UdpStats, UdpTransport,
    MAX_UDP_PAYLOAD,
};
