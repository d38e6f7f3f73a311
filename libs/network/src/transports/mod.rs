//! Transport contract and implementations

use crate::Result;
use bytes::Bytes;
use std::net::SocketAddr;

pub mod memory;
pub mod udp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::{UdpConfig, UdpStats, UdpTransport, MAX_UDP_PAYLOAD};

/// Non-blocking datagram endpoint
pub trait Transport {
    /// Next queued datagram and its sender, or `None` when nothing is waiting
    fn try_receive(&self) -> Result<Option<(SocketAddr, Bytes)>>;

    /// Best-effort send; a dropped datagram is not an error
    fn send(&self, addr: SocketAddr, data: &[u8]) -> Result<()>;

    fn local_addr(&self) -> Result<SocketAddr>;
}
