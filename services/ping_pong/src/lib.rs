//! Ping/pong demonstration node
//!
//! A pinger and a ponger actor exchange a handshake and then a fixed number
//! of pings through the actor dispatcher, either on the in-memory network,
//! on two loopback UDP sockets, or across two processes.

pub mod roles;
pub mod session;

pub use roles::PingReport;
pub use session::{run_in_memory, run_udp_local, run_udp_role};
