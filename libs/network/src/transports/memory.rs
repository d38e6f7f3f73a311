//! In-process datagram fabric
//!
//! Endpoints get synthetic `127.0.0.1` addresses and exchange datagrams
//! through per-endpoint queues. Delivery is ordered and lossless unless the
//! destination is not bound, in which case the datagram vanishes as it would
//! on a real network.

use super::Transport;
use crate::{Result, TransportError};
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;
use tracing::{debug, trace};

const FIRST_PORT: u16 = 40_000;

type Queue = VecDeque<(SocketAddr, Bytes)>;

#[derive(Default)]
struct Fabric {
    next_port: u16,
    queues: HashMap<SocketAddr, Queue>,
    undeliverable: u64,
}

impl Fabric {
    fn allocate(&mut self) -> SocketAddr {
        loop {
            let port = FIRST_PORT.wrapping_add(self.next_port);
            self.next_port = self.next_port.wrapping_add(1);
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            if !self.queues.contains_key(&addr) {
                return addr;
            }
        }
    }

    fn push(&mut self, from: SocketAddr, to: SocketAddr, data: Bytes) {
        match self.queues.get_mut(&to) {
            Some(queue) => {
                trace!(%from, %to, bytes = data.len(), "memory datagram queued");
                queue.push_back((from, data));
            }
            None => {
                self.undeliverable += 1;
                debug!(%from, %to, "memory datagram to unbound address dropped");
            }
        }
    }
}

/// Shared in-process network; clones refer to the same fabric
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    fabric: Rc<RefCell<Fabric>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an endpoint at the next free synthetic address
    pub fn bind(&self) -> MemoryTransport {
        let mut fabric = self.fabric.borrow_mut();
        let addr = fabric.allocate();
        fabric.queues.insert(addr, Queue::new());
        MemoryTransport {
            fabric: Rc::clone(&self.fabric),
            addr,
        }
    }

    /// Bind an endpoint at a chosen address
    pub fn bind_at(&self, addr: SocketAddr) -> Result<MemoryTransport> {
        let mut fabric = self.fabric.borrow_mut();
        if fabric.queues.contains_key(&addr) {
            return Err(TransportError::AddressInUse { addr });
        }
        fabric.queues.insert(addr, Queue::new());
        Ok(MemoryTransport {
            fabric: Rc::clone(&self.fabric),
            addr,
        })
    }

    /// Queue a datagram that appears to come from `from`, bound or not
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        self.fabric
            .borrow_mut()
            .push(from, to, Bytes::copy_from_slice(data));
    }

    /// Datagrams waiting at `addr`
    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.fabric
            .borrow()
            .queues
            .get(&addr)
            .map_or(0, VecDeque::len)
    }

    /// Datagrams sent to addresses nobody had bound
    pub fn undeliverable(&self) -> u64 {
        self.fabric.borrow().undeliverable
    }
}

/// One endpoint of a [`MemoryNetwork`]; unbinds on drop
pub struct MemoryTransport {
    fabric: Rc<RefCell<Fabric>>,
    addr: SocketAddr,
}

impl MemoryTransport {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Transport for MemoryTransport {
    fn try_receive(&self) -> Result<Option<(SocketAddr, Bytes)>> {
        Ok(self
            .fabric
            .borrow_mut()
            .queues
            .get_mut(&self.addr)
            .and_then(VecDeque::pop_front))
    }

    fn send(&self, addr: SocketAddr, data: &[u8]) -> Result<()> {
        self.fabric
            .borrow_mut()
            .push(self.addr, addr, Bytes::copy_from_slice(data));
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.fabric.borrow_mut().queues.remove(&self.addr);
    }
}
