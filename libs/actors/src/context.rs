//! What an actor computation sees of the dispatcher
//!
//! Besides its mailbox an actor can park on application events delivered
//! through [`Dispatcher::deliver`](crate::Dispatcher::deliver). Racing the two
//! expresses a receive with a timeout:
//!
//! ```rust,ignore
//! match future::select(ctx.recv_any(None), ctx.wait(TIMEOUT_EVENT)).await {
//!     Either::Left((inbound, _)) => handle(inbound),
//!     Either::Right(((), _)) => give_up(),
//! }
//! ```

use crate::correlator::{Wait, Waiter};
use crate::error::Result;
use crate::restrictor::Restrictor;
use network::Transport;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::net::SocketAddr;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::debug;
use types::{Action, ActionKind, Catalog};

/// A decoded action together with the peer that sent it
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub sender: SocketAddr,
    pub action: Action,
}

/// Hand-off point between the dispatcher and one suspended actor
#[derive(Default)]
pub(crate) struct Mailbox {
    restrictor: RefCell<Restrictor>,
    inbox: RefCell<Option<Inbound>>,
}

impl Mailbox {
    pub(crate) fn restrictor(&self) -> Restrictor {
        self.restrictor.borrow().clone()
    }

    pub(crate) fn accepts(&self, sender: SocketAddr, kind: ActionKind) -> bool {
        self.inbox.borrow().is_none() && self.restrictor.borrow().accepts(sender, kind)
    }

    /// Store a message for the actor and close the mailbox until it asks again
    pub(crate) fn put(&self, inbound: Inbound) {
        *self.restrictor.borrow_mut() = Restrictor::AcceptNothing;
        *self.inbox.borrow_mut() = Some(inbound);
    }
}

/// Handle given to an actor's entry computation
///
/// `K` and `V` are the key and value types of the application events the
/// actor may wait for.
pub struct ActorContext<K = u64, V = ()> {
    name: Rc<str>,
    mailbox: Rc<Mailbox>,
    transport: Rc<dyn Transport>,
    catalog: Catalog,
    events: Waiter<K, V>,
}

impl<K, V> Clone for ActorContext<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Rc::clone(&self.name),
            mailbox: Rc::clone(&self.mailbox),
            transport: Rc::clone(&self.transport),
            catalog: self.catalog,
            events: self.events.clone(),
        }
    }
}

impl<K, V> ActorContext<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub(crate) fn new(
        name: Rc<str>,
        mailbox: Rc<Mailbox>,
        transport: Rc<dyn Transport>,
        catalog: Catalog,
        events: Waiter<K, V>,
    ) -> Self {
        Self {
            name,
            mailbox,
            transport,
            catalog,
            events,
        }
    }

    /// Suspend until an application event is delivered under `key`
    pub fn wait(&self, key: K) -> Wait<K, V> {
        self.events.wait(key)
    }

    /// Suspend until an event accepted by `predicate` is delivered under `key`
    pub fn wait_until(&self, key: K, predicate: impl Fn(&V) -> bool + 'static) -> Wait<K, V> {
        self.events.wait_until(key, predicate)
    }

    /// Deliver an application event to every actor of this dispatcher
    ///
    /// The calling actor, if among the receivers, resumes once its current
    /// poll returns.
    pub fn deliver(&self, key: &K, value: V) -> usize {
        self.events.deliver(key, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Suspend until the dispatcher hands over a message `restrictor` accepts
    ///
    /// An actor has one mailbox: only one `recv` may be outstanding at a time.
    pub fn recv(&self, restrictor: Restrictor) -> Recv {
        Recv {
            mailbox: Rc::clone(&self.mailbox),
            restrictor: Some(restrictor),
            published: false,
        }
    }

    pub fn recv_kinds(&self, kinds: &[ActionKind], from: Option<SocketAddr>) -> Recv {
        self.recv(Restrictor::AcceptKinds {
            kinds: kinds.iter().copied().collect(),
            from,
        })
    }

    pub fn recv_any(&self, from: Option<SocketAddr>) -> Recv {
        self.recv(Restrictor::AcceptAny { from })
    }

    /// Encode and send an action; delivery is best-effort
    pub fn send(&self, to: SocketAddr, action: &Action) -> Result<()> {
        let bytes = self.catalog.encode(action)?;
        debug!(actor = %self.name, %to, %action, "Sending");
        self.transport.send(to, &bytes)?;
        Ok(())
    }

    /// Answer `inbound` on the same transaction
    pub fn reply(&self, inbound: &Inbound, action: impl Into<Action>) -> Result<()> {
        let mut action = action.into();
        action.header_mut().transaction_id = inbound.action.transaction_id();
        self.send(inbound.sender, &action)
    }
}

impl<K, V> fmt::Debug for ActorContext<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorContext")
            .field("name", &self.name)
            .field("restrictor", &self.mailbox.restrictor())
            .finish_non_exhaustive()
    }
}

/// Future returned by [`ActorContext::recv`]
#[must_use = "recv does nothing unless awaited"]
pub struct Recv {
    mailbox: Rc<Mailbox>,
    restrictor: Option<Restrictor>,
    published: bool,
}

impl Future for Recv {
    type Output = Inbound;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Inbound> {
        let this = self.get_mut();
        if let Some(restrictor) = this.restrictor.take() {
            *this.mailbox.restrictor.borrow_mut() = restrictor;
            this.published = true;
            return Poll::Pending;
        }
        let delivered = this.mailbox.inbox.borrow_mut().take();
        match delivered {
            Some(inbound) => {
                this.published = false;
                Poll::Ready(inbound)
            }
            None => Poll::Pending,
        }
    }
}

impl Drop for Recv {
    fn drop(&mut self) {
        if self.published {
            *self.mailbox.restrictor.borrow_mut() = Restrictor::AcceptNothing;
            self.mailbox.inbox.borrow_mut().take();
        }
    }
}
