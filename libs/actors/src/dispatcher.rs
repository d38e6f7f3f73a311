//! # Actor Dispatcher
//!
//! Routes inbound datagrams to actors written as straight-line async
//! computations. Each actor suspends in [`ActorContext::recv`], publishing a
//! [`Restrictor`]; the dispatcher peeks at each datagram's action kind and
//! sender, offers it to the actors whose restrictor matches, and resumes them
//! synchronously.
//!
//! ```text
//! transport.try_receive() ─► peek kind ─► unknown? ─► Escalate | DropAndLog
//!                                │
//!                                ▼
//!                  decode once ─► malformed? ─► Dropped
//!                                │
//!             actors in registration order ─► restrictor.accepts(sender, kind)?
//!                                │                          │
//!                             matched                 none: unmatched handler
//!                                │
//!            earlier actors borrow, last one takes ownership ─► resume actor task
//! ```
//!
//! Actors run as tasks of an event [`Correlator`] owned by the dispatcher, so
//! besides their mailbox they can wait on application events keyed by `K`
//! carrying a `V`. [`Dispatcher::deliver`] resumes those waits; a timeout is
//! just such an event raced against a `recv`.

use crate::context::{ActorContext, Inbound, Mailbox};
use crate::correlator::Correlator;
use crate::error::{DispatchError, Result};
use crate::restrictor::Restrictor;
use crate::task::{TaskHandle, TaskObservers};
use network::Transport;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::hash::Hash;
use std::net::SocketAddr;
use std::rc::Rc;
use tracing::{debug, info, warn};
use types::{Action, ActionKind, Catalog};

/// How many matching actors receive one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePolicy {
    /// Every actor whose restrictor matches
    #[default]
    Broadcast,
    /// Only the earliest-registered matching actor
    FirstMatch,
}

/// What to do with a datagram whose action kind is not in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownActionPolicy {
    /// Stop the batch and return `DispatchError::UnknownAction`
    #[default]
    Escalate,
    DropAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub route_policy: RoutePolicy,
    pub unknown_action: UnknownActionPolicy,
    /// Upper bound on datagrams drained by one `poll_and_route`
    pub max_batch: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            route_policy: RoutePolicy::Broadcast,
            unknown_action: UnknownActionPolicy::Escalate,
            max_batch: 64,
        }
    }
}

/// Fate of one routed datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to this many actors
    Delivered(usize),
    /// Well-formed, but no actor was willing to take it
    Unmatched,
    /// Malformed or failed its integrity check
    Dropped,
    /// Unknown action kind, dropped under `DropAndLog`
    Unknown,
}

/// Tally of one `poll_and_route` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub delivered: usize,
    pub unmatched: usize,
    pub dropped: usize,
    pub unknown: usize,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub delivered: u64,
    pub unmatched: u64,
    pub dropped: u64,
    pub unknown: u64,
}

struct ActorEntry {
    name: Rc<str>,
    mailbox: Rc<Mailbox>,
    task: TaskHandle<()>,
}

/// Registry of actors sharing one transport
///
/// `K` and `V` type the application events actors can wait for.
pub struct Dispatcher<T: Transport + 'static, K = u64, V = ()> {
    transport: Rc<T>,
    catalog: Catalog,
    options: DispatchOptions,
    actors: Vec<ActorEntry>,
    stats: DispatchStats,
    // Declared last: actors' handles cancel into its arena while the
    // registry drops
    events: Correlator<K, V>,
}

impl<T: Transport + 'static> Dispatcher<T> {
    /// Dispatcher whose actors wait on `u64` keyed signals
    pub fn new(transport: T, catalog: Catalog, options: DispatchOptions) -> Self {
        Self::with_events(transport, catalog, options)
    }

    pub fn with_defaults(transport: T) -> Self {
        Self::new(transport, Catalog::default(), DispatchOptions::default())
    }
}

impl<T, K, V> Dispatcher<T, K, V>
where
    T: Transport + 'static,
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Dispatcher with application events of any key and value type
    pub fn with_events(transport: T, catalog: Catalog, options: DispatchOptions) -> Self {
        Self {
            transport: Rc::new(transport),
            catalog,
            options,
            actors: Vec::new(),
            stats: DispatchStats::default(),
            events: Correlator::new(),
        }
    }

    pub fn transport(&self) -> &Rc<T> {
        &self.transport
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Faults from actors registered without a fault observer
    pub fn unobserved_faults(&self) -> usize {
        self.events.unobserved_faults()
    }

    /// Resume every actor waiting on `key` for an event `value` satisfies
    ///
    /// Returns the number of waits resumed. Actors that finish as a result
    /// leave the registry.
    pub fn deliver(&mut self, key: &K, value: V) -> usize {
        let resumed = self.events.deliver(key, value);
        self.reap_finished();
        resumed
    }

    /// Actor waits parked under `key`
    pub fn pending_events(&self, key: &K) -> usize {
        self.events.pending_waits(key)
    }

    /// Start an actor and run it to its first suspension
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, entry: F) -> Result<()>
    where
        F: FnOnce(ActorContext<K, V>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.register_with(name, entry, TaskObservers::new())
    }

    pub fn register_with<F, Fut>(
        &mut self,
        name: impl Into<String>,
        entry: F,
        observers: TaskObservers<()>,
    ) -> Result<()>
    where
        F: FnOnce(ActorContext<K, V>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let name: Rc<str> = Rc::from(name.into());
        if self.contains(&name) {
            return Err(DispatchError::duplicate_actor(&*name));
        }

        let mailbox = Rc::new(Mailbox::default());
        let transport: Rc<dyn Transport> = self.transport.clone();
        let (actor, inbox, catalog) = (Rc::clone(&name), Rc::clone(&mailbox), self.catalog);
        let task = self.events.spawn(
            move |events| entry(ActorContext::new(actor, inbox, transport, catalog, events)),
            observers,
        );

        if task.is_finished() {
            info!("Actor {} finished during registration ({:?})", name, task.status());
            return Ok(());
        }
        info!(actor = %name, restrictor = %mailbox.restrictor(), "Registered actor");
        self.actors.push(ActorEntry {
            name,
            mailbox,
            task,
        });
        Ok(())
    }

    /// Destroy an actor without running any more of it
    pub fn remove(&mut self, name: &str) -> bool {
        match self.actors.iter().position(|actor| &*actor.name == name) {
            Some(index) => {
                let entry = self.actors.remove(index);
                info!("Removed actor {}", entry.name);
                drop(entry);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actors.iter().any(|actor| &*actor.name == name)
    }

    /// Registered actor names in registration order
    pub fn actor_names(&self) -> Vec<String> {
        self.actors.iter().map(|actor| actor.name.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Restrictor `name` currently publishes
    pub fn restrictor(&self, name: &str) -> Option<Restrictor> {
        self.actors
            .iter()
            .find(|actor| &*actor.name == name)
            .map(|actor| actor.mailbox.restrictor())
    }

    /// Offer one datagram to one actor
    ///
    /// Returns `Ok(false)` without consuming anything when the actor's
    /// restrictor does not match.
    pub fn try_accept(&mut self, name: &str, sender: SocketAddr, bytes: &[u8]) -> Result<bool> {
        let index = self
            .actors
            .iter()
            .position(|actor| &*actor.name == name)
            .ok_or_else(|| DispatchError::unknown_actor(name))?;

        let kind = self.known_kind(sender, bytes)?;
        if !self.actors[index].mailbox.accepts(sender, kind) {
            return Ok(false);
        }

        let catalog = self.catalog;
        let inbound = catalog.dispatch_by_value(sender, bytes, |sender, action| Inbound {
            sender,
            action,
        })?;
        self.hand_over(index, inbound);
        self.reap_finished();
        Ok(true)
    }

    /// Offer one datagram to every registered actor
    pub fn route(&mut self, sender: SocketAddr, bytes: &[u8]) -> Result<RouteOutcome> {
        self.stats.received += 1;

        let kind = match self.known_kind(sender, bytes) {
            Ok(kind) => kind,
            Err(DispatchError::UnknownAction { kind, sender }) => {
                self.stats.unknown += 1;
                match self.options.unknown_action {
                    UnknownActionPolicy::Escalate => {
                        return Err(DispatchError::UnknownAction { kind, sender })
                    }
                    UnknownActionPolicy::DropAndLog => {
                        warn!(%sender, kind, "Dropping datagram with unknown action kind");
                        return Ok(RouteOutcome::Unknown);
                    }
                }
            }
            Err(err) => {
                self.stats.dropped += 1;
                warn!(%sender, len = bytes.len(), error = %err, "Dropping malformed datagram");
                return Ok(RouteOutcome::Dropped);
            }
        };

        // Decoded before matching so only well-formed datagrams count as
        // unmatched
        let action = match self.catalog.decode(bytes) {
            Ok(action) => action,
            Err(err) => {
                self.stats.dropped += 1;
                warn!(%sender, %kind, error = %err, "Dropping datagram that failed to decode");
                return Ok(RouteOutcome::Dropped);
            }
        };

        let mut targets = self
            .actors
            .iter()
            .enumerate()
            .filter(|(_, actor)| actor.mailbox.accepts(sender, kind))
            .map(|(index, _)| index);
        let targets: Vec<usize> = match self.options.route_policy {
            RoutePolicy::Broadcast => targets.collect(),
            RoutePolicy::FirstMatch => targets.next().into_iter().collect(),
        };

        if targets.is_empty() {
            self.stats.unmatched += 1;
            debug!(%sender, %action, "No actor accepts datagram");
            return Ok(RouteOutcome::Unmatched);
        }

        let delivered = self.deliver_all(sender, action, &targets);
        self.stats.delivered += delivered as u64;
        self.reap_finished();
        Ok(RouteOutcome::Delivered(delivered))
    }

    /// Drain up to `max_batch` datagrams from the transport and route each
    ///
    /// `unmatched` sees every well-formed datagram no actor accepted. An
    /// escalated unknown action ends the batch; datagrams behind it stay
    /// queued.
    pub fn poll_and_route(
        &mut self,
        mut unmatched: impl FnMut(SocketAddr, &[u8]),
    ) -> Result<PollSummary> {
        let mut summary = PollSummary::default();
        while summary.received < self.options.max_batch {
            let Some((sender, bytes)) = self.transport.try_receive()? else {
                break;
            };
            summary.received += 1;
            match self.route(sender, &bytes)? {
                RouteOutcome::Delivered(count) => summary.delivered += count,
                RouteOutcome::Unmatched => {
                    summary.unmatched += 1;
                    unmatched(sender, &bytes);
                }
                RouteOutcome::Dropped => summary.dropped += 1,
                RouteOutcome::Unknown => summary.unknown += 1,
            }
        }
        Ok(summary)
    }

    fn known_kind(&self, sender: SocketAddr, bytes: &[u8]) -> Result<ActionKind> {
        let raw = self.catalog.peek_kind(bytes)?;
        ActionKind::try_from(raw).map_err(|_| DispatchError::UnknownAction { kind: raw, sender })
    }

    fn deliver_all(&mut self, sender: SocketAddr, action: Action, targets: &[usize]) -> usize {
        let kind = action.kind();
        let catalog = self.catalog;
        let mut owned = Some(action);
        let mut delivered = 0;

        for (position, &index) in targets.iter().enumerate() {
            // Resuming earlier actors cannot touch this mailbox, but a task
            // may have finished or been cancelled meanwhile
            if !self.actors[index].mailbox.accepts(sender, kind) {
                continue;
            }
            let inbound = if position + 1 == targets.len() {
                match owned.take() {
                    Some(action) => Inbound { sender, action },
                    None => continue,
                }
            } else {
                let Some(action) = owned.as_ref() else {
                    continue;
                };
                catalog.dispatch_by_ref(sender, action, |sender, action| Inbound {
                    sender,
                    action: action.clone(),
                })
            };
            self.hand_over(index, inbound);
            delivered += 1;
        }
        delivered
    }

    fn hand_over(&mut self, index: usize, inbound: Inbound) {
        let actor = &self.actors[index];
        debug!(actor = %actor.name, sender = %inbound.sender, action = %inbound.action, "Delivering");
        actor.mailbox.put(inbound);
        let task = actor.task.id();
        self.events.scheduler().resume(task);
    }

    fn reap_finished(&mut self) {
        self.actors.retain(|actor| {
            if actor.task.is_finished() {
                info!("Actor {} finished ({:?})", actor.name, actor.task.status());
                false
            } else {
                true
            }
        });
    }
}

impl<T, K, V> std::fmt::Debug for Dispatcher<T, K, V>
where
    T: Transport + 'static,
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("actors", &self.actor_names())
            .field("options", &self.options)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
