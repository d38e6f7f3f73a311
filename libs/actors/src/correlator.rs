//! # Event Correlator
//!
//! Lets a computation written as straight-line async code suspend until an
//! event with a given key arrives. Typical keys are transaction ids; values
//! are whatever the event carries.
//!
//! ```text
//! spawn(task) ──► task runs ──► waiter.wait(key) ──► parked in waits[key]
//!                                                          │
//! deliver(key, value) ─────── predicate(value)? ───────────┘──► task resumes
//! ```
//!
//! Delivery is broadcast: every pending wait under the key whose predicate
//! accepts the value receives its own clone, in registration order. Tasks are
//! resumed synchronously inside [`Correlator::deliver`].

use crate::task::{Scheduler, TaskHandle, TaskId, TaskObservers};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tracing::{debug, trace};

type Predicate<V> = Rc<dyn Fn(&V) -> bool>;
type ValueSlot<V> = Rc<RefCell<Option<V>>>;

struct PendingWait<V> {
    id: u64,
    task: TaskId,
    predicate: Option<Predicate<V>>,
    slot: ValueSlot<V>,
}

struct Inner<K, V> {
    waits: RefCell<HashMap<K, Vec<PendingWait<V>>>>,
    next_wait: Cell<u64>,
    scheduler: Scheduler,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn register(
        &self,
        key: K,
        task: TaskId,
        predicate: Option<Predicate<V>>,
    ) -> (u64, ValueSlot<V>) {
        let id = self.next_wait.get();
        self.next_wait.set(id + 1);
        let slot: ValueSlot<V> = Rc::new(RefCell::new(None));
        self.waits
            .borrow_mut()
            .entry(key)
            .or_default()
            .push(PendingWait {
                id,
                task,
                predicate,
                slot: Rc::clone(&slot),
            });
        (id, slot)
    }

    fn unregister(&self, key: &K, wait_id: u64) {
        let mut waits = self.waits.borrow_mut();
        if let Some(list) = waits.get_mut(key) {
            list.retain(|wait| wait.id != wait_id);
            if list.is_empty() {
                waits.remove(key);
            }
        }
    }

    fn deliver(&self, key: &K, value: V) -> usize {
        // Waits added while this delivery resumes tasks are not candidates
        let snapshot: Vec<u64> = match self.waits.borrow().get(key) {
            Some(list) => list.iter().map(|wait| wait.id).collect(),
            None => return 0,
        };

        let mut resumed = 0;
        for wait_id in snapshot {
            let predicate = {
                let waits = self.waits.borrow();
                let Some(wait) = waits
                    .get(key)
                    .and_then(|list| list.iter().find(|wait| wait.id == wait_id))
                else {
                    continue;
                };
                wait.predicate.clone()
            };
            if let Some(predicate) = predicate {
                if !predicate(&value) {
                    trace!(wait = wait_id, "Predicate rejected delivery");
                    continue;
                }
            }

            let Some(wait) = self.take_wait(key, wait_id) else {
                continue;
            };
            *wait.slot.borrow_mut() = Some(value.clone());
            self.scheduler.resume(wait.task);
            resumed += 1;
        }
        resumed
    }

    fn take_wait(&self, key: &K, wait_id: u64) -> Option<PendingWait<V>> {
        let mut waits = self.waits.borrow_mut();
        let list = waits.get_mut(key)?;
        let position = list.iter().position(|wait| wait.id == wait_id)?;
        let wait = list.remove(position);
        if list.is_empty() {
            waits.remove(key);
        }
        Some(wait)
    }
}

/// Keyed suspension points for single-threaded computations
pub struct Correlator<K, V> {
    inner: Rc<Inner<K, V>>,
}

impl<K, V> Default for Correlator<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Correlator<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                waits: RefCell::new(HashMap::new()),
                next_wait: Cell::new(0),
                scheduler: Scheduler::new(),
            }),
        }
    }

    /// Start `computation`, running it synchronously to its first suspension
    pub fn spawn<T, F, Fut>(&self, computation: F, observers: TaskObservers<T>) -> TaskHandle<T>
    where
        T: 'static,
        F: FnOnce(Waiter<K, V>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let inner = Rc::downgrade(&self.inner);
        self.inner.scheduler.spawn(
            move |task| computation(Waiter { inner, task }),
            observers,
        )
    }

    /// Start a computation that owns itself until it finishes
    pub fn spawn_detached<T, F, Fut>(&self, computation: F, observers: TaskObservers<T>) -> TaskId
    where
        T: 'static,
        F: FnOnce(Waiter<K, V>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let handle = self.spawn(computation, observers);
        let id = handle.id();
        handle.detach();
        id
    }

    /// Resume every pending wait under `key` that accepts `value`
    ///
    /// Returns the number of waits resumed.
    pub fn deliver(&self, key: &K, value: V) -> usize {
        let resumed = self.inner.deliver(key, value);
        debug!(resumed, "Delivered event");
        resumed
    }

    pub fn pending_waits(&self, key: &K) -> usize {
        self.inner.waits.borrow().get(key).map_or(0, Vec::len)
    }

    pub fn pending_total(&self) -> usize {
        self.inner.waits.borrow().values().map(Vec::len).sum()
    }

    pub fn live_tasks(&self) -> usize {
        self.inner.scheduler.live_tasks()
    }

    /// Faults that finished a task with no fault observer attached
    pub fn unobserved_faults(&self) -> usize {
        self.inner.scheduler.unobserved_faults()
    }

    /// Arena the correlator's tasks run in
    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }
}

impl<K, V> fmt::Debug for Correlator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("live_tasks", &self.inner.scheduler.live_tasks())
            .finish_non_exhaustive()
    }
}

/// A running computation's access to its correlator
pub struct Waiter<K, V> {
    inner: Weak<Inner<K, V>>,
    task: TaskId,
}

impl<K, V> Clone for Waiter<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
            task: self.task,
        }
    }
}

impl<K, V> Waiter<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Suspend until any value is delivered under `key`
    pub fn wait(&self, key: K) -> Wait<K, V> {
        self.wait_with(key, None)
    }

    /// Suspend until a value accepted by `predicate` is delivered under `key`
    pub fn wait_until(&self, key: K, predicate: impl Fn(&V) -> bool + 'static) -> Wait<K, V> {
        self.wait_with(key, Some(Rc::new(predicate)))
    }

    fn wait_with(&self, key: K, predicate: Option<Predicate<V>>) -> Wait<K, V> {
        Wait {
            inner: Weak::clone(&self.inner),
            task: self.task,
            state: WaitState::Unregistered { key, predicate },
        }
    }

    /// Deliver from inside a computation
    ///
    /// If the calling task is itself among the receivers it resumes once its
    /// current poll returns.
    pub fn deliver(&self, key: &K, value: V) -> usize {
        match self.inner.upgrade() {
            Some(inner) => inner.deliver(key, value),
            None => 0,
        }
    }
}

enum WaitState<K, V> {
    Unregistered {
        key: K,
        predicate: Option<Predicate<V>>,
    },
    Registered {
        key: K,
        wait_id: u64,
        slot: ValueSlot<V>,
    },
    Done,
}

/// Future returned by [`Waiter::wait`]; dropping it withdraws the wait
#[must_use = "a wait does nothing unless awaited"]
pub struct Wait<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    inner: Weak<Inner<K, V>>,
    task: TaskId,
    state: WaitState<K, V>,
}

// No field is ever pinned structurally
impl<K, V> Unpin for Wait<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
}

impl<K, V> Future for Wait<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    type Output = V;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<V> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.state, WaitState::Done) {
            WaitState::Unregistered { key, predicate } => {
                let Some(inner) = this.inner.upgrade() else {
                    return Poll::Pending;
                };
                let (wait_id, slot) = inner.register(key.clone(), this.task, predicate);
                this.state = WaitState::Registered { key, wait_id, slot };
                Poll::Pending
            }
            WaitState::Registered { key, wait_id, slot } => {
                let value = slot.borrow_mut().take();
                match value {
                    Some(value) => Poll::Ready(value),
                    None => {
                        this.state = WaitState::Registered { key, wait_id, slot };
                        Poll::Pending
                    }
                }
            }
            WaitState::Done => Poll::Pending,
        }
    }
}

impl<K, V> Drop for Wait<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn drop(&mut self) {
        if let WaitState::Registered { key, wait_id, .. } = &self.state {
            if let Some(inner) = self.inner.upgrade() {
                inner.unregister(key, *wait_id);
            }
        }
    }
}
