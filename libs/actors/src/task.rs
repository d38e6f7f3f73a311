//! Suspended computations
//!
//! A task is a boxed future parked in a generational arena. Nothing here
//! registers wakers: a task makes progress only when something on the driving
//! thread calls [`Scheduler::resume`] for it (a correlator delivery, or the
//! dispatcher handing an actor a message). Polling uses a no-op waker.
//!
//! Destroying a task drops its future, which runs the destructors of whatever
//! it captured and nothing else.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::Context;
use thiserror::Error;
use tracing::{debug, warn};

type BoxedTask = Pin<Box<dyn Future<Output = ()>>>;
type StatusCell = Rc<Cell<TaskStatus>>;

/// Arena index plus generation, so a stale id never reaches a reused slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Parked at a suspension point
    Suspended,
    /// Currently being polled
    Running,
    Completed,
    Faulted,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Faulted | TaskStatus::Cancelled
        )
    }
}

/// Error a computation finished with, tagged with the task it came from
#[derive(Debug, Error)]
#[error("{task} faulted: {error:#}")]
pub struct TaskFault {
    task: TaskId,
    error: anyhow::Error,
}

impl TaskFault {
    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    pub fn into_error(self) -> anyhow::Error {
        self.error
    }
}

/// Callbacks run synchronously when a computation returns
pub struct TaskObservers<T> {
    on_complete: Option<Box<dyn FnOnce(&T)>>,
    on_fault: Option<Box<dyn FnOnce(&TaskFault)>>,
}

impl<T> Default for TaskObservers<T> {
    fn default() -> Self {
        Self {
            on_complete: None,
            on_fault: None,
        }
    }
}

impl<T> TaskObservers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&T) + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn on_fault(mut self, callback: impl FnOnce(&TaskFault) + 'static) -> Self {
        self.on_fault = Some(Box::new(callback));
        self
    }
}

enum SlotState {
    Vacant,
    Idle {
        future: BoxedTask,
        status: StatusCell,
    },
    /// Future is out of the arena while it is polled
    Running {
        repoll: bool,
        cancelled: bool,
        status: StatusCell,
    },
}

struct Slot {
    generation: u32,
    state: SlotState,
}

enum AfterPoll {
    Repoll(BoxedTask),
    Parked,
    Release(BoxedTask),
}

#[derive(Default)]
struct TaskArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    unobserved_faults: usize,
}

impl TaskArena {
    fn slot_mut(&mut self, id: TaskId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Claim a slot for a task that is about to be polled for the first time
    fn reserve(&mut self, status: StatusCell) -> TaskId {
        let state = SlotState::Running {
            repoll: false,
            cancelled: false,
            status,
        };
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.state = state;
                TaskId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    state,
                });
                TaskId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, id: TaskId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.state = SlotState::Vacant;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
            self.live -= 1;
        }
    }

    /// Take the future out for polling; a task already being polled is
    /// flagged to poll again once its current poll returns
    fn begin_poll(&mut self, id: TaskId) -> Option<BoxedTask> {
        let slot = self.slot_mut(id)?;
        match std::mem::replace(&mut slot.state, SlotState::Vacant) {
            SlotState::Idle { future, status } => {
                status.set(TaskStatus::Running);
                slot.state = SlotState::Running {
                    repoll: false,
                    cancelled: false,
                    status,
                };
                Some(future)
            }
            SlotState::Running {
                cancelled, status, ..
            } => {
                slot.state = SlotState::Running {
                    repoll: true,
                    cancelled,
                    status,
                };
                None
            }
            SlotState::Vacant => None,
        }
    }

    fn end_poll(&mut self, id: TaskId, finished: bool, future: BoxedTask) -> AfterPoll {
        let Some(slot) = self.slot_mut(id) else {
            return AfterPoll::Release(future);
        };
        let (repoll, cancelled, status) =
            match std::mem::replace(&mut slot.state, SlotState::Vacant) {
                SlotState::Running {
                    repoll,
                    cancelled,
                    status,
                } => (repoll, cancelled, status),
                other => {
                    slot.state = other;
                    return AfterPoll::Release(future);
                }
            };

        if finished || cancelled {
            if !finished {
                status.set(TaskStatus::Cancelled);
            }
            self.release(id);
            return AfterPoll::Release(future);
        }
        if repoll {
            slot.state = SlotState::Running {
                repoll: false,
                cancelled: false,
                status,
            };
            return AfterPoll::Repoll(future);
        }
        status.set(TaskStatus::Suspended);
        slot.state = SlotState::Idle { future, status };
        AfterPoll::Parked
    }

    /// Detach a task from the arena; the caller drops the returned future
    fn cancel(&mut self, id: TaskId) -> Option<BoxedTask> {
        let slot = self.slot_mut(id)?;
        match std::mem::replace(&mut slot.state, SlotState::Vacant) {
            SlotState::Idle { future, status } => {
                status.set(TaskStatus::Cancelled);
                self.release(id);
                Some(future)
            }
            SlotState::Running { repoll, status, .. } => {
                status.set(TaskStatus::Cancelled);
                slot.state = SlotState::Running {
                    repoll,
                    cancelled: true,
                    status,
                };
                None
            }
            SlotState::Vacant => None,
        }
    }

    fn drain(&mut self) -> Vec<BoxedTask> {
        let mut futures = Vec::new();
        for index in 0..self.slots.len() {
            let id = TaskId {
                index: index as u32,
                generation: self.slots[index].generation,
            };
            if let Some(future) = self.cancel(id) {
                futures.push(future);
            }
        }
        futures
    }
}

/// Owner of an arena of tasks; dropping it destroys every task still parked
pub(crate) struct Scheduler {
    arena: Rc<RefCell<TaskArena>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            arena: Rc::new(RefCell::new(TaskArena::default())),
        }
    }

    /// Start a computation and run it to its first suspension
    ///
    /// `build` receives the id the task will run under.
    pub(crate) fn spawn<T, Fut>(
        &self,
        build: impl FnOnce(TaskId) -> Fut,
        observers: TaskObservers<T>,
    ) -> TaskHandle<T>
    where
        T: 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let status: StatusCell = Rc::new(Cell::new(TaskStatus::Running));
        let id = self.arena.borrow_mut().reserve(Rc::clone(&status));
        let outcome = Rc::new(RefCell::new(Outcome::default()));

        let body = build(id);
        let task = run_to_outcome(
            id,
            body,
            observers,
            Rc::clone(&status),
            Rc::clone(&outcome),
            Rc::downgrade(&self.arena),
        );
        debug!(task = %id, "Spawned task");
        drive(&self.arena, id, Box::pin(task));

        TaskHandle {
            id,
            arena: Rc::downgrade(&self.arena),
            status,
            outcome,
            detached: false,
        }
    }

    /// Poll a parked task; returns `false` when the id no longer names one
    pub(crate) fn resume(&self, id: TaskId) -> bool {
        resume(&self.arena, id)
    }

    pub(crate) fn live_tasks(&self) -> usize {
        self.arena.borrow().live
    }

    pub(crate) fn unobserved_faults(&self) -> usize {
        self.arena.borrow().unobserved_faults
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let futures = self.arena.borrow_mut().drain();
        if !futures.is_empty() {
            debug!(count = futures.len(), "Destroying suspended tasks");
        }
        drop(futures);
    }
}

fn resume(arena: &Rc<RefCell<TaskArena>>, id: TaskId) -> bool {
    let future = arena.borrow_mut().begin_poll(id);
    match future {
        Some(future) => {
            drive(arena, id, future);
            true
        }
        None => false,
    }
}

fn drive(arena: &Rc<RefCell<TaskArena>>, id: TaskId, mut future: BoxedTask) {
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    loop {
        let finished = future.as_mut().poll(&mut cx).is_ready();
        let next = arena.borrow_mut().end_poll(id, finished, future);
        match next {
            AfterPoll::Repoll(f) => future = f,
            AfterPoll::Parked => return,
            // Dropped here, outside the arena borrow: destructors may cancel
            // other tasks
            AfterPoll::Release(f) => {
                drop(f);
                return;
            }
        }
    }
}

struct Outcome<T> {
    value: Option<T>,
    fault: Option<TaskFault>,
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self {
            value: None,
            fault: None,
        }
    }
}

async fn run_to_outcome<T, Fut>(
    id: TaskId,
    body: Fut,
    observers: TaskObservers<T>,
    status: StatusCell,
    outcome: Rc<RefCell<Outcome<T>>>,
    arena: Weak<RefCell<TaskArena>>,
) where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match body.await {
        Ok(value) => {
            if let Some(callback) = observers.on_complete {
                callback(&value);
            }
            outcome.borrow_mut().value = Some(value);
            status.set(TaskStatus::Completed);
            debug!(task = %id, "Task completed");
        }
        Err(error) => {
            let fault = TaskFault { task: id, error };
            match observers.on_fault {
                Some(callback) => callback(&fault),
                None => {
                    warn!(task = %id, error = %fault, "Task faulted with no fault observer");
                    if let Some(arena) = arena.upgrade() {
                        arena.borrow_mut().unobserved_faults += 1;
                    }
                }
            }
            outcome.borrow_mut().fault = Some(fault);
            status.set(TaskStatus::Faulted);
        }
    }
}

/// Owning handle to a spawned task
///
/// Dropping the handle cancels the task unless it was detached.
#[must_use = "dropping a TaskHandle cancels the task; call detach() to let it run"]
pub struct TaskHandle<T> {
    id: TaskId,
    arena: Weak<RefCell<TaskArena>>,
    status: StatusCell,
    outcome: Rc<RefCell<Outcome<T>>>,
    detached: bool,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status.get()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Value the computation returned, once
    pub fn take_result(&self) -> Option<T> {
        self.outcome.borrow_mut().value.take()
    }

    /// Fault the computation returned, once
    pub fn take_fault(&self) -> Option<TaskFault> {
        self.outcome.borrow_mut().fault.take()
    }

    /// Destroy the task without running any more of its body
    ///
    /// A task cancelling itself finishes its current poll first.
    pub fn cancel(&self) {
        if self.is_finished() {
            return;
        }
        let future = match self.arena.upgrade() {
            Some(arena) => arena.borrow_mut().cancel(self.id),
            None => None,
        };
        self.status.set(TaskStatus::Cancelled);
        if future.is_some() {
            debug!(task = %self.id, "Task cancelled");
        }
        drop(future);
    }

    /// Let the task run on without an owner
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.cancel();
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("detached", &self.detached)
            .finish()
    }
}
