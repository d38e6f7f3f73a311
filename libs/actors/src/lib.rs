//! # Weft Actors
//!
//! Single-threaded cooperative runtime for request/response logic written as
//! straight-line async code.
//!
//! - [`Correlator`]: suspend a computation until an event with a given key is
//!   delivered
//! - [`Dispatcher`]: route datagrams from a [`network::Transport`] to actors
//!   according to the [`Restrictor`] each one publishes while it waits, and
//!   deliver application events those actors wait on
//!
//! Everything here is `!Send`. Tasks advance only when the driving thread
//! delivers to them; there are no wakers, timers or background threads.
//!
//! # Examples
//!
//! ```rust
//! use actors::{Correlator, TaskObservers};
//!
//! let correlator: Correlator<u64, &'static str> = Correlator::new();
//! let handle = correlator.spawn(
//!     |waiter| async move { anyhow::Ok(waiter.wait(42).await) },
//!     TaskObservers::new(),
//! );
//!
//! assert_eq!(correlator.deliver(&42, "answer"), 1);
//! assert_eq!(handle.take_result(), Some("answer"));
//! ```

pub mod context;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod restrictor;
pub mod task;

pub use context::{ActorContext, Inbound, Recv};
pub use correlator::{Correlator, Wait, Waiter};
pub use dispatcher::{
    DispatchOptions, DispatchStats, Dispatcher, PollSummary, RouteOutcome, RoutePolicy,
    UnknownActionPolicy,
};
pub use error::{DispatchError, Result};
pub use restrictor::Restrictor;
pub use task::{TaskFault, TaskHandle, TaskId, TaskObservers, TaskStatus};
