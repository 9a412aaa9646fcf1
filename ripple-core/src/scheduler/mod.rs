//! Update Scheduler
//!
//! Re-computation is batched instead of running on every write. Two queues
//! cooperate:
//!
//! - the job queue collects watchers whose dependencies changed and runs
//!   them in ascending id order, once per batch;
//! - the tick queue collects deferred callbacks, including the job queue's
//!   own flush, and runs them together at the next task boundary provided
//!   by a [`MicrotaskHost`].

mod queue;
mod tick;

pub(crate) use queue::{Enqueued, JobQueue};
pub(crate) use tick::TickQueue;
pub use tick::{LocalSetHost, ManualHost, MicrotaskHost, TickCallback};
