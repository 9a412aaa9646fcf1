//! Subscriber identity and the subscriber seam.
//!
//! A subscriber is any computation that depends on subjects: render
//! computations, computed values and user watchers. Subjects only ever talk
//! to subscribers through the [`Dependent`] trait.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Subject;
use crate::error::Result;

/// Unique identifier for a subscriber.
///
/// Ids are handed out from a process-wide counter, so a subscriber created
/// earlier always has a smaller id. The scheduler relies on this to run
/// parents before the children they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A computation that can subscribe to subjects.
pub trait Dependent {
    /// Get the subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Record that `subject` was read during the current evaluation.
    fn add_dep(self: Rc<Self>, subject: &Subject);

    /// Called by a subject when it changes.
    fn update(self: Rc<Self>) -> Result<()>;
}
