//! Computed values.
//!
//! A [`Computed`] is a lazy watcher: a dependency change only marks it
//! dirty, and the getter re-runs on the next read. Reading a computed value
//! inside another evaluation forwards all of its dependencies to the outer
//! subscriber, so the outer one re-runs when the computed value's inputs
//! change.

use std::fmt;

use super::{Runtime, Watcher};
use crate::error::Result;
use crate::value::Value;

/// A cached derived value.
#[derive(Clone)]
pub struct Computed {
    runtime: Runtime,
    watcher: Watcher,
}

impl Computed {
    pub(crate) fn new(runtime: Runtime, watcher: Watcher) -> Self {
        Self { runtime, watcher }
    }

    /// Current value, recomputed first if a dependency changed.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if self.runtime.stack().is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher)
            .finish()
    }
}
