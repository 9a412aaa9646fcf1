//! Deferred callbacks ("next tick").
//!
//! Callbacks queued through [`Runtime::next_tick`] are collected into a
//! burst. The first callback of a burst asks the [`MicrotaskHost`] to
//! schedule one flush; the flush runs every callback of the burst in FIFO
//! order. Callbacks queued while a flush runs start the next burst.
//!
//! [`Runtime::next_tick`]: crate::reactive::Runtime::next_tick

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tokio::task::LocalSet;

use crate::config::TickHost;
use crate::error::Result;

/// A deferred callback.
pub type TickCallback = Box<dyn FnOnce() -> Result<()>>;

/// Something that can run a closure at the next task boundary.
pub trait MicrotaskHost {
    /// Arrange for `flush` to run once, later, on the current thread.
    fn schedule(&self, flush: Box<dyn FnOnce()>);

    /// Run flushes the host parked for the embedder. Returns how many ran.
    fn run_parked(&self) -> usize {
        0
    }

    /// The tokio `LocalSet` the host's flushes are spawned on, if any.
    fn local_set(&self) -> Option<Rc<LocalSet>> {
        None
    }

    fn kind(&self) -> TickHost;
}

/// Parks flushes until [`Runtime::run_microtasks`] is called.
///
/// [`Runtime::run_microtasks`]: crate::reactive::Runtime::run_microtasks
#[derive(Default)]
pub struct ManualHost {
    parked: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parked(&self) -> usize {
        self.parked.borrow().len()
    }
}

impl MicrotaskHost for ManualHost {
    fn schedule(&self, flush: Box<dyn FnOnce()>) {
        self.parked.borrow_mut().push_back(flush);
    }

    /// Flushes parked while draining run in the same call.
    fn run_parked(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.parked.borrow_mut().pop_front();
            match next {
                Some(flush) => {
                    flush();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    fn kind(&self) -> TickHost {
        TickHost::Manual
    }
}

/// Runs flushes as tasks on a tokio `LocalSet` owned by the host.
///
/// Scheduling works anywhere on the thread, inside a `LocalSet` or not.
/// The flushes run while the set is driven, for example through
/// [`Runtime::run_until`].
///
/// [`Runtime::run_until`]: crate::reactive::Runtime::run_until
#[derive(Clone, Default)]
pub struct LocalSetHost {
    local: Rc<LocalSet>,
}

impl LocalSetHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn flushes onto a set the embedder already drives.
    pub fn with_set(local: Rc<LocalSet>) -> Self {
        Self { local }
    }
}

impl MicrotaskHost for LocalSetHost {
    fn schedule(&self, flush: Box<dyn FnOnce()>) {
        self.local.spawn_local(async move { flush() });
    }

    fn local_set(&self) -> Option<Rc<LocalSet>> {
        Some(self.local.clone())
    }

    fn kind(&self) -> TickHost {
        TickHost::LocalSet
    }
}

impl fmt::Debug for LocalSetHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSetHost").finish_non_exhaustive()
    }
}

pub(crate) struct TickQueue {
    callbacks: RefCell<Vec<TickCallback>>,
    pending: Cell<bool>,
    host: Box<dyn MicrotaskHost>,
}

impl TickQueue {
    pub(crate) fn new(host: Box<dyn MicrotaskHost>) -> Self {
        Self {
            callbacks: RefCell::new(Vec::new()),
            pending: Cell::new(false),
            host,
        }
    }

    /// Queue `callback`. Returns true when it opened a new burst and a
    /// flush has to be scheduled.
    pub(crate) fn push(&self, callback: TickCallback) -> bool {
        self.callbacks.borrow_mut().push(callback);
        !self.pending.replace(true)
    }

    /// Take the current burst, closing it.
    pub(crate) fn take(&self) -> Vec<TickCallback> {
        self.pending.set(false);
        std::mem::take(&mut *self.callbacks.borrow_mut())
    }

    pub(crate) fn host(&self) -> &dyn MicrotaskHost {
        self.host.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_first_callback_opens_a_burst() {
        let queue = TickQueue::new(Box::new(ManualHost::new()));
        assert!(queue.push(Box::new(|| Ok(()))));
        assert!(!queue.push(Box::new(|| Ok(()))));

        assert_eq!(queue.take().len(), 2);
        assert!(queue.push(Box::new(|| Ok(()))));
    }

    #[test]
    fn manual_host_drains_flushes_parked_while_draining() {
        let host = Rc::new(ManualHost::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        host.schedule(Box::new({
            let host = host.clone();
            let log = log.clone();
            move || {
                log.borrow_mut().push(1);
                let log = log.clone();
                host.schedule(Box::new(move || log.borrow_mut().push(2)));
            }
        }));

        assert_eq!(host.parked(), 1);
        assert_eq!(host.run_parked(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(host.run_parked(), 0);
    }

    #[test]
    fn hosts_report_their_kind() {
        assert_eq!(ManualHost::new().kind(), TickHost::Manual);
        assert_eq!(LocalSetHost::new().kind(), TickHost::LocalSet);
    }

    #[test]
    fn local_set_host_schedules_outside_a_local_set() {
        let host = LocalSetHost::new();
        let ran = Rc::new(Cell::new(false));
        host.schedule(Box::new({
            let ran = ran.clone();
            move || ran.set(true)
        }));
        assert!(!ran.get());

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let local = host.local_set().unwrap();
        rt.block_on(local.run_until(tokio::task::yield_now()));
        assert!(ran.get());
    }
}
