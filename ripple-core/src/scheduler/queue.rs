//! Watcher job queue.
//!
//! Watchers that are neither lazy nor `sync` queue themselves here when a
//! dependency changes. The queue deduplicates by id within a batch and is
//! flushed once per tick in ascending id order, so parents update before
//! the children they created and a watcher never runs twice for one batch
//! of changes.
//!
//! # Flushing
//!
//! 1. Sort the queue by subscriber id.
//! 2. Walk it by index. Each watcher's `before` hook runs, its id is
//!    released for re-queueing, then it runs.
//! 3. A watcher queued while the flush is in progress is inserted after the
//!    current position, in id order, and is still processed by this flush.
//! 4. A watcher that re-queues itself more than the configured number of
//!    times aborts the flush with [`ReactiveError::InfiniteUpdateLoop`] and
//!    the rest of the batch is discarded.
//! 5. A watcher whose run fails stops the flush too, but the watchers after
//!    it stay queued for the next flush.
//!
//! The queue is reset when the flush ends, however it ends.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{ReactiveError, Result};
use crate::reactive::watcher::WatcherBody;
use crate::reactive::SubscriberId;

/// Outcome of [`JobQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// Already queued for this batch.
    Duplicate,
    /// Added. `schedule` is set for the first watcher of a batch, meaning
    /// the caller must arrange for a flush.
    Queued { schedule: bool },
}

#[derive(Default)]
struct QueueState {
    queue: Vec<Rc<WatcherBody>>,
    has: HashSet<SubscriberId>,
    circular: HashMap<SubscriberId, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

#[derive(Default)]
pub(crate) struct JobQueue {
    state: RefCell<QueueState>,
}

impl JobQueue {
    pub(crate) fn enqueue(&self, watcher: Rc<WatcherBody>) -> Enqueued {
        let mut state = self.state.borrow_mut();
        let id = watcher.id();
        if !state.has.insert(id) {
            return Enqueued::Duplicate;
        }

        if state.flushing {
            // Splice in after the current position, keeping id order.
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].id() > id {
                at -= 1;
            }
            trace!(watcher = id.raw(), position = at, "queued during flush");
            state.queue.insert(at, watcher);
        } else {
            trace!(watcher = id.raw(), "queued");
            state.queue.push(watcher);
        }

        let schedule = !state.waiting;
        state.waiting = true;
        Enqueued::Queued { schedule }
    }

    /// Run every queued watcher. See the module docs for the ordering rules.
    pub(crate) fn flush(&self, max_update_count: usize) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.flushing {
                return Ok(());
            }
            state.flushing = true;
            state.queue.sort_by_key(|watcher| watcher.id());
            debug!(jobs = state.queue.len(), "flush start");
        }
        let mut reset = ResetOnDrop {
            queue: self,
            keep_tail: false,
        };

        loop {
            let watcher = {
                let state = self.state.borrow();
                match state.queue.get(state.index) {
                    Some(watcher) => watcher.clone(),
                    None => break,
                }
            };

            watcher.before_run();
            let id = watcher.id();
            self.state.borrow_mut().has.remove(&id);
            if let Err(err) = watcher.run() {
                reset.keep_tail = true;
                return Err(err);
            }

            let mut state = self.state.borrow_mut();
            if state.has.contains(&id) {
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                if *count > max_update_count {
                    return Err(ReactiveError::InfiniteUpdateLoop {
                        id,
                        expression: watcher.expression().to_owned(),
                        limit: max_update_count,
                    });
                }
            }
            state.index += 1;
        }

        debug!(jobs = self.state.borrow().index, "flush end");
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        let state = self.state.borrow();
        state.queue.len() - state.index.min(state.queue.len())
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.state.borrow().flushing
    }

    /// End a flush. With `keep_tail`, the watchers after the current
    /// position stay queued and the queue stays waiting for a flush.
    fn reset(&self, keep_tail: bool) {
        let mut state = self.state.borrow_mut();
        let tail = if keep_tail {
            let start = (state.index + 1).min(state.queue.len());
            state.queue.split_off(start)
        } else {
            Vec::new()
        };

        state.has = tail.iter().map(|watcher| watcher.id()).collect();
        state.waiting = !tail.is_empty();
        state.queue = tail;
        state.circular.clear();
        state.index = 0;
        state.flushing = false;
    }
}

struct ResetOnDrop<'a> {
    queue: &'a JobQueue,
    keep_tail: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.queue.reset(self.keep_tail);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::ReactiveError;
    use crate::reactive::{Runtime, WatchOptions};
    use crate::value::{Object, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn counter(runtime: &Runtime) -> Object {
        let object: Object = [("n", Value::from(0))].into_iter().collect();
        runtime.observe(&Value::from(object.clone()));
        object
    }

    #[test]
    fn batch_runs_each_watcher_once() {
        let runtime = Runtime::default();
        let object = counter(&runtime);
        let log = Rc::new(RefCell::new(Vec::new()));

        let _watcher = runtime
            .autorun({
                let object = object.clone();
                let log = log.clone();
                move || {
                    log.borrow_mut().push(object.get("n").unwrap_or_default());
                    Ok(())
                }
            })
            .unwrap();

        for n in 1..=5 {
            object.set("n", n).unwrap();
        }
        assert_eq!(runtime.pending_jobs(), 1);

        runtime.run_microtasks();
        assert_eq!(*log.borrow(), vec![Value::from(0), Value::from(5)]);
        assert_eq!(runtime.pending_jobs(), 0);
    }

    #[test]
    fn flush_runs_in_ascending_id_order() {
        let runtime = Runtime::default();
        let object = counter(&runtime);
        let order = Rc::new(RefCell::new(Vec::new()));

        let watchers: Vec<_> = (0..3)
            .map(|i| {
                runtime
                    .autorun({
                        let object = object.clone();
                        let order = order.clone();
                        move || {
                            object.get("n");
                            order.borrow_mut().push(i);
                            Ok(())
                        }
                    })
                    .unwrap()
            })
            .collect();
        order.borrow_mut().clear();

        object.set("n", 1).unwrap();
        runtime.run_microtasks();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        drop(watchers);
    }

    #[test]
    fn watchers_queued_during_flush_still_run() {
        let runtime = Runtime::default();
        let source = counter(&runtime);
        let target = counter(&runtime);
        let seen = Rc::new(RefCell::new(Vec::new()));

        // Created first, so it has the smaller id and runs first.
        let _forward = runtime
            .watch(
                {
                    let source = source.clone();
                    move || Ok(source.get("n").unwrap_or_default())
                },
                {
                    let target = target.clone();
                    move |new, _| target.set("n", new.clone())
                },
                WatchOptions::new(),
            )
            .unwrap();
        let _sink = runtime
            .watch(
                {
                    let target = target.clone();
                    move || Ok(target.get("n").unwrap_or_default())
                },
                {
                    let seen = seen.clone();
                    move |new, _| {
                        seen.borrow_mut().push(new.clone());
                        Ok(())
                    }
                },
                WatchOptions::new(),
            )
            .unwrap();

        source.set("n", 7).unwrap();
        runtime.run_microtasks();
        assert_eq!(*seen.borrow(), vec![Value::from(7)]);
    }

    #[test]
    fn before_hook_runs_ahead_of_each_run() {
        let runtime = Runtime::default();
        let object = counter(&runtime);
        let log = Rc::new(RefCell::new(Vec::new()));

        let _watcher = runtime
            .watch(
                {
                    let object = object.clone();
                    move || Ok(object.get("n").unwrap_or_default())
                },
                {
                    let log = log.clone();
                    move |_, _| {
                        log.borrow_mut().push("run");
                        Ok(())
                    }
                },
                WatchOptions::new().before({
                    let log = log.clone();
                    move || log.borrow_mut().push("before")
                }),
            )
            .unwrap();

        object.set("n", 1).unwrap();
        runtime.run_microtasks();
        assert_eq!(*log.borrow(), vec!["before", "run"]);
    }

    #[test]
    fn failed_run_keeps_later_watchers_queued() {
        let runtime = Runtime::default();
        let object = counter(&runtime);
        let errors = Rc::new(RefCell::new(Vec::new()));
        runtime.on_error({
            let errors = errors.clone();
            move |err, _| errors.borrow_mut().push(err.clone())
        });

        // Created first, so it runs first and fails on every re-run.
        let _failing = runtime
            .autorun({
                let object = object.clone();
                move || match object.get("n").and_then(|v| v.as_f64()) {
                    Some(n) if n > 0.0 => Err(ReactiveError::evaluation("render failed")),
                    _ => Ok(()),
                }
            })
            .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _healthy = runtime
            .autorun({
                let object = object.clone();
                let seen = seen.clone();
                move || {
                    seen.borrow_mut().push(object.get("n").unwrap_or_default());
                    Ok(())
                }
            })
            .unwrap();

        object.set("n", 2).unwrap();
        runtime.run_microtasks();

        assert_eq!(*seen.borrow(), vec![Value::from(0), Value::from(2)]);
        assert_eq!(
            *errors.borrow(),
            vec![ReactiveError::evaluation("render failed")]
        );
        assert_eq!(runtime.pending_jobs(), 0);
    }

    #[test]
    fn failed_run_in_sync_mode_still_runs_the_rest() {
        let runtime = Runtime::new(Config::synchronous());
        let object = counter(&runtime);
        runtime.on_error(|_, _| {});

        let _failing = runtime
            .autorun({
                let object = object.clone();
                move || match object.get("n").and_then(|v| v.as_f64()) {
                    Some(n) if n > 0.0 => Err(ReactiveError::evaluation("render failed")),
                    _ => Ok(()),
                }
            })
            .unwrap();
        let runs = Rc::new(RefCell::new(0));
        let _healthy = runtime
            .autorun({
                let object = object.clone();
                let runs = runs.clone();
                move || {
                    object.get("n");
                    *runs.borrow_mut() += 1;
                    Ok(())
                }
            })
            .unwrap();

        let err = object.set("n", 1).unwrap_err();
        assert_eq!(err, ReactiveError::evaluation("render failed"));
        assert_eq!(*runs.borrow(), 2);
        assert_eq!(runtime.pending_jobs(), 0);
    }

    #[test]
    fn runaway_cycle_aborts_the_flush() {
        let config = Config {
            max_update_count: 10,
            ..Config::synchronous()
        };
        let runtime = Runtime::new(config);
        let object = counter(&runtime);
        let reported = Rc::new(RefCell::new(Vec::new()));
        runtime.on_error({
            let reported = reported.clone();
            move |err, _| reported.borrow_mut().push(err.clone())
        });

        let _watcher = runtime
            .watch(
                {
                    let object = object.clone();
                    move || Ok(object.get("n").unwrap_or_default())
                },
                {
                    let object = object.clone();
                    move |new, _| object.set("n", new.as_f64().unwrap_or(0.0) + 1.0)
                },
                WatchOptions::new().label("n"),
            )
            .unwrap();

        let err = object.set("n", 1).unwrap_err();
        assert!(matches!(
            err,
            ReactiveError::InfiniteUpdateLoop { limit: 10, .. }
        ));
        assert_eq!(reported.borrow().len(), 1);

        // The queue was reset, so later changes are processed again.
        assert_eq!(runtime.pending_jobs(), 0);
    }
}
