//! Reactive Runtime
//!
//! The runtime is the central coordinator. It owns everything that the
//! subjects, observers and watchers of one application share:
//!
//! - the configuration;
//! - the active subscriber stack used for dependency collection;
//! - the job queue and the tick queue of the scheduler;
//! - the error hook that user-code failures are reported to.
//!
//! # How It Works
//!
//! 1. `observe()` installs a [`TrackedProperty`] on every key of the state
//!    tree and a structural subject on every container.
//!
//! 2. `watch()`, `autorun()` and `computed()` create watchers. Evaluating a
//!    watcher pushes it on the stack, so every tracked read registers the
//!    read property's subject with it.
//!
//! 3. A write to a tracked property notifies its subject. Subscribed
//!    watchers queue themselves, and the queue is flushed once at the next
//!    tick (or immediately with `Config::sync`).
//!
//! # Threading
//!
//! A runtime is single-threaded (`Rc`/`RefCell` throughout). Create one per
//! thread if needed; state observed by one runtime must not be mixed into
//! another.
//!
//! [`TrackedProperty`]: crate::observer::TrackedProperty

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::context::ActiveStack;
use super::path;
use super::watcher::{WatchCallback, WatchGetter, WatchOptions, Watcher, WatcherBody};
use super::Computed;
use crate::config::{Config, TickHost};
use crate::error::{ReactiveError, Result};
use crate::observer::{self, Observer, TrackedProperty};
use crate::scheduler::{Enqueued, JobQueue, LocalSetHost, ManualHost, MicrotaskHost, TickQueue};
use crate::value::{Key, Object, SlotRef, Value};

type ErrorHandler = Rc<dyn Fn(&ReactiveError, &str)>;

struct RuntimeInner {
    config: Config,
    stack: ActiveStack,
    jobs: JobQueue,
    ticks: TickQueue,
    error_handler: RefCell<Option<ErrorHandler>>,
    observing: Cell<bool>,
}

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime, picking the tick host named by `config`.
    ///
    /// `TickHost::LocalSet` needs a tokio runtime on the current thread. If
    /// there is none, the runtime falls back to the manual host. Otherwise
    /// flushes are spawned on a `LocalSet` owned by the runtime and run
    /// while [`run_until`](Self::run_until) drives it.
    pub fn new(config: Config) -> Self {
        let host: Box<dyn MicrotaskHost> = match config.tick_host {
            TickHost::Manual => Box::new(ManualHost::new()),
            TickHost::LocalSet => match tokio::runtime::Handle::try_current() {
                Ok(_) => Box::new(LocalSetHost::new()),
                Err(err) => {
                    debug!(%err, "no tokio runtime, falling back to the manual tick host");
                    Box::new(ManualHost::new())
                }
            },
        };
        Self::with_host(config, host)
    }

    /// Create a runtime with a caller-provided tick host.
    pub fn with_host(config: Config, host: Box<dyn MicrotaskHost>) -> Self {
        debug!(host = ?host.kind(), sync = config.sync, "runtime created");
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                stack: ActiveStack::new(),
                jobs: JobQueue::default(),
                ticks: TickQueue::new(host),
                error_handler: RefCell::new(None),
                observing: Cell::new(true),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn stack(&self) -> &ActiveStack {
        &self.inner.stack
    }

    /// The tick host actually in use.
    pub fn tick_host(&self) -> TickHost {
        self.inner.ticks.host().kind()
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Whether new values get observed.
    pub fn is_observing(&self) -> bool {
        self.inner.observing.get()
    }

    /// Toggle observation of new values. Containers observed already stay
    /// observed.
    pub fn set_observing(&self, observing: bool) {
        self.inner.observing.set(observing);
    }

    /// Make `value` trackable. Returns the container's observer, or `None`
    /// for primitives and containers that cannot be observed.
    pub fn observe(&self, value: &Value) -> Option<Rc<Observer>> {
        observer::observe(self, value, false)
    }

    /// Observe `value` as a state root. Keys cannot be added to or removed
    /// from a root afterwards.
    pub fn observe_root(&self, value: &Value) -> Option<Rc<Observer>> {
        observer::observe(self, value, true)
    }

    /// Observe `value` and hand it back.
    pub fn observable(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        self.observe(&value);
        value
    }

    /// Intercept a single property. See [`TrackedProperty`].
    ///
    /// When the key is already intercepted, an explicit `value` is written
    /// through the existing property, notifying its subscribers.
    pub fn define_reactive(
        &self,
        object: &Object,
        key: &str,
        value: Option<Value>,
        shallow: bool,
    ) -> Result<Option<Rc<TrackedProperty>>> {
        if let Some(value) = &value {
            if let Some(SlotRef::Tracked(property)) = object.slot(key) {
                property.set(value.clone())?;
                return Ok(Some(property));
            }
        }
        Ok(observer::define_reactive(self, object, key, value, shallow))
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    /// Watch the value produced by `getter` and call `callback` with
    /// `(new, old)` whenever it changes.
    ///
    /// Errors from the getter or the callback are reported through the
    /// error hook.
    pub fn watch<G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Result<Watcher>
    where
        G: Fn() -> Result<Value> + 'static,
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        self.user_watcher(Box::new(getter), Box::new(callback), options)
    }

    /// Watch a dot-delimited path below `target`, e.g. `"user.name"`.
    ///
    /// An invalid path is warned about and watches `Null`.
    pub fn watch_path<C>(
        &self,
        target: &Object,
        path: &str,
        callback: C,
        options: WatchOptions,
    ) -> Result<Watcher>
    where
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        let getter: WatchGetter = match path::parse_path(path) {
            Some(segments) => {
                let target = target.clone();
                Box::new(move || Ok(path::resolve(&target, &segments)))
            }
            None => {
                self.warn(&format!(
                    "Failed watching path: \"{path}\". Only simple dot-delimited paths are supported."
                ));
                Box::new(|| Ok(Value::Null))
            }
        };

        let options = WatchOptions {
            label: options.label.clone().or_else(|| Some(path.to_owned())),
            ..options
        };
        self.user_watcher(getter, Box::new(callback), options)
    }

    fn user_watcher(
        &self,
        getter: WatchGetter,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> Result<Watcher> {
        let watcher = Watcher::new(self, getter, Some(callback), &options, true)?;
        if options.immediate {
            watcher.fire_immediately();
        }
        Ok(watcher)
    }

    /// Run `f` now and again whenever anything it read changes.
    ///
    /// This is a render-style computation: errors are returned from the
    /// first run and from the flush that re-runs it.
    pub fn autorun<F>(&self, f: F) -> Result<Watcher>
    where
        F: Fn() -> Result<()> + 'static,
    {
        Watcher::new(
            self,
            Box::new(move || {
                f()?;
                Ok(Value::Null)
            }),
            None,
            &WatchOptions::new().label("autorun"),
            false,
        )
    }

    /// A cached derived value, recomputed on read after a dependency
    /// changed.
    pub fn computed<F>(&self, getter: F) -> Computed
    where
        F: Fn() -> Result<Value> + 'static,
    {
        let watcher = Watcher::build(
            self,
            Box::new(getter),
            None,
            &WatchOptions::new().lazy().label("computed"),
            false,
        );
        Computed::new(self.clone(), watcher)
    }

    /// Run `f` without registering any dependency.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.stack().push(None);
        f()
    }

    // ------------------------------------------------------------------
    // Reactive add / remove
    // ------------------------------------------------------------------

    /// Set a property or element so that the change is tracked, adding a
    /// reactive property if the key is new. Returns the written value.
    pub fn set(
        &self,
        target: &Value,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Value> {
        let key = key.into();
        let value = value.into();

        let object = match (target, &key) {
            (Value::Array(array), Key::Index(index)) => {
                array.pad_to(*index);
                array.splice(*index, 1, vec![value.clone()])?;
                return Ok(value);
            }
            (Value::Array(_), Key::Name(name)) => {
                self.warn(&format!("Cannot set named property \"{name}\" on an array"));
                return Ok(value);
            }
            (Value::Object(object), _) => object,
            _ => {
                self.warn(&format!(
                    "Cannot set reactive property on {} value",
                    target.type_name()
                ));
                return Ok(value);
            }
        };

        let name = key.to_name();
        if object.contains_key(&name) {
            object.set(&name, value.clone())?;
            return Ok(value);
        }

        match object.observer() {
            Some(observer) if observer.root_count() > 0 => {
                self.warn(&format!(
                    "Avoid adding reactive property \"{name}\" to a state root at runtime"
                ));
                Ok(value)
            }
            None => {
                object.set(&name, value.clone())?;
                Ok(value)
            }
            Some(observer) => {
                self.define_reactive(object, &name, Some(value.clone()), false)?;
                observer.subject().notify()?;
                Ok(value)
            }
        }
    }

    /// Remove a property or element so that the change is tracked.
    pub fn delete(&self, target: &Value, key: impl Into<Key>) -> Result<()> {
        let key = key.into();

        let object = match (target, &key) {
            (Value::Array(array), Key::Index(index)) => {
                array.splice(*index, 1, Vec::new())?;
                return Ok(());
            }
            (Value::Array(_), Key::Name(_)) => return Ok(()),
            (Value::Object(object), _) => object,
            _ => {
                self.warn(&format!(
                    "Cannot delete reactive property on {} value",
                    target.type_name()
                ));
                return Ok(());
            }
        };

        let name = key.to_name();
        let observer = object.observer();
        if observer.as_ref().is_some_and(|o| o.root_count() > 0) {
            self.warn(&format!(
                "Avoid deleting property \"{name}\" of a state root, set it to null instead"
            ));
            return Ok(());
        }

        if !object.remove(&name) {
            return Ok(());
        }
        match observer {
            Some(observer) => observer.subject().notify(),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Run `callback` at the next tick, after every callback queued before
    /// it.
    pub fn next_tick<F>(&self, callback: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        if self.inner.ticks.push(Box::new(callback)) {
            let weak = Rc::downgrade(&self.inner);
            self.inner.ticks.host().schedule(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Runtime { inner }.flush_ticks();
                }
            }));
        }
    }

    /// Resolves once the tick that is pending now has been flushed.
    pub fn tick(&self) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        self.next_tick(move || {
            let _ = tx.send(());
            Ok(())
        });
        async move {
            let _ = rx.await;
        }
    }

    /// Run the flushes parked by the manual tick host. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        self.inner.ticks.host().run_parked()
    }

    /// Await `future` while the tick host's `LocalSet` runs the flushes
    /// scheduled on it. Hosts without a `LocalSet` just await `future`.
    pub async fn run_until<F: Future>(&self, future: F) -> F::Output {
        match self.inner.ticks.host().local_set() {
            Some(local) => local.run_until(future).await,
            None => future.await,
        }
    }

    /// Number of watchers waiting for the next flush.
    pub fn pending_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.jobs.is_flushing()
    }

    fn flush_ticks(&self) {
        for callback in self.inner.ticks.take() {
            if let Err(err) = callback() {
                self.handle_error(&err, "nextTick");
            }
        }
    }

    pub(crate) fn queue_watcher(&self, watcher: Rc<WatcherBody>) -> Result<()> {
        match self.inner.jobs.enqueue(watcher) {
            Enqueued::Queued { schedule: true } if self.config().sync => self.flush_jobs(),
            Enqueued::Queued { schedule: true } => {
                self.schedule_flush();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn schedule_flush(&self) {
        let weak = Rc::downgrade(&self.inner);
        self.next_tick(move || {
            if let Some(inner) = weak.upgrade() {
                // Failures were already reported by the flush.
                let _ = Runtime { inner }.flush_jobs();
            }
            Ok(())
        });
    }

    /// Flush the job queue now. Errors are reported and returned.
    ///
    /// Watchers left queued behind a failed run get a flush of their own:
    /// immediately in sync mode, otherwise on the next tick.
    fn flush_jobs(&self) -> Result<()> {
        let result = self.inner.jobs.flush(self.config().max_update_count);
        if let Err(err) = &result {
            self.handle_error(err, "scheduler flush");
            if self.inner.jobs.len() > 0 {
                debug!(jobs = self.inner.jobs.len(), "rescheduling flush after failed run");
                if self.config().sync {
                    let _ = self.flush_jobs();
                } else {
                    self.schedule_flush();
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Errors and warnings
    // ------------------------------------------------------------------

    /// Install the hook that user-code failures are reported to. Without a
    /// hook they are logged at error level.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ReactiveError, &str) + 'static,
    {
        *self.inner.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub(crate) fn handle_error(&self, err: &ReactiveError, info: &str) {
        let handler = self.inner.error_handler.borrow().clone();
        match handler {
            Some(handler) => handler(err, info),
            None => error!(%err, info, "unhandled error in reactive code"),
        }
    }

    pub(crate) fn warn(&self, message: &str) {
        if !self.config().silent {
            warn!("{message}");
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("tick_host", &self.tick_host())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}
