//! Watchers
//!
//! A [`Watcher`] wraps a getter, records which subjects the getter read,
//! and re-evaluates when any of them change. Render computations, computed
//! values and user watches are all watchers with different flags.
//!
//! # How Watchers Work
//!
//! 1. `get()` pushes the watcher on the active stack and runs the getter.
//!    Every tracked read calls back into [`Dependent::add_dep`], which
//!    collects the subject into the *new* dependency generation.
//!
//! 2. After the getter returns, `cleanup_deps()` unsubscribes from every
//!    subject of the previous generation that was not read again, then
//!    swaps the generations and clears the new one for reuse.
//!
//! 3. When a subject changes, `update()` marks lazy watchers dirty, runs
//!    `sync` watchers on the spot and queues everything else with the
//!    runtime's scheduler.
//!
//! 4. `run()` re-evaluates and, when the value changed (or is a container,
//!    or the watcher is deep), calls the change callback.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::{Dependent, Runtime, Subject, SubjectId, SubscriberId};
use crate::error::Result;
use crate::observer::traverse;
use crate::value::Value;

/// Getter evaluated by a watcher.
pub type WatchGetter = Box<dyn Fn() -> Result<Value>>;

/// Change callback, called with `(new, old)`.
pub type WatchCallback = Box<dyn Fn(&Value, &Value) -> Result<()>>;

/// Options for creating a watcher.
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Walk the whole value so nested changes also trigger.
    pub deep: bool,
    /// Defer evaluation until the value is read (computed semantics).
    pub lazy: bool,
    /// Run on change instead of going through the scheduler.
    pub sync: bool,
    /// Invoke the callback once right after creation.
    pub immediate: bool,
    /// Description used in error reports.
    pub label: Option<String>,
    /// Hook run by the scheduler right before each `run()`.
    pub before: Option<Rc<dyn Fn()>>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }
}

struct WatcherState {
    active: bool,
    dirty: bool,
    value: Value,
    deps: SmallVec<[Subject; 4]>,
    new_deps: SmallVec<[Subject; 4]>,
    dep_ids: HashSet<SubjectId>,
    new_dep_ids: HashSet<SubjectId>,
}

pub(crate) struct WatcherBody {
    this: Weak<WatcherBody>,
    id: SubscriberId,
    runtime: Runtime,
    expression: String,
    getter: WatchGetter,
    callback: Option<WatchCallback>,
    before: Option<Rc<dyn Fn()>>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    state: RefCell<WatcherState>,
}

/// Handle to a tracked computation.
#[derive(Clone)]
pub struct Watcher {
    body: Rc<WatcherBody>,
}

impl Watcher {
    /// Create a watcher and, unless it is lazy, evaluate it once.
    ///
    /// `user` watchers report getter and callback errors through the
    /// runtime's error hook instead of returning them.
    pub(crate) fn new(
        runtime: &Runtime,
        getter: WatchGetter,
        callback: Option<WatchCallback>,
        options: &WatchOptions,
        user: bool,
    ) -> Result<Self> {
        let watcher = Self::build(runtime, getter, callback, options, user);
        if !watcher.body.lazy {
            let value = watcher.body.get()?;
            watcher.body.state.borrow_mut().value = value;
        }
        Ok(watcher)
    }

    /// Create a watcher without evaluating it.
    pub(crate) fn build(
        runtime: &Runtime,
        getter: WatchGetter,
        callback: Option<WatchCallback>,
        options: &WatchOptions,
        user: bool,
    ) -> Self {
        let body = Rc::new_cyclic(|this| WatcherBody {
            this: this.clone(),
            id: SubscriberId::new(),
            runtime: runtime.clone(),
            expression: options
                .label
                .clone()
                .unwrap_or_else(|| String::from("<anonymous>")),
            getter,
            callback,
            before: options.before.clone(),
            deep: options.deep,
            user,
            lazy: options.lazy,
            sync: options.sync,
            state: RefCell::new(WatcherState {
                active: true,
                dirty: options.lazy,
                value: Value::Null,
                deps: SmallVec::new(),
                new_deps: SmallVec::new(),
                dep_ids: HashSet::new(),
                new_dep_ids: HashSet::new(),
            }),
        });

        Self { body }
    }

    pub fn id(&self) -> SubscriberId {
        self.body.id
    }

    pub fn expression(&self) -> &str {
        &self.body.expression
    }

    /// The value cached by the last evaluation.
    pub fn value(&self) -> Value {
        self.body.state.borrow().value.clone()
    }

    pub fn is_active(&self) -> bool {
        self.body.state.borrow().active
    }

    /// Whether a lazy watcher needs to re-evaluate before its value is used.
    pub fn is_dirty(&self) -> bool {
        self.body.state.borrow().dirty
    }

    pub fn dependency_count(&self) -> usize {
        self.body.state.borrow().deps.len()
    }

    /// Ids of the subjects read by the last evaluation.
    pub fn dependency_ids(&self) -> Vec<SubjectId> {
        self.body.state.borrow().deps.iter().map(Subject::id).collect()
    }

    /// Re-evaluate now and fire the callback if the value changed.
    pub fn run(&self) -> Result<()> {
        self.body.run()
    }

    /// Re-evaluate a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        self.body.evaluate()
    }

    /// Register every dependency of this watcher with the subscriber
    /// currently evaluating.
    pub fn depend(&self) {
        self.body.depend()
    }

    /// Unsubscribe from every subject and stop reacting for good.
    pub fn teardown(&self) {
        self.body.teardown()
    }

    /// Invoke the callback once with the current value, as done for
    /// `immediate` watches.
    pub(crate) fn fire_immediately(&self) {
        self.body.call_callback_immediately()
    }
}

impl WatcherBody {
    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate the getter and re-collect dependencies.
    fn get(&self) -> Result<Value> {
        let result = {
            let target = self
                .this
                .upgrade()
                .map(|body| body as Rc<dyn Dependent>);
            let _guard = self.runtime.stack().push(target);

            let result = match (self.getter)() {
                Err(err) if self.user => {
                    self.runtime.handle_error(
                        &err,
                        &format!("getter for watcher \"{}\"", self.expression),
                    );
                    Ok(Value::Null)
                }
                other => other,
            };

            // Touch every nested property so deep watchers track them all.
            if self.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };

        self.cleanup_deps();
        result
    }

    fn cleanup_deps(&self) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        // Torn down while evaluating: drop whatever this run collected.
        if !state.active {
            for subject in state.new_deps.drain(..) {
                subject.unsubscribe(self.id);
            }
            state.new_dep_ids.clear();
            state.deps.clear();
            state.dep_ids.clear();
            return;
        }

        for subject in state.deps.iter() {
            if !state.new_dep_ids.contains(&subject.id()) {
                subject.unsubscribe(self.id);
            }
        }

        std::mem::swap(&mut state.dep_ids, &mut state.new_dep_ids);
        state.new_dep_ids.clear();
        std::mem::swap(&mut state.deps, &mut state.new_deps);
        state.new_deps.clear();
    }

    pub(crate) fn run(&self) -> Result<()> {
        if !self.state.borrow().active {
            return Ok(());
        }

        let value = self.get()?;

        let old = {
            let mut state = self.state.borrow_mut();
            // Strict comparison: a NaN result always counts as a change.
            // Containers compare by identity, so in-place mutation must
            // always fire.
            let changed = value != state.value || value.is_container() || self.deep;
            if !changed {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        if let Some(callback) = &self.callback {
            match callback(&value, &old) {
                Err(err) if self.user => self.runtime.handle_error(
                    &err,
                    &format!("callback for watcher \"{}\"", self.expression),
                ),
                other => other?,
            }
        }
        Ok(())
    }

    pub(crate) fn before_run(&self) {
        if let Some(before) = &self.before {
            before();
        }
    }

    fn evaluate(&self) -> Result<()> {
        let value = self.get()?;
        let mut state = self.state.borrow_mut();
        state.value = value;
        state.dirty = false;
        Ok(())
    }

    fn depend(&self) {
        let deps = self.state.borrow().deps.clone();
        for subject in deps.iter() {
            subject.depend();
        }
    }

    fn teardown(&self) {
        let deps = {
            let mut state = self.state.borrow_mut();
            if !state.active {
                return;
            }
            state.active = false;
            state.dep_ids.clear();
            std::mem::take(&mut state.deps)
        };

        for subject in deps {
            subject.unsubscribe(self.id);
        }
    }

    fn call_callback_immediately(&self) {
        let Some(callback) = &self.callback else {
            return;
        };
        let value = self.state.borrow().value.clone();
        if let Err(err) = callback(&value, &Value::Null) {
            self.runtime.handle_error(
                &err,
                &format!("callback for immediate watcher \"{}\"", self.expression),
            );
        }
    }
}

impl Dependent for WatcherBody {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(self: Rc<Self>, subject: &Subject) {
        let id = subject.id();
        let subscribe = {
            let mut state = self.state.borrow_mut();
            if !state.active || !state.new_dep_ids.insert(id) {
                return;
            }
            state.new_deps.push(subject.clone());
            !state.dep_ids.contains(&id)
        };

        if subscribe {
            subject.subscribe(&(self as Rc<dyn Dependent>));
        }
    }

    fn update(self: Rc<Self>) -> Result<()> {
        if self.lazy {
            self.state.borrow_mut().dirty = true;
            Ok(())
        } else if self.sync {
            self.run()
        } else {
            let runtime = self.runtime.clone();
            runtime.queue_watcher(self)
        }
    }
}

impl Drop for WatcherBody {
    fn drop(&mut self) {
        let id = self.id;
        for subject in self.state.get_mut().deps.drain(..) {
            subject.unsubscribe(id);
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.body.state.borrow();
        f.debug_struct("Watcher")
            .field("id", &self.body.id)
            .field("expression", &self.body.expression)
            .field("active", &state.active)
            .field("dirty", &state.dirty)
            .field("dependency_count", &state.deps.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
