//! Observers
//!
//! Observing a container turns its plain state into trackable state:
//!
//! - every property of an [`Object`] gets a [`TrackedProperty`] installed in
//!   its slot, and the property's value is observed in turn;
//! - every element of an [`Array`] is observed, and the array's structural
//!   mutators notify its [`Observer`]'s subject.
//!
//! Each container is observed at most once. The attached [`Observer`] owns
//! the container's structural subject, which fires when keys are added or
//! removed through [`Runtime::set`]/[`Runtime::delete`] or when an array is
//! mutated in place.
//!
//! [`Runtime::set`]: crate::reactive::Runtime::set
//! [`Runtime::delete`]: crate::reactive::Runtime::delete

pub(crate) mod array;
mod deep;
mod property;

use std::cell::Cell;
use std::rc::Rc;

use crate::reactive::{Runtime, Subject};
use crate::value::{Array, Object, Value};

pub(crate) use deep::traverse;
pub(crate) use property::define_reactive;
pub use property::TrackedProperty;

/// Per-container observation state.
#[derive(Debug)]
pub struct Observer {
    subject: Subject,
    root_count: Cell<usize>,
}

impl Observer {
    fn new(runtime: &Runtime) -> Rc<Self> {
        Rc::new(Self {
            subject: Subject::new(runtime),
            root_count: Cell::new(0),
        })
    }

    /// Structural subject of the container.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// How many times the container was observed as a state root.
    pub fn root_count(&self) -> usize {
        self.root_count.get()
    }
}

/// Attach an observer to `value` if it is an observable container.
///
/// Returns the existing observer when the container was already observed.
/// New observers are only created while the runtime is observing and the
/// container is extensible.
pub(crate) fn observe(runtime: &Runtime, value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let observer = match value.observer() {
        Some(existing) => existing,
        None if value.is_container() && value.is_extensible() && runtime.is_observing() => {
            let observer = Observer::new(runtime);
            match value {
                Value::Object(object) => {
                    object.attach_observer(observer.clone());
                    walk(runtime, object);
                }
                Value::Array(array) => {
                    array.attach_observer(observer.clone());
                    observe_items(runtime, &array.to_vec());
                }
                _ => {}
            }
            observer
        }
        None => return None,
    };

    if as_root {
        observer.root_count.set(observer.root_count.get() + 1);
    }
    Some(observer)
}

fn walk(runtime: &Runtime, object: &Object) {
    for key in object.keys() {
        define_reactive(runtime, object, &key, None, false);
    }
}

pub(crate) fn observe_items(runtime: &Runtime, items: &[Value]) {
    for item in items {
        observe(runtime, item, false);
    }
}

/// Register the structural subject of every observed element, recursing
/// into nested arrays. Element reads are not intercepted, so this is how a
/// subscriber reading an array picks up changes inside its elements.
pub(crate) fn depend_array(array: &Array) {
    for item in array.to_vec() {
        if let Some(observer) = item.observer() {
            observer.subject.depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}
