//! Property interception.
//!
//! A [`TrackedProperty`] replaces the slot of one object property. Reads
//! register the property's subject with the current subscriber; writes of a
//! different value store it, observe it and notify.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{depend_array, observe, Observer};
use crate::error::Result;
use crate::reactive::{Runtime, Subject};
use crate::value::{same_value, Getter, Object, Setter, SlotRef, Value};

/// An intercepted object property.
pub struct TrackedProperty {
    subject: Subject,
    value: RefCell<Value>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    child: RefCell<Option<Rc<Observer>>>,
    shallow: bool,
}

impl TrackedProperty {
    /// The subject that fires when this property is reassigned.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Read the live value and register the dependency.
    pub fn get(&self) -> Value {
        let value = self.current();

        if self.subject.runtime().stack().is_tracking() {
            self.subject.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.subject().depend();
                if let Value::Array(array) = &value {
                    depend_array(array);
                }
            }
        }
        value
    }

    /// Write a new value, notifying subscribers if it differs.
    pub fn set(&self, value: Value) -> Result<()> {
        if same_value(&value, &self.current()) {
            return Ok(());
        }
        if self.getter.is_some() && self.setter.is_none() {
            return Ok(());
        }

        match &self.setter {
            Some(setter) => setter(value.clone()),
            None => *self.value.borrow_mut() = value.clone(),
        }

        let child = if self.shallow {
            None
        } else {
            observe(self.subject.runtime(), &value, false)
        };
        *self.child.borrow_mut() = child;

        self.subject.notify()
    }

    /// Read the value without registering a dependency.
    pub fn peek(&self) -> Value {
        let _guard = self.subject.runtime().stack().push(None);
        self.current()
    }

    fn current(&self) -> Value {
        match &self.getter {
            Some(getter) => getter(),
            None => self.value.borrow().clone(),
        }
    }
}

impl fmt::Debug for TrackedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedProperty")
            .field("subject", &self.subject.id())
            .field("shallow", &self.shallow)
            .finish()
    }
}

/// Install a [`TrackedProperty`] on `object[key]`.
///
/// Non-configurable slots are left alone, as are missing keys on a
/// non-extensible object. An already intercepted property is returned
/// unchanged; [`Runtime::define_reactive`] writes an explicit value through
/// it first. A pre-existing accessor keeps serving reads and writes.
pub(crate) fn define_reactive(
    runtime: &Runtime,
    object: &Object,
    key: &str,
    value: Option<Value>,
    shallow: bool,
) -> Option<Rc<TrackedProperty>> {
    let (current, getter, setter) = match object.slot(key) {
        Some(SlotRef::Tracked(property)) => return Some(property),
        Some(SlotRef::Data {
            configurable: false,
            ..
        })
        | Some(SlotRef::Accessor {
            configurable: false,
            ..
        }) => return None,
        Some(SlotRef::Data { value, .. }) => (Some(value), None, None),
        Some(SlotRef::Accessor { get, set, .. }) => (None, Some(get), set),
        None if object.is_extensible() => (None, None, None),
        None => return None,
    };

    // A getter-only accessor has no cached value to observe.
    let initial = match value {
        Some(value) => value,
        None if getter.is_none() || setter.is_some() => match (&current, &getter) {
            (Some(value), _) => value.clone(),
            (None, Some(getter)) => getter(),
            (None, None) => Value::Null,
        },
        None => Value::Null,
    };

    let child = if shallow {
        None
    } else {
        observe(runtime, &initial, false)
    };

    let property = Rc::new(TrackedProperty {
        subject: Subject::new(runtime),
        value: RefCell::new(initial),
        getter,
        setter,
        child: RefCell::new(child),
        shallow,
    });
    object.install(key, property.clone());
    Some(property)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn unchanged_writes_do_not_notify() {
        let runtime = Runtime::default();
        let object: Object = [("n", Value::from(f64::NAN))].into_iter().collect();
        let property = define_reactive(&runtime, &object, "n", None, false).unwrap();
        let runs = Rc::new(Cell::new(0));

        let _watcher = runtime
            .autorun({
                let object = object.clone();
                let runs = runs.clone();
                move || {
                    object.get("n");
                    runs.set(runs.get() + 1);
                    Ok(())
                }
            })
            .unwrap();
        assert_eq!(property.subject().subscriber_count(), 1);

        property.set(Value::from(f64::NAN)).unwrap();
        runtime.run_microtasks();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn explicit_value_overrides_slot() {
        let runtime = Runtime::default();
        let object: Object = [("a", Value::from(1))].into_iter().collect();
        define_reactive(&runtime, &object, "a", Some(Value::from(5)), false);
        assert_eq!(object.get("a"), Some(Value::from(5)));
    }

    #[test]
    fn accessor_setter_receives_writes() {
        let runtime = Runtime::default();
        let backing = Rc::new(RefCell::new(Value::from(1)));
        let object = Object::new();
        object.define_accessor(
            "x",
            Rc::new({
                let backing = backing.clone();
                move || backing.borrow().clone()
            }),
            Some(Rc::new({
                let backing = backing.clone();
                move |value| *backing.borrow_mut() = value
            })),
        );

        define_reactive(&runtime, &object, "x", None, false);
        object.set("x", 9).unwrap();
        assert_eq!(*backing.borrow(), Value::from(9));
        assert_eq!(object.get("x"), Some(Value::from(9)));
    }

    #[test]
    fn read_only_accessor_ignores_writes() {
        let runtime = Runtime::default();
        let object = Object::new();
        object.define_accessor("fixed", Rc::new(|| Value::from(3)), None);

        let property = define_reactive(&runtime, &object, "fixed", None, false).unwrap();
        property.set(Value::from(4)).unwrap();
        assert_eq!(object.get("fixed"), Some(Value::from(3)));
    }

    #[test]
    fn non_configurable_keys_are_skipped() {
        let runtime = Runtime::default();
        let object = Object::new();
        object.define_property("frozen", 1, false);

        assert!(define_reactive(&runtime, &object, "frozen", None, false).is_none());
        assert!(matches!(object.slot("frozen"), Some(SlotRef::Data { .. })));
    }

    #[test]
    fn shallow_properties_leave_values_unobserved() {
        let runtime = Runtime::default();
        let inner = Value::from(Object::new());
        let object: Object = [("inner", inner.clone())].into_iter().collect();

        define_reactive(&runtime, &object, "inner", None, true);
        assert!(inner.observer().is_none());
    }

    #[test]
    fn assigned_containers_get_observed() {
        let runtime = Runtime::default();
        let object: Object = [("a", Value::Null)].into_iter().collect();
        define_reactive(&runtime, &object, "a", None, false);

        let fresh = Value::from(Object::new());
        object.set("a", fresh.clone()).unwrap();
        assert!(fresh.observer().is_some());
    }
}
