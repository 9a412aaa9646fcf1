//! Keyed containers.
//!
//! An [`Object`] keeps its properties in insertion order. Each property slot
//! is either plain data, a caller-defined accessor pair, or an installed
//! [`TrackedProperty`] once the object has been observed. Reads and writes
//! dispatch on the slot kind with the slot map borrow already released, so
//! getters and subscribers are free to touch the same object again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::observer::{Observer, TrackedProperty};
use crate::value::Value;

/// Getter of an accessor property.
pub type Getter = Rc<dyn Fn() -> Value>;

/// Setter of an accessor property.
pub type Setter = Rc<dyn Fn(Value)>;

enum Slot {
    Data { value: Value, configurable: bool },
    Accessor {
        get: Getter,
        set: Option<Setter>,
        configurable: bool,
    },
    Tracked(Rc<TrackedProperty>),
}

/// A slot lifted out of the map so it can be used without holding a borrow.
pub(crate) enum SlotRef {
    Data { value: Value, configurable: bool },
    Accessor {
        get: Getter,
        set: Option<Setter>,
        configurable: bool,
    },
    Tracked(Rc<TrackedProperty>),
}

struct ObjectBody {
    slots: RefCell<IndexMap<String, Slot>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
}

/// Shared handle to a keyed container.
#[derive(Clone)]
pub struct Object {
    body: Rc<ObjectBody>,
}

impl Object {
    pub fn new() -> Self {
        Self {
            body: Rc::new(ObjectBody {
                slots: RefCell::new(IndexMap::new()),
                observer: RefCell::new(None),
                extensible: Cell::new(true),
            }),
        }
    }

    /// Read a property.
    ///
    /// Reading an intercepted property registers a dependency with the
    /// subscriber currently evaluating, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        Some(match self.slot(key)? {
            SlotRef::Data { value, .. } => value,
            SlotRef::Accessor { get, .. } => get(),
            SlotRef::Tracked(property) => property.get(),
        })
    }

    /// Write a property.
    ///
    /// Existing intercepted properties notify their subscribers when the
    /// value changes. A key that does not exist yet is added as a plain,
    /// non-reactive property; use [`Runtime::set`] to add a reactive one.
    ///
    /// [`Runtime::set`]: crate::reactive::Runtime::set
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.slot(key) {
            Some(SlotRef::Tracked(property)) => property.set(value)?,
            Some(SlotRef::Accessor { set: Some(set), .. }) => set(value),
            Some(SlotRef::Accessor { set: None, .. }) => {}
            Some(SlotRef::Data { .. }) | None => self.write_plain(key, value),
        }
        Ok(())
    }

    /// Define a plain data property, replacing whatever was there.
    ///
    /// A non-configurable property is never intercepted and cannot be
    /// removed.
    pub fn define_property(&self, key: &str, value: impl Into<Value>, configurable: bool) {
        self.body.slots.borrow_mut().insert(
            key.to_owned(),
            Slot::Data {
                value: value.into(),
                configurable,
            },
        );
    }

    /// Define an accessor property. Without a setter, writes are ignored.
    pub fn define_accessor(&self, key: &str, get: Getter, set: Option<Setter>) {
        self.body.slots.borrow_mut().insert(
            key.to_owned(),
            Slot::Accessor {
                get,
                set,
                configurable: true,
            },
        );
    }

    /// Remove a property without notifying anyone. Returns whether the key
    /// was removed; non-configurable keys stay in place.
    pub fn remove(&self, key: &str) -> bool {
        let mut slots = self.body.slots.borrow_mut();
        let configurable = match slots.get(key) {
            Some(Slot::Data { configurable, .. }) | Some(Slot::Accessor { configurable, .. }) => {
                *configurable
            }
            Some(Slot::Tracked(_)) => true,
            None => return false,
        };
        configurable && slots.shift_remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.body.slots.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.body.slots.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.body.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forbid adding new properties. Non-extensible objects are never
    /// observed.
    pub fn prevent_extensions(&self) {
        self.body.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.body.extensible.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.body.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.body) as *const () as usize
    }

    pub(crate) fn slot(&self, key: &str) -> Option<SlotRef> {
        let slots = self.body.slots.borrow();
        Some(match slots.get(key)? {
            Slot::Data {
                value,
                configurable,
            } => SlotRef::Data {
                value: value.clone(),
                configurable: *configurable,
            },
            Slot::Accessor {
                get,
                set,
                configurable,
            } => SlotRef::Accessor {
                get: get.clone(),
                set: set.clone(),
                configurable: *configurable,
            },
            Slot::Tracked(property) => SlotRef::Tracked(property.clone()),
        })
    }

    pub(crate) fn install(&self, key: &str, property: Rc<TrackedProperty>) {
        self.body
            .slots
            .borrow_mut()
            .insert(key.to_owned(), Slot::Tracked(property));
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.body.observer.borrow_mut() = Some(observer);
    }

    fn write_plain(&self, key: &str, value: Value) {
        let mut slots = self.body.slots.borrow_mut();
        match slots.get_mut(key) {
            Some(Slot::Data { value: slot, .. }) => *slot = value,
            Some(_) => {}
            None if self.body.extensible.get() => {
                slots.insert(
                    key.to_owned(),
                    Slot::Data {
                        value,
                        configurable: true,
                    },
                );
            }
            None => {}
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let object = Object::new();
        {
            let mut slots = object.body.slots.borrow_mut();
            for (key, value) in iter {
                slots.insert(
                    key.into(),
                    Slot::Data {
                        value,
                        configurable: true,
                    },
                );
            }
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = match self.body.slots.try_borrow() {
            Ok(slots) => slots,
            Err(_) => return f.write_str("{<borrowed>}"),
        };
        let mut map = f.debug_map();
        for (key, slot) in slots.iter() {
            match slot {
                Slot::Data { value, .. } => map.entry(key, value),
                Slot::Accessor { .. } => map.entry(key, &format_args!("<accessor>")),
                Slot::Tracked(property) => map.entry(key, &property.peek()),
            };
        }
        map.finish()
    }
}
