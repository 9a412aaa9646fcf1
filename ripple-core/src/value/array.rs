//! Ordered sequences.
//!
//! Index writes on an [`Array`] are plain writes. The structural mutators
//! (`push`, `pop`, `shift`, `unshift`, `splice`, `sort`, `reverse`) go
//! through the collection interceptor, which notifies the array's
//! structural subject once it has been observed.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::observer::{self, Observer};
use crate::value::Value;

struct ArrayBody {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
}

/// Shared handle to an ordered sequence.
#[derive(Clone)]
pub struct Array {
    body: Rc<ArrayBody>,
}

impl Array {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.body.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one element. Element reads are never intercepted.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.body.items.borrow().get(index).cloned()
    }

    /// Overwrite one element in place, without notifying anyone.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        match self.body.items.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Grow to at least `len` elements, filling with `Null`. Silent.
    pub(crate) fn pad_to(&self, len: usize) {
        let mut items = self.body.items.borrow_mut();
        if items.len() < len {
            items.resize(len, Value::Null);
        }
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.body.items.borrow().clone()
    }

    pub fn push(&self, item: impl Into<Value>) -> Result<usize> {
        self.push_all(vec![item.into()])
    }

    /// Append several elements, returning the new length.
    pub fn push_all(&self, items: Vec<Value>) -> Result<usize> {
        self.mutate(move |vec| {
            vec.extend(items.iter().cloned());
            (vec.len(), items)
        })
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        self.mutate(|vec| (vec.pop(), Vec::new()))
    }

    pub fn shift(&self) -> Result<Option<Value>> {
        self.mutate(|vec| {
            let first = if vec.is_empty() {
                None
            } else {
                Some(vec.remove(0))
            };
            (first, Vec::new())
        })
    }

    pub fn unshift(&self, item: impl Into<Value>) -> Result<usize> {
        self.unshift_all(vec![item.into()])
    }

    /// Prepend several elements, keeping their order. Returns the new length.
    pub fn unshift_all(&self, items: Vec<Value>) -> Result<usize> {
        self.mutate(move |vec| {
            vec.splice(0..0, items.iter().cloned());
            (vec.len(), items)
        })
    }

    /// Remove `delete_count` elements starting at `start` and insert `items`
    /// in their place. Out-of-range arguments are clamped. Returns the
    /// removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        self.mutate(move |vec| {
            let start = start.min(vec.len());
            let end = start + delete_count.min(vec.len() - start);
            let removed = vec.splice(start..end, items.iter().cloned()).collect();
            (removed, items)
        })
    }

    /// Stable in-place sort using [`Value::natural_cmp`].
    pub fn sort(&self) -> Result<()> {
        self.sort_by(Value::natural_cmp)
    }

    /// Stable in-place sort with a caller comparator.
    ///
    /// The comparator runs on a snapshot with no borrow held, so it may
    /// read this array. It sees the elements as they were before the sort.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<()> {
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        self.mutate(move |vec| {
            *vec = sorted;
            ((), Vec::new())
        })
    }

    pub fn reverse(&self) -> Result<()> {
        self.mutate(|vec| {
            vec.reverse();
            ((), Vec::new())
        })
    }

    pub fn prevent_extensions(&self) {
        self.body.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.body.extensible.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.body.observer.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.body) as *const () as usize
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.body.observer.borrow_mut() = Some(observer);
    }

    /// Apply `op` to the raw elements and hand the result to the
    /// interceptor. `op` returns its result plus the inserted elements.
    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>)) -> Result<R> {
        let (result, inserted) = {
            let mut items = self.body.items.borrow_mut();
            op(&mut items)
        };
        observer::array::intercept(self, inserted)?;
        Ok(result)
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            body: Rc::new(ArrayBody {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                extensible: Cell::new(true),
            }),
        }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.body.items.try_borrow() {
            Ok(items) => f.debug_list().entries(items.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}
