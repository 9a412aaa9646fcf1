//! Dynamic Values
//!
//! Trackable state is expressed as a small dynamic value tree. Primitives are
//! stored inline; containers ([`Object`] and [`Array`]) are shared handles,
//! so cloning a container value clones the handle, never the contents.
//!
//! # Equality
//!
//! `Value` implements strict equality: primitives compare by value (so
//! `NaN != NaN`, exactly like `f64`) and containers compare by identity.
//! Property writes use [`same_value`] instead, which additionally treats two
//! NaNs as equal so that a NaN-valued property never notifies forever.

mod array;
mod object;

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

pub use array::Array;
pub use object::{Getter, Object, Setter};

pub(crate) use object::SlotRef;

use crate::observer::Observer;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// True for objects and arrays.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    /// The observer attached to this value, if it is an observed container.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(object) => object.observer(),
            Value::Array(array) => array.observer(),
            _ => None,
        }
    }

    /// Whether new properties or elements may be attached to this container.
    pub(crate) fn is_extensible(&self) -> bool {
        match self {
            Value::Object(object) => object.is_extensible(),
            Value::Array(array) => array.is_extensible(),
            _ => false,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Ordering used by [`Array::sort`].
    ///
    /// Values of different kinds order as null < boolean < number < string
    /// < container; containers compare equal to each other so a stable sort
    /// keeps their relative order.
    pub fn natural_cmp(&self, other: &Value) -> Ordering {
        fn rank(value: &Value) -> u8 {
            match value {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Number(_) => 2,
                Value::Str(_) => 3,
                Value::Object(_) | Value::Array(_) => 4,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

/// Property name or element index, as accepted by [`Runtime::set`] and
/// [`Runtime::delete`].
///
/// [`Runtime::set`]: crate::reactive::Runtime::set
/// [`Runtime::delete`]: crate::reactive::Runtime::delete
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    /// The key as an object property name.
    pub fn to_name(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Strict equality, except that two NaNs are the same value.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(object) => object.fmt(f),
            Value::Array(array) => array.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Builds plain, not yet observed containers from JSON.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_the_same_value_but_not_equal() {
        let nan = Value::from(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(same_value(&nan, &Value::from(f64::NAN)));
        assert!(!same_value(&nan, &Value::from(1)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Object::new();
        let b = Object::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(Object::new()), Value::from(b));
    }

    #[test]
    fn json_builds_nested_containers() {
        let value = Value::from(serde_json::json!({
            "name": "ripple",
            "tags": ["a", "b"],
            "nested": { "n": 3 }
        }));

        let object = value.as_object().unwrap();
        assert_eq!(object.keys(), vec!["name", "tags", "nested"]);
        assert_eq!(object.get("name").unwrap().as_str(), Some("ripple"));
        assert_eq!(object.get("tags").unwrap().as_array().unwrap().len(), 2);
        let nested = object.get("nested").unwrap();
        assert_eq!(nested.as_object().unwrap().get("n"), Some(Value::from(3)));
        assert!(value.observer().is_none());
    }

    #[test]
    fn index_keys_double_as_names() {
        assert_eq!(Key::from(3).to_name(), "3");
        assert_eq!(Key::from("a"), Key::Name(String::from("a")));
        assert_eq!(Key::from(String::from("b")).to_string(), "b");
    }

    #[test]
    fn natural_ordering_groups_kinds() {
        let mut values = vec![
            Value::from("b"),
            Value::from(2),
            Value::Null,
            Value::from(true),
            Value::from(-1),
            Value::from("a"),
        ];
        values.sort_by(Value::natural_cmp);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::from(true),
                Value::from(-1),
                Value::from(2),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }
}
