//! Dot-delimited watch paths.

use crate::value::{Object, Value};

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '.'
}

/// Split `path` into segments, or `None` if it is not a simple path.
pub(crate) fn parse_path(path: &str) -> Option<Vec<String>> {
    if !path.chars().all(is_path_char) {
        return None;
    }
    Some(path.split('.').map(str::to_owned).collect())
}

/// Follow `segments` from `root`, reading every hop through the tracked
/// accessors. Arrays accept numeric segments. A missing hop yields `Null`.
pub(crate) fn resolve(root: &Object, segments: &[String]) -> Value {
    let mut current = Value::Object(root.clone());
    for segment in segments {
        current = match &current {
            Value::Object(object) => object.get(segment).unwrap_or_default(),
            Value::Array(array) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| array.get(index))
                .unwrap_or_default(),
            _ => return Value::Null,
        };
    }
    current
}
