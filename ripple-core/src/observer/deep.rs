//! Deep traversal for `deep` watchers.

use std::collections::HashSet;

use crate::value::Value;

/// Read every property and element reachable from `value` so a deep
/// watcher subscribes to all of them. Each container is visited once;
/// non-extensible containers are skipped.
pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(object) if object.is_extensible() => {
            if !seen.insert(object.addr()) {
                return;
            }
            for key in object.keys() {
                if let Some(child) = object.get(&key) {
                    walk(&child, seen);
                }
            }
        }
        Value::Array(array) if array.is_extensible() => {
            if !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use crate::value::Object;

    #[test]
    fn cyclic_graphs_terminate() {
        let runtime = Runtime::default();
        let a = Object::new();
        let b = Object::new();
        a.set("b", b.clone()).unwrap();
        b.set("a", a.clone()).unwrap();
        runtime.observe(&Value::from(a.clone()));

        let watcher = runtime
            .autorun({
                let a = a.clone();
                move || {
                    traverse(&Value::from(a.clone()));
                    Ok(())
                }
            })
            .unwrap();

        // a.b, b.a and the structural subject of each container.
        assert_eq!(watcher.dependency_count(), 4);
    }

    #[test]
    fn primitives_are_ignored() {
        traverse(&Value::from(1));
        traverse(&Value::Null);
    }
}
