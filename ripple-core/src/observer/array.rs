//! Collection interception.
//!
//! Element writes on an [`Array`] are not intercepted, so the structural
//! mutators report to the array's observer after the native operation ran.

use super::observe_items;
use crate::error::Result;
use crate::value::{Array, Value};

/// Called by every structural mutator of `array` once the change is
/// applied. Observes `inserted` and notifies the structural subject, if the
/// array is observed. Notification is unconditional.
pub(crate) fn intercept(array: &Array, inserted: Vec<Value>) -> Result<()> {
    let Some(observer) = array.observer() else {
        return Ok(());
    };

    if !inserted.is_empty() {
        observe_items(observer.subject().runtime(), &inserted);
    }
    observer.subject().notify()
}
