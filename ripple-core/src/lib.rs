//! Ripple Core
//!
//! This crate provides a fine-grained, push-pull reactivity engine. Plain
//! state is made trackable once, and arbitrary computations then re-run
//! exactly when the state they read changes, without any explicit
//! subscribe or unsubscribe calls. It implements:
//!
//! - Subjects and subscribers (watchers, computed values)
//! - Transparent property and collection interception
//! - Automatic dependency collection with per-run cleanup
//! - A batching scheduler that flushes once per tick, in creation order
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic value tree (`Value`, `Object`, `Array`)
//! - `observer`: property and collection interception
//! - `reactive`: subjects, watchers, the active stack and the runtime
//! - `scheduler`: the watcher job queue and the next-tick queue
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use ripple_core::{Runtime, Value, WatchOptions};
//!
//! let runtime = Runtime::default();
//! let state = runtime.observable(serde_json::json!({ "count": 1 }));
//! let object = state.as_object().unwrap().clone();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let _watcher = runtime
//!     .watch(
//!         {
//!             let object = object.clone();
//!             move || Ok(object.get("count").unwrap_or_default())
//!         },
//!         {
//!             let seen = seen.clone();
//!             move |new, old| {
//!                 seen.borrow_mut().push((new.clone(), old.clone()));
//!                 Ok(())
//!             }
//!         },
//!         WatchOptions::new(),
//!     )
//!     .unwrap();
//!
//! // Writes are batched until the next tick.
//! object.set("count", 2).unwrap();
//! object.set("count", 3).unwrap();
//! runtime.run_microtasks();
//!
//! assert_eq!(*seen.borrow(), vec![(Value::from(3), Value::from(1))]);
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;
pub mod value;

pub use config::{Config, TickHost};
pub use error::{ReactiveError, Result};
pub use observer::{Observer, TrackedProperty};
pub use reactive::{
    ActiveStack, Computed, Dependent, Runtime, Subject, SubjectId, SubscriberId, WatchOptions,
    Watcher,
};
pub use scheduler::{LocalSetHost, ManualHost, MicrotaskHost};
pub use value::{same_value, Array, Key, Object, Value};
