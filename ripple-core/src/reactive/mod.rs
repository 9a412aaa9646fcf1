//! Reactive Primitives
//!
//! This module implements the subject/subscriber graph: subjects, watchers,
//! computed values and the runtime that ties them together.
//!
//! # Concepts
//!
//! ## Subjects
//!
//! A [`Subject`] broadcasts changes of one piece of state. Every intercepted
//! property owns one, and so does every observed container (for structural
//! changes). Subjects never know what their subscribers compute.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a computation that depends on subjects. While it runs,
//! it sits on top of the runtime's [`ActiveStack`]; every tracked read hands
//! the read subject to it. After the run, its dependency set is exactly the
//! set of subjects it read.
//!
//! ## Computed values
//!
//! A [`Computed`] is a lazy watcher that caches its value and recomputes on
//! read after a dependency changed.
//!
//! # Implementation Notes
//!
//! Subjects hold subscribers through the [`Dependent`] trait and only
//! weakly, so dropping the last [`Watcher`] handle ends its subscriptions.

mod computed;
mod context;
mod path;
mod runtime;
mod subject;
mod subscriber;
pub(crate) mod watcher;

pub use computed::Computed;
pub use context::{ActiveStack, StackGuard};
pub use runtime::Runtime;
pub use subject::{Subject, SubjectId};
pub use subscriber::{Dependent, SubscriberId};
pub use watcher::{WatchCallback, WatchGetter, WatchOptions, Watcher};
