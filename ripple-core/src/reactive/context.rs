//! Active Subscriber Stack
//!
//! The stack tracks which subscriber is currently evaluating. This enables
//! implicit dependency tracking: when a tracked property is read, its
//! subject registers itself with whatever subscriber is on top.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns one stack. Entering an evaluation pushes the
//! subscriber and returns a [`StackGuard`]; dropping the guard pops it and
//! restores the parent, even if the evaluation panicked. Nested evaluations
//! (a render reading a computed value) simply push on top.
//!
//! An entry may be `None`: that suspends tracking for the nested scope, as
//! done by [`Runtime::untracked`].
//!
//! [`Runtime`]: super::Runtime
//! [`Runtime::untracked`]: super::Runtime::untracked

use std::cell::RefCell;
use std::rc::Rc;

use super::{Dependent, SubscriberId};

/// Stack of subscribers currently evaluating.
#[derive(Default)]
pub struct ActiveStack {
    entries: RefCell<Vec<Option<Rc<dyn Dependent>>>>,
}

/// Guard that pops the stack when dropped.
pub struct StackGuard<'a> {
    stack: &'a ActiveStack,
    subscriber_id: Option<SubscriberId>,
}

impl ActiveStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `target` the current subscriber until the guard is dropped.
    pub fn push(&self, target: Option<Rc<dyn Dependent>>) -> StackGuard<'_> {
        let subscriber_id = target.as_ref().map(|t| t.id());
        self.entries.borrow_mut().push(target);
        StackGuard {
            stack: self,
            subscriber_id,
        }
    }

    /// The subscriber on top of the stack, if tracking is active.
    pub fn current(&self) -> Option<Rc<dyn Dependent>> {
        self.entries.borrow().last().cloned().flatten()
    }

    /// Check whether a read right now would be tracked.
    pub fn is_tracking(&self) -> bool {
        matches!(self.entries.borrow().last(), Some(Some(_)))
    }

    pub fn depth(&self) -> usize {
        self.entries.borrow().len()
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.entries.borrow_mut().pop();

        // Guards are scoped, so pops always mirror pushes.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.map(|e| e.id()),
                self.subscriber_id,
                "ActiveStack mismatch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::reactive::Subject;

    struct Probe(SubscriberId);

    impl Dependent for Probe {
        fn id(&self) -> SubscriberId {
            self.0
        }

        fn add_dep(self: Rc<Self>, _subject: &Subject) {}

        fn update(self: Rc<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn probe() -> Rc<dyn Dependent> {
        Rc::new(Probe(SubscriberId::new()))
    }

    #[test]
    fn stack_tracks_subscriber() {
        let stack = ActiveStack::new();
        let target = probe();

        assert!(!stack.is_tracking());
        assert!(stack.current().is_none());

        {
            let _guard = stack.push(Some(target.clone()));
            assert!(stack.is_tracking());
            assert_eq!(stack.current().map(|c| c.id()), Some(target.id()));
        }

        assert!(!stack.is_tracking());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn nested_pushes_restore_the_parent() {
        let stack = ActiveStack::new();
        let outer = probe();
        let inner = probe();

        let _outer = stack.push(Some(outer.clone()));
        {
            let _inner = stack.push(Some(inner.clone()));
            assert_eq!(stack.current().map(|c| c.id()), Some(inner.id()));
            assert_eq!(stack.depth(), 2);
        }
        assert_eq!(stack.current().map(|c| c.id()), Some(outer.id()));
    }

    #[test]
    fn none_entry_suspends_tracking() {
        let stack = ActiveStack::new();
        let _outer = stack.push(Some(probe()));
        {
            let _paused = stack.push(None);
            assert!(!stack.is_tracking());
            assert!(stack.current().is_none());
        }
        assert!(stack.is_tracking());
    }

    #[test]
    fn separate_stacks_are_isolated() {
        let a = ActiveStack::new();
        let b = ActiveStack::new();
        let _guard = a.push(Some(probe()));
        assert!(a.is_tracking());
        assert!(!b.is_tracking());
    }
}
