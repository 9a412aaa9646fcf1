//! Subjects
//!
//! A [`Subject`] is the change broadcaster of one piece of trackable state:
//! one per intercepted property, plus one per observed container for
//! structural changes (keys added or removed, elements inserted or moved).
//!
//! # How Subjects Work
//!
//! 1. A read calls [`Subject::depend`], which hands the subject to the
//!    subscriber currently evaluating. The subscriber decides whether to
//!    [`subscribe`](Subject::subscribe).
//!
//! 2. A write calls [`Subject::notify`], which snapshots the subscriber list
//!    and calls `update()` on each entry. Subscribers added or removed while
//!    the snapshot is being walked do not disturb the walk.
//!
//! Subjects hold their subscribers weakly. A watcher that is dropped without
//! being torn down simply disappears from the list on the next broadcast.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::trace;

use super::{Dependent, Runtime, SubscriberId};
use crate::error::Result;

/// Unique identifier for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(u64);

impl SubjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct Entry {
    id: SubscriberId,
    target: Weak<dyn Dependent>,
}

struct SubjectBody {
    id: SubjectId,
    runtime: Runtime,
    subscribers: RefCell<SmallVec<[Entry; 4]>>,
}

/// A per-property (or per-container) change broadcaster.
#[derive(Clone)]
pub struct Subject {
    body: Rc<SubjectBody>,
}

impl Subject {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            body: Rc::new(SubjectBody {
                id: SubjectId::next(),
                runtime: runtime.clone(),
                subscribers: RefCell::new(SmallVec::new()),
            }),
        }
    }

    pub fn id(&self) -> SubjectId {
        self.body.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.body.runtime
    }

    /// Append `subscriber` unless it is already subscribed.
    pub fn subscribe(&self, subscriber: &Rc<dyn Dependent>) {
        let id = subscriber.id();
        let mut subscribers = self.body.subscribers.borrow_mut();
        if subscribers.iter().all(|entry| entry.id != id) {
            subscribers.push(Entry {
                id,
                target: Rc::downgrade(subscriber),
            });
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.body
            .subscribers
            .borrow_mut()
            .retain(|entry| entry.id != id);
    }

    /// Register this subject with the subscriber currently evaluating.
    pub fn depend(&self) {
        if let Some(current) = self.body.runtime.stack().current() {
            current.add_dep(self);
        }
    }

    /// Broadcast a change to every subscriber.
    ///
    /// With a synchronously flushing runtime the snapshot is sorted by
    /// subscriber id first, since no scheduler will sort it later.
    pub fn notify(&self) -> Result<()> {
        let mut snapshot: SmallVec<[(SubscriberId, Rc<dyn Dependent>); 4]> = {
            let mut subscribers = self.body.subscribers.borrow_mut();
            subscribers.retain(|entry| entry.target.strong_count() > 0);
            subscribers
                .iter()
                .filter_map(|entry| entry.target.upgrade().map(|target| (entry.id, target)))
                .collect()
        };

        if self.body.runtime.config().sync {
            snapshot.sort_by_key(|(id, _)| *id);
        }

        trace!(subject = self.id().raw(), subscribers = snapshot.len(), "notify");

        // Every subscriber is updated even when an earlier one fails.
        let mut first_error = None;
        for (_, subscriber) in snapshot {
            if let Err(err) = subscriber.update() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn subscriber_count(&self) -> usize {
        self.body.subscribers.borrow().len()
    }

    /// Ids of the current subscribers, in subscription order.
    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.body
            .subscribers
            .borrow()
            .iter()
            .map(|entry| entry.id)
            .collect()
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("id", &self.body.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::cell::RefCell;

    struct MockDependent {
        id: SubscriberId,
        log: Rc<RefCell<Vec<SubscriberId>>>,
    }

    impl MockDependent {
        fn new(log: &Rc<RefCell<Vec<SubscriberId>>>) -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                log: log.clone(),
            })
        }
    }

    impl Dependent for MockDependent {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(self: Rc<Self>, subject: &Subject) {
            subject.subscribe(&(self as Rc<dyn Dependent>));
        }

        fn update(self: Rc<Self>) -> Result<()> {
            self.log.borrow_mut().push(self.id);
            Ok(())
        }
    }

    #[test]
    fn subscribe_ignores_duplicates() {
        let runtime = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let subject = Subject::new(&runtime);
        let sub: Rc<dyn Dependent> = MockDependent::new(&log);

        subject.subscribe(&sub);
        subject.subscribe(&sub);
        assert_eq!(subject.subscriber_count(), 1);

        subject.unsubscribe(sub.id());
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_every_subscriber_once() {
        let runtime = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let subject = Subject::new(&runtime);
        let a: Rc<dyn Dependent> = MockDependent::new(&log);
        let b: Rc<dyn Dependent> = MockDependent::new(&log);

        subject.subscribe(&b);
        subject.subscribe(&a);
        subject.notify().unwrap();

        // Insertion order without synchronous flushing.
        assert_eq!(*log.borrow(), vec![b.id(), a.id()]);
    }

    #[test]
    fn synchronous_runtime_notifies_in_id_order() {
        let runtime = Runtime::new(Config::synchronous());
        let log = Rc::new(RefCell::new(Vec::new()));
        let subject = Subject::new(&runtime);
        let a: Rc<dyn Dependent> = MockDependent::new(&log);
        let b: Rc<dyn Dependent> = MockDependent::new(&log);

        subject.subscribe(&b);
        subject.subscribe(&a);
        subject.notify().unwrap();

        assert_eq!(*log.borrow(), vec![a.id(), b.id()]);
    }

    #[test]
    fn depend_hands_subject_to_current_subscriber() {
        let runtime = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let subject = Subject::new(&runtime);
        let sub: Rc<dyn Dependent> = MockDependent::new(&log);

        subject.depend();
        assert_eq!(subject.subscriber_count(), 0);

        {
            let _guard = runtime.stack().push(Some(sub.clone()));
            subject.depend();
        }
        assert_eq!(subject.subscriber_ids(), vec![sub.id()]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let runtime = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let subject = Subject::new(&runtime);
        {
            let sub: Rc<dyn Dependent> = MockDependent::new(&log);
            subject.subscribe(&sub);
        }
        subject.notify().unwrap();
        assert_eq!(subject.subscriber_count(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn subject_ids_increase() {
        let runtime = Runtime::default();
        let first = Subject::new(&runtime);
        let second = Subject::new(&runtime);
        assert!(first.id() < second.id());
    }
}
