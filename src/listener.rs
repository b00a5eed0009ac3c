//! Continuous-delivery subscriptions.
//!
//! A [`SnapshotSink`] is the collaborator-facing end of a listener: the
//! executor pushes deliveries into it in production order. Deliveries and
//! cancellation are serialized by a reentrant lock, so once
//! [`ListenerRegistration::remove`] returns no callback runs again, even when
//! `remove` is called from inside the callback itself.

use crate::errors::QueryError;
use crate::executor::{QueryExecutor, SubscriptionId};
use crate::snapshot::{DocumentSnapshot, MetadataChanges, QuerySnapshot, SnapshotMetadata};
use crate::value::documents_equal;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type SnapshotCallback = Box<dyn FnMut(Result<QuerySnapshot, QueryError>) + Send>;

struct Delivery {
    callback: Option<SnapshotCallback>,
    last: Option<(Vec<DocumentSnapshot>, SnapshotMetadata)>,
}

pub struct SnapshotSink {
    metadata_changes: MetadataChanges,
    active: AtomicBool,
    delivery: ReentrantMutex<RefCell<Delivery>>,
}

impl std::fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSink")
            .field("metadata_changes", &self.metadata_changes)
            .field("active", &self.is_active())
            .finish()
    }
}

impl SnapshotSink {
    #[must_use]
    pub fn new(metadata_changes: MetadataChanges, callback: SnapshotCallback) -> Arc<Self> {
        Arc::new(Self {
            metadata_changes,
            active: AtomicBool::new(true),
            delivery: ReentrantMutex::new(RefCell::new(Delivery { callback: Some(callback), last: None })),
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn metadata_changes(&self) -> MetadataChanges {
        self.metadata_changes
    }

    /// Delivers one event. Errors are passed through and keep the
    /// subscription alive.
    pub fn next(&self, event: Result<QuerySnapshot, QueryError>) {
        let guard = self.delivery.lock();
        if !self.is_active() {
            return;
        }
        let callback = {
            let mut d = guard.borrow_mut();
            if let Ok(snapshot) = &event
                && !Self::should_raise(self.metadata_changes, d.last.as_ref(), snapshot)
            {
                return;
            }
            if let Ok(snapshot) = &event {
                d.last = Some((snapshot.documents().to_vec(), snapshot.metadata()));
            }
            d.callback.take()
        };
        let Some(mut callback) = callback else {
            return;
        };
        callback(event);
        // The callback may have cancelled the subscription while running.
        if self.is_active() {
            guard.borrow_mut().callback = Some(callback);
        }
    }

    /// Delivers a fatal error, then cancels the subscription.
    pub fn fail(&self, error: QueryError) {
        let _guard = self.delivery.lock();
        self.next(Err(error));
        self.cancel();
    }

    /// Stops deliveries. Blocks until an in-flight delivery on another thread
    /// has finished.
    pub fn cancel(&self) {
        let guard = self.delivery.lock();
        self.active.store(false, Ordering::Release);
        if let Ok(mut d) = guard.try_borrow_mut() {
            d.callback = None;
        }
    }

    fn should_raise(
        changes: MetadataChanges,
        last: Option<&(Vec<DocumentSnapshot>, SnapshotMetadata)>,
        next: &QuerySnapshot,
    ) -> bool {
        let Some((docs, metadata)) = last else {
            return true;
        };
        let next_docs = next.documents();
        let same_data = docs.len() == next_docs.len()
            && docs.iter().zip(next_docs).all(|(a, b)| same_document_data(a, b));
        if !same_data {
            return true;
        }
        changes == MetadataChanges::Include
            && (*metadata != next.metadata()
                || docs.iter().zip(next_docs).any(|(a, b)| a.metadata() != b.metadata()))
    }
}

fn same_document_data(a: &DocumentSnapshot, b: &DocumentSnapshot) -> bool {
    a.key() == b.key()
        && match (a.data(), b.data()) {
            (Some(x), Some(y)) => documents_equal(x, y),
            (None, None) => true,
            _ => false,
        }
}

struct Registration {
    id: SubscriptionId,
    sink: Arc<SnapshotSink>,
    executor: Arc<dyn QueryExecutor>,
    removed: AtomicBool,
}

impl Registration {
    fn remove(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sink.cancel();
        self.executor.unsubscribe(self.id);
        log::debug!("listener {} removed", self.id);
    }
}

/// Handle returned by `add_snapshot_listener`. Removing it is idempotent.
#[derive(Clone)]
pub struct ListenerRegistration {
    inner: Arc<Registration>,
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("id", &self.inner.id)
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl ListenerRegistration {
    pub(crate) fn new(id: SubscriptionId, sink: Arc<SnapshotSink>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { inner: Arc::new(Registration { id, sink, executor, removed: AtomicBool::new(false) }) }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Unregisters the listener. A second call does nothing.
    pub fn remove(&self) {
        self.inner.remove();
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::Acquire) || !self.inner.sink.is_active()
    }
}

/// Registrations made through one facade object, removed when it drops.
#[derive(Default)]
pub(crate) struct ListenerSet {
    registrations: Mutex<Vec<ListenerRegistration>>,
}

impl ListenerSet {
    pub(crate) fn track(&self, registration: ListenerRegistration) {
        let mut regs = self.registrations.lock();
        regs.retain(|r| !r.is_removed());
        regs.push(registration);
    }

    pub(crate) fn remove_all(&self) {
        let regs: Vec<ListenerRegistration> = std::mem::take(&mut *self.registrations.lock());
        for r in regs {
            r.remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourcePath;
    use crate::query::QueryDescriptor;
    use std::sync::atomic::AtomicUsize;

    fn empty_snapshot(from_cache: bool) -> QuerySnapshot {
        let q = QueryDescriptor::for_collection(ResourcePath::parse("c").unwrap()).unwrap();
        QuerySnapshot::new(q, vec![], SnapshotMetadata { has_pending_writes: false, is_from_cache: from_cache })
    }

    fn counting_sink(changes: MetadataChanges) -> (Arc<SnapshotSink>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sink = SnapshotSink::new(changes, Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        (sink, hits)
    }

    #[test]
    fn metadata_only_changes_respect_policy() {
        let (sink, hits) = counting_sink(MetadataChanges::Exclude);
        sink.next(Ok(empty_snapshot(true)));
        sink.next(Ok(empty_snapshot(false)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let (sink, hits) = counting_sink(MetadataChanges::Include);
        sink.next(Ok(empty_snapshot(true)));
        sink.next(Ok(empty_snapshot(false)));
        sink.next(Ok(empty_snapshot(false)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    fn doc_snapshot(data: bson::Document, pending: bool) -> QuerySnapshot {
        let q = QueryDescriptor::for_collection(ResourcePath::parse("c").unwrap()).unwrap();
        let key = crate::model::DocumentKey::from_path(ResourcePath::parse("c/x").unwrap()).unwrap();
        let meta = SnapshotMetadata { has_pending_writes: pending, is_from_cache: false };
        QuerySnapshot::new(q, vec![DocumentSnapshot::new(key, Some(data), meta)], SnapshotMetadata::default())
    }

    #[test]
    fn unchanged_data_is_not_redelivered() {
        let (sink, hits) = counting_sink(MetadataChanges::Exclude);
        sink.next(Ok(doc_snapshot(bson::doc! {"v": f64::NAN, "n": 1}, false)));
        sink.next(Ok(doc_snapshot(bson::doc! {"n": 1, "v": f64::NAN}, false)));
        sink.next(Ok(doc_snapshot(bson::doc! {"v": f64::NAN, "n": 1}, true)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sink.next(Ok(doc_snapshot(bson::doc! {"v": f64::NAN, "n": 2}, true)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let (sink, hits) = counting_sink(MetadataChanges::Include);
        sink.next(Ok(doc_snapshot(bson::doc! {"n": 1}, false)));
        sink.next(Ok(doc_snapshot(bson::doc! {"n": 1}, true)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn errors_keep_subscription_unless_fatal() {
        let (sink, hits) = counting_sink(MetadataChanges::Exclude);
        sink.next(Err(QueryError::ExecutionFailed("transient".into())));
        assert!(sink.is_active());
        sink.fail(QueryError::ExecutionFailed("fatal".into()));
        assert!(!sink.is_active());
        sink.next(Ok(empty_snapshot(false)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_from_inside_callback() {
        let slot: Arc<Mutex<Option<Arc<SnapshotSink>>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));
        let (s, h) = (slot.clone(), hits.clone());
        let sink = SnapshotSink::new(MetadataChanges::Include, Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = s.lock().as_ref() {
                me.cancel();
            }
        }));
        *slot.lock() = Some(sink.clone());
        sink.next(Ok(empty_snapshot(true)));
        sink.next(Ok(empty_snapshot(false)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!sink.is_active());
        slot.lock().take();
    }
}
