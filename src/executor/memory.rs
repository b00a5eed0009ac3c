use crate::config::ClientSettings;
use crate::errors::{QueryError, QueryResult};
use crate::listener::SnapshotSink;
use crate::model::{DocumentKey, ResourcePath};
use crate::promise::Resolver;
use crate::query::{QueryDescriptor, run_query};
use crate::snapshot::{DocumentSnapshot, QuerySnapshot, SnapshotMetadata, Source};
use bson::Document as BsonDocument;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

use super::{QueryExecutor, SubscriptionId};

enum Job {
    Execute { query: QueryDescriptor, source: Source, resolver: Resolver<QuerySnapshot> },
    Add { collection: ResourcePath, data: BsonDocument, resolver: Resolver<DocumentKey> },
    Initial(SubscriptionId),
    Notify,
    Broadcast { error: QueryError, fatal: bool },
    Stop,
}

struct Subscription {
    query: QueryDescriptor,
    sink: Arc<SnapshotSink>,
}

struct Store {
    documents: RwLock<BTreeMap<DocumentKey, BsonDocument>>,
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    next_subscription: AtomicU64,
    injected_failures: Mutex<VecDeque<QueryError>>,
    executions: AtomicU64,
    slow_query_ms: u64,
}

impl Store {
    fn snapshot(&self, query: &QueryDescriptor, source: Source) -> QuerySnapshot {
        let start = std::time::Instant::now();
        let metadata = SnapshotMetadata { has_pending_writes: false, is_from_cache: source == Source::Cache };
        let rows = {
            let docs = self.documents.read();
            run_query(query, docs.iter())
        };
        let documents =
            rows.into_iter().map(|(k, d)| DocumentSnapshot::new(k, Some(d), metadata)).collect();
        let elapsed = start.elapsed().as_millis();
        if elapsed > u128::from(self.slow_query_ms) {
            log::warn!("slow query on {} took {elapsed} ms", query.path());
        }
        QuerySnapshot::new(query.clone(), documents, metadata)
    }

    fn insert_generated(&self, collection: &ResourcePath, data: BsonDocument) -> QueryResult<DocumentKey> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let key = DocumentKey::in_collection(collection, &id)?;
        self.documents.write().insert(key.clone(), data);
        Ok(key)
    }

    fn deliver(&self, id: SubscriptionId) {
        let target = {
            let subs = self.subscriptions.lock();
            subs.get(&id).map(|s| (s.query.clone(), Arc::clone(&s.sink)))
        };
        if let Some((query, sink)) = target {
            sink.next(Ok(self.snapshot(&query, Source::Default)));
        }
    }

    fn notify_all(&self) {
        let targets: Vec<(QueryDescriptor, Arc<SnapshotSink>)> = {
            let mut subs = self.subscriptions.lock();
            subs.retain(|_, s| s.sink.is_active());
            subs.values().map(|s| (s.query.clone(), Arc::clone(&s.sink))).collect()
        };
        for (query, sink) in targets {
            sink.next(Ok(self.snapshot(&query, Source::Default)));
        }
    }

    fn broadcast(&self, error: &QueryError, fatal: bool) {
        let sinks: Vec<Arc<SnapshotSink>> = {
            let mut subs = self.subscriptions.lock();
            let sinks = subs.values().map(|s| Arc::clone(&s.sink)).collect();
            if fatal {
                subs.clear();
            }
            sinks
        };
        for sink in sinks {
            if fatal {
                sink.fail(error.clone());
            } else {
                sink.next(Err(error.clone()));
            }
        }
    }

    fn run(&self, job: Job) {
        match job {
            Job::Execute { query, source, resolver } => {
                self.executions.fetch_add(1, Ordering::Relaxed);
                if let Some(error) = self.injected_failures.lock().pop_front() {
                    resolver.fail(error);
                    return;
                }
                resolver.resolve(self.snapshot(&query, source));
            }
            Job::Add { collection, data, resolver } => {
                let outcome = self.insert_generated(&collection, data);
                let added = outcome.is_ok();
                resolver.complete(outcome);
                if added {
                    self.notify_all();
                }
            }
            Job::Initial(id) => self.deliver(id),
            Job::Notify => self.notify_all(),
            Job::Broadcast { error, fatal } => self.broadcast(&error, fatal),
            Job::Stop => {}
        }
    }
}

/// In-memory query executor. All executions and listener deliveries run in
/// order on one worker thread.
pub struct MemoryExecutor {
    store: Arc<Store>,
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: Option<ThreadId>,
}

impl std::fmt::Debug for MemoryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryExecutor")
            .field("documents", &self.store.documents.read().len())
            .field("subscriptions", &self.store.subscriptions.lock().len())
            .finish()
    }
}

impl MemoryExecutor {
    /// Starts the worker thread.
    pub fn new(settings: &ClientSettings) -> QueryResult<Arc<Self>> {
        let store = Arc::new(Store {
            documents: RwLock::new(BTreeMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            injected_failures: Mutex::new(VecDeque::new()),
            executions: AtomicU64::new(0),
            slow_query_ms: settings.slow_query_ms,
        });
        let (tx, rx) = mpsc::channel::<Job>();
        let worker_store = Arc::clone(&store);
        let handle = thread::Builder::new()
            .name(settings.worker_thread_name.clone())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if matches!(job, Job::Stop) {
                        break;
                    }
                    worker_store.run(job);
                }
                log::debug!("executor worker stopped");
            })?;
        let worker_id = Some(handle.thread().id());
        Ok(Arc::new(Self {
            store,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            worker_id,
        }))
    }

    pub fn with_defaults() -> QueryResult<Arc<Self>> {
        Self::new(&ClientSettings::default())
    }

    fn send(&self, job: Job) -> Result<(), Job> {
        match self.jobs.lock().as_ref() {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Stores `data` under `collection/id`, replacing any existing document,
    /// and notifies listeners.
    pub fn insert(&self, collection: &str, id: &str, data: BsonDocument) -> QueryResult<DocumentKey> {
        let collection = ResourcePath::parse(collection)?;
        if !collection.is_collection() {
            return Err(QueryError::InvalidArgument(format!("'{collection}' is not a collection path")));
        }
        let key = DocumentKey::in_collection(&collection, id)?;
        self.set(&key, data);
        Ok(key)
    }

    /// Writes a document and notifies listeners.
    pub fn set(&self, key: &DocumentKey, data: BsonDocument) {
        self.store.documents.write().insert(key.clone(), data);
        let _ = self.send(Job::Notify);
    }

    /// Removes a document; returns whether it existed.
    pub fn delete(&self, key: &DocumentKey) -> bool {
        let existed = self.store.documents.write().remove(key).is_some();
        if existed {
            let _ = self.send(Job::Notify);
        }
        existed
    }

    #[must_use]
    pub fn document(&self, key: &DocumentKey) -> Option<BsonDocument> {
        self.store.documents.read().get(key).cloned()
    }

    /// The next execution fails with `error` instead of running.
    pub fn fail_next_execute(&self, error: QueryError) {
        self.store.injected_failures.lock().push_back(error);
    }

    /// Pushes an error to every active subscription; fatal errors also end them.
    pub fn broadcast_error(&self, error: QueryError, fatal: bool) {
        let _ = self.send(Job::Broadcast { error, fatal });
    }

    /// Number of `execute` requests processed so far.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.store.executions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.store.subscriptions.lock().values().filter(|s| s.sink.is_active()).count()
    }

    /// Stops the worker after it drains queued jobs. Later requests fail.
    pub fn shutdown(&self) {
        if let Some(tx) = self.jobs.lock().take() {
            let _ = tx.send(Job::Stop);
        }
        if self.worker_id == Some(thread::current().id()) {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MemoryExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn shut_down_error() -> QueryError {
    QueryError::ExecutionFailed("executor is shut down".into())
}

impl QueryExecutor for MemoryExecutor {
    fn execute(&self, query: &QueryDescriptor, source: Source, resolver: Resolver<QuerySnapshot>) {
        let job = Job::Execute { query: query.clone(), source, resolver };
        if let Err(Job::Execute { resolver, .. }) = self.send(job) {
            resolver.fail(shut_down_error());
        }
    }

    fn subscribe(&self, query: &QueryDescriptor, sink: Arc<SnapshotSink>) -> QueryResult<SubscriptionId> {
        let id = SubscriptionId(self.store.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.store.subscriptions.lock().insert(id, Subscription { query: query.clone(), sink });
        if self.send(Job::Initial(id)).is_err() {
            self.store.subscriptions.lock().remove(&id);
            return Err(shut_down_error());
        }
        log::debug!("{id} subscribed to {}", query.path());
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.store.subscriptions.lock().remove(&id);
    }

    fn add_document(&self, collection: &ResourcePath, data: BsonDocument, resolver: Resolver<DocumentKey>) {
        let job = Job::Add { collection: collection.clone(), data, resolver };
        if let Err(Job::Add { resolver, .. }) = self.send(job) {
            resolver.fail(shut_down_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::channel;
    use crate::snapshot::MetadataChanges;
    use std::time::Duration;

    fn people() -> QueryDescriptor {
        QueryDescriptor::for_collection(ResourcePath::parse("people").unwrap()).unwrap()
    }

    #[test]
    fn executes_on_worker_thread() {
        let exec = MemoryExecutor::with_defaults().unwrap();
        exec.insert("people", "a", bson::doc! {"age": 1}).unwrap();
        let (result, resolver) = channel::<QuerySnapshot>("t");
        let (tx, rx) = mpsc::channel();
        result.on_completion(move |_| {
            let _ = tx.send(thread::current().name().map(str::to_string));
        });
        exec.execute(&people(), Source::Cache, resolver);
        let snap = result.wait().unwrap();
        assert_eq!(snap.ids(), vec!["a".to_string()]);
        assert!(snap.metadata().is_from_cache);
        let thread_name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(thread_name.as_deref(), Some("querylite-executor"));
        assert_eq!(exec.execution_count(), 1);
    }

    #[test]
    fn injected_failure_goes_through_resolver() {
        let exec = MemoryExecutor::with_defaults().unwrap();
        exec.fail_next_execute(QueryError::ExecutionFailed("unavailable".into()));
        let (result, resolver) = channel::<QuerySnapshot>("t");
        exec.execute(&people(), Source::Default, resolver);
        assert!(matches!(result.wait(), Err(QueryError::ExecutionFailed(_))));
    }

    #[test]
    fn requests_after_shutdown_fail() {
        let exec = MemoryExecutor::with_defaults().unwrap();
        exec.shutdown();
        let (result, resolver) = channel::<QuerySnapshot>("t");
        exec.execute(&people(), Source::Default, resolver);
        assert!(matches!(result.wait(), Err(QueryError::ExecutionFailed(_))));
        let sink = SnapshotSink::new(MetadataChanges::Exclude, Box::new(|_| {}));
        assert!(exec.subscribe(&people(), sink).is_err());
    }

    #[test]
    fn subscriptions_receive_initial_and_updates() {
        let exec = MemoryExecutor::with_defaults().unwrap();
        let (tx, rx) = mpsc::channel();
        let sink = SnapshotSink::new(MetadataChanges::Exclude, Box::new(move |r: Result<QuerySnapshot, QueryError>| {
            let _ = tx.send(r.map(|s| s.len()));
        }));
        let id = exec.subscribe(&people(), sink).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(), 0);
        exec.insert("people", "a", bson::doc! {"age": 1}).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap(), 1);
        exec.unsubscribe(id);
        assert_eq!(exec.subscription_count(), 0);
    }

    #[test]
    fn add_document_generates_id() {
        let exec = MemoryExecutor::with_defaults().unwrap();
        let (result, resolver) = channel::<DocumentKey>("t");
        exec.add_document(&ResourcePath::parse("people").unwrap(), bson::doc! {"age": 3}, resolver);
        let key = result.wait().unwrap();
        assert_eq!(key.collection_path().to_string(), "people");
        assert_eq!(exec.document(&key), Some(bson::doc! {"age": 3}));
    }
}
