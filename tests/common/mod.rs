//! Shared fixtures for integration tests.
#![allow(dead_code)]

use bson::Document as BsonDocument;
use parking_lot::Mutex;
use querylite::executor::{QueryExecutor, SubscriptionId};
use querylite::listener::SnapshotSink;
use querylite::model::{DocumentKey, ResourcePath};
use querylite::promise::Resolver;
use querylite::query::QueryDescriptor;
use querylite::snapshot::{QuerySnapshot, SnapshotMetadata, Source};
use querylite::{App, AppOptions, AppRegistry, Database, MemoryExecutor};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub fn app(name: &str) -> Arc<App> {
    AppRegistry::default().create(AppOptions { project_id: "test".into(), ..AppOptions::default() }, name)
}

pub fn memory_db() -> (Database, Arc<MemoryExecutor>) {
    let exec = MemoryExecutor::with_defaults().unwrap();
    (Database::new(app("memory"), exec.clone()), exec)
}

/// Executor that records requests and completes them only when told to.
#[derive(Default)]
pub struct HeldExecutor {
    pub executions: Mutex<Vec<(QueryDescriptor, Source, Resolver<QuerySnapshot>)>>,
    pub adds: Mutex<Vec<(ResourcePath, BsonDocument, Resolver<DocumentKey>)>>,
    pub subscriptions: Mutex<Vec<(SubscriptionId, QueryDescriptor, Arc<SnapshotSink>)>>,
    pub unsubscribed: Mutex<Vec<SubscriptionId>>,
    next_id: AtomicU64,
}

impl HeldExecutor {
    pub fn execute_count(&self) -> usize {
        self.executions.lock().len()
    }

    /// Resolves every held execution with an empty snapshot.
    pub fn release_all(&self) {
        let held: Vec<_> = self.executions.lock().drain(..).collect();
        for (query, _, resolver) in held {
            resolver.resolve(QuerySnapshot::new(query, vec![], SnapshotMetadata::default()));
        }
    }

    pub fn sink(&self, index: usize) -> Arc<SnapshotSink> {
        Arc::clone(&self.subscriptions.lock()[index].2)
    }
}

impl QueryExecutor for HeldExecutor {
    fn execute(&self, query: &QueryDescriptor, source: Source, resolver: Resolver<QuerySnapshot>) {
        self.executions.lock().push((query.clone(), source, resolver));
    }

    fn subscribe(&self, query: &QueryDescriptor, sink: Arc<SnapshotSink>) -> querylite::QueryResult<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.lock().push((id, query.clone(), sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.unsubscribed.lock().push(id);
    }

    fn add_document(&self, collection: &ResourcePath, data: BsonDocument, resolver: Resolver<DocumentKey>) {
        self.adds.lock().push((collection.clone(), data, resolver));
    }
}

pub fn held_db() -> (Database, Arc<HeldExecutor>) {
    let exec = Arc::new(HeldExecutor::default());
    (Database::new(app("held"), exec.clone()), exec)
}
