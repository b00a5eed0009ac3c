//! The query-execution collaborator boundary.

mod memory;

pub use memory::MemoryExecutor;

use crate::errors::QueryResult;
use crate::listener::SnapshotSink;
use crate::model::{DocumentKey, ResourcePath};
use crate::promise::Resolver;
use crate::query::QueryDescriptor;
use crate::snapshot::{QuerySnapshot, Source};
use bson::Document as BsonDocument;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Executes queries on behalf of the facade.
///
/// Implementations do their work on their own threads. Results must only
/// ever be reported through the resolver or sink they were handed, never by
/// panicking or blocking the caller.
pub trait QueryExecutor: Send + Sync {
    /// Runs `query` once and completes `resolver` with the result.
    fn execute(&self, query: &QueryDescriptor, source: Source, resolver: Resolver<QuerySnapshot>);

    /// Starts delivering snapshots of `query` into `sink` until unsubscribed.
    ///
    /// # Errors
    /// Implementations may refuse a subscription synchronously.
    fn subscribe(&self, query: &QueryDescriptor, sink: Arc<SnapshotSink>) -> QueryResult<SubscriptionId>;

    /// Stops a subscription. Unknown or already removed ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Stores a new document with a generated id in `collection`.
    fn add_document(&self, collection: &ResourcePath, data: BsonDocument, resolver: Resolver<DocumentKey>);
}
