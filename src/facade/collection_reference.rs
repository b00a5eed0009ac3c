use crate::errors::QueryResult;
use crate::model::{DocumentKey, ResourcePath};
use crate::promise::{AsyncResult, channel};
use crate::query::QueryDescriptor;
use bson::Document as BsonDocument;
use std::ops::Deref;

use super::{AsyncApis, Database, DocumentReference, Query};

/// A query over every document of one collection, plus writes into it.
///
/// Dereferences to the wrapped [`Query`]. `add` runs on that query's owner
/// under its own operation kind, so dropping the reference abandons pending
/// adds and pending gets alike.
#[derive(Clone, PartialEq, Eq)]
pub struct CollectionReference {
    query: Query,
}

impl std::fmt::Debug for CollectionReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CollectionReference").field(&self.path()).finish()
    }
}

impl CollectionReference {
    pub(crate) fn new(path: ResourcePath, db: Database) -> QueryResult<Self> {
        Ok(Self { query: Query::new(QueryDescriptor::for_collection(path)?, db) })
    }

    fn resource_path(&self) -> &ResourcePath {
        self.query.descriptor().path()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.resource_path().last_segment().unwrap_or_default()
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.resource_path().to_string()
    }

    /// The document containing this collection, if it is a subcollection.
    #[must_use]
    pub fn parent(&self) -> Option<DocumentReference> {
        let parent = self.resource_path().parent().filter(|p| !p.is_empty())?;
        DocumentReference::new(parent, self.query.database().clone()).ok()
    }

    /// # Errors
    /// `InvalidArgument` if `id` is empty or contains `/`.
    pub fn document(&self, id: &str) -> QueryResult<DocumentReference> {
        let key = DocumentKey::in_collection(self.resource_path(), id)?;
        Ok(DocumentReference::from_key(key, self.query.database().clone()))
    }

    /// Stores `data` under a generated id. Every call writes; concurrent adds
    /// are never merged.
    pub fn add(&self, data: BsonDocument) -> AsyncResult<DocumentReference> {
        let (result, resolver) = self.query.owner().start::<DocumentReference>(AsyncApis::CollectionReferenceAdd);
        let (key_result, key_resolver) = channel::<DocumentKey>("collection-add");
        let db = self.query.database().clone();
        key_result.on_completion(move |outcome| {
            resolver.complete(outcome.map(|key| DocumentReference::from_key(key, db)));
        });
        // The key slot lives until the add settles or its owner goes away.
        result.on_completion(move |_| drop(key_result));
        self.query.database().executor().add_document(self.resource_path(), data, key_resolver);
        result
    }

    #[must_use]
    pub fn as_query(&self) -> &Query {
        &self.query
    }

    /// Result of the most recent `add`, while it is still tracked.
    #[must_use]
    pub fn add_status(&self) -> Option<crate::promise::SlotStatus> {
        self.query.owner().status(AsyncApis::CollectionReferenceAdd)
    }
}

impl Deref for CollectionReference {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl From<CollectionReference> for Query {
    fn from(c: CollectionReference) -> Self {
        c.query
    }
}
