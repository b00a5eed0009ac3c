use crate::model::{DocumentKey, FieldPath};
use crate::query::QueryDescriptor;
use crate::value::{Value, get_field};
use bson::Document as BsonDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a one-shot read may be served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[default]
    Default,
    Server,
    Cache,
}

/// Whether listeners also hear about metadata-only changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataChanges {
    #[default]
    Exclude,
    Include,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub has_pending_writes: bool,
    pub is_from_cache: bool,
}

/// Read access to a document snapshot, as needed to build cursor bounds.
pub trait SnapshotFields {
    fn exists(&self) -> bool;
    fn field_value(&self, field: &FieldPath) -> Option<Value>;
    fn identity_key(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<BsonDocument>,
    metadata: SnapshotMetadata,
}

impl DocumentSnapshot {
    #[must_use]
    pub fn new(key: DocumentKey, data: Option<BsonDocument>, metadata: SnapshotMetadata) -> Self {
        Self { key, data, metadata }
    }

    #[must_use]
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.key.id()
    }

    #[must_use]
    pub fn data(&self) -> Option<&BsonDocument> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn metadata(&self) -> SnapshotMetadata {
        self.metadata
    }

    /// Reads a dotted field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        let path = FieldPath::parse(field).ok()?;
        get_field(self.data.as_ref()?, &path)
    }
}

impl SnapshotFields for DocumentSnapshot {
    fn exists(&self) -> bool {
        self.data.is_some()
    }

    fn field_value(&self, field: &FieldPath) -> Option<Value> {
        if field.is_document_id() {
            return Some(self.identity_key());
        }
        get_field(self.data.as_ref()?, field).cloned()
    }

    fn identity_key(&self) -> Value {
        self.key.to_value()
    }
}

/// The result of running a query once.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    query: QueryDescriptor,
    documents: Vec<DocumentSnapshot>,
    metadata: SnapshotMetadata,
    read_time: DateTime<Utc>,
}

impl QuerySnapshot {
    #[must_use]
    pub fn new(query: QueryDescriptor, documents: Vec<DocumentSnapshot>, metadata: SnapshotMetadata) -> Self {
        Self { query, documents, metadata, read_time: Utc::now() }
    }

    #[must_use]
    pub fn query(&self) -> &QueryDescriptor {
        &self.query
    }

    #[must_use]
    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    #[must_use]
    pub fn metadata(&self) -> SnapshotMetadata {
        self.metadata
    }

    #[must_use]
    pub fn read_time(&self) -> DateTime<Utc> {
        self.read_time
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentSnapshot> {
        self.documents.iter()
    }

    /// Document ids in result order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.id().to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a DocumentSnapshot;
    type IntoIter = std::slice::Iter<'a, DocumentSnapshot>;
    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}
