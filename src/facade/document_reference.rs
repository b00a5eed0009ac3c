use crate::errors::QueryResult;
use crate::model::{DocumentKey, ResourcePath};

use super::{CollectionReference, Database};

/// A reference to one document location. Holds no data.
#[derive(Clone)]
pub struct DocumentReference {
    key: DocumentKey,
    db: Database,
}

impl std::fmt::Debug for DocumentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DocumentReference").field(&self.key.path().to_string()).finish()
    }
}

impl DocumentReference {
    pub(crate) fn new(path: ResourcePath, db: Database) -> QueryResult<Self> {
        Ok(Self { key: DocumentKey::from_path(path)?, db })
    }

    pub(crate) fn from_key(key: DocumentKey, db: Database) -> Self {
        Self { key, db }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.key.id()
    }

    /// Slash-separated path from the database root.
    #[must_use]
    pub fn path(&self) -> String {
        self.key.path().to_string()
    }

    #[must_use]
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// The collection containing this document.
    pub fn parent(&self) -> QueryResult<CollectionReference> {
        CollectionReference::new(self.key.collection_path(), self.db.clone())
    }

    /// A subcollection under this document.
    pub fn collection(&self, path: &str) -> QueryResult<CollectionReference> {
        let mut full = self.key.path().clone();
        for segment in ResourcePath::parse(path)?.segments() {
            full = full.child(segment);
        }
        CollectionReference::new(full, self.db.clone())
    }
}

impl PartialEq for DocumentReference {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.db.same_as(&other.db)
    }
}

impl Eq for DocumentReference {}
