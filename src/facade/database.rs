use crate::app::App;
use crate::errors::{QueryError, QueryResult};
use crate::executor::QueryExecutor;
use crate::model::ResourcePath;
use crate::promise::PromiseFactory;
use std::sync::Arc;

use super::{AsyncApis, CollectionReference, DocumentReference};

struct DatabaseInner {
    app: Arc<App>,
    executor: Arc<dyn QueryExecutor>,
    promises: Arc<PromiseFactory<AsyncApis>>,
}

/// Entry point for building queries against one app's data.
///
/// Cheap to clone; clones share the executor and the promise factory.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("app", &self.inner.app.name()).finish()
    }
}

impl Database {
    #[must_use]
    pub fn new(app: Arc<App>, executor: Arc<dyn QueryExecutor>) -> Self {
        log::debug!("database created for app {}", app.name());
        Self { inner: Arc::new(DatabaseInner { app, executor, promises: PromiseFactory::new() }) }
    }

    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.inner.app
    }

    pub(crate) fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.inner.executor
    }

    /// The promise factory every facade of this database allocates owners from.
    #[must_use]
    pub fn promises(&self) -> &Arc<PromiseFactory<AsyncApis>> {
        &self.inner.promises
    }

    pub fn collection(&self, path: &str) -> QueryResult<CollectionReference> {
        let path = ResourcePath::parse(path)?;
        CollectionReference::new(path, self.clone())
    }

    pub fn document(&self, path: &str) -> QueryResult<DocumentReference> {
        let path = ResourcePath::parse(path)?;
        if path.is_collection() {
            return Err(QueryError::InvalidArgument(format!("'{path}' is not a document path")));
        }
        DocumentReference::new(path, self.clone())
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
