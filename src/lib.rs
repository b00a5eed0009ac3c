//! Query construction and async result plumbing for a document-database client.
//!
//! Queries are immutable: every builder call returns a new [`Query`]. One-shot
//! reads return an [`AsyncResult`] that can be waited on, awaited, or given a
//! callback; repeated `get` calls on a query while one is in flight observe the
//! same result. Execution itself is delegated to a [`QueryExecutor`].

pub mod app;
pub mod config;
pub mod errors;
pub mod executor;
pub mod facade;
pub mod listener;
pub mod logger;
pub mod model;
pub mod promise;
pub mod query;
pub mod snapshot;
pub mod utils;
pub mod value;

pub use app::{App, AppOptions, AppRegistry};
pub use config::ClientSettings;
pub use errors::{QueryError, QueryResult};
pub use executor::{MemoryExecutor, QueryExecutor, SubscriptionId};
pub use facade::{AsyncApis, CollectionReference, Database, DocumentReference, Query};
pub use listener::ListenerRegistration;
pub use model::{DocumentKey, FieldPath, ResourcePath};
pub use promise::{AsyncResult, SlotStatus};
pub use query::{Direction, FilterOperator, QueryDescriptor};
pub use snapshot::{DocumentSnapshot, MetadataChanges, QuerySnapshot, SnapshotMetadata, Source};
pub use value::Value;
