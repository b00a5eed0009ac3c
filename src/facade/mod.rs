//! User-facing query surface.
//!
//! All facades created from one [`Database`] share its promise factory; each
//! facade instance holds its own owner within it.

mod collection_reference;
mod database;
mod document_reference;
mod query;

pub use collection_reference::CollectionReference;
pub use database::Database;
pub use document_reference::DocumentReference;
pub use query::{IntoFieldPath, Query};

/// Operation kinds tracked per facade owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncApis {
    Get,
    CollectionReferenceAdd,
}
