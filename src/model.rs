use crate::errors::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const DOCUMENT_ID_FIELD: &str = "__name__";

/// A dotted path of field names inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Builds a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(QueryError::invalid("field path must not be empty"));
        }
        if segments.iter().any(String::is_empty) {
            return Err(QueryError::invalid("field path segments must not be empty"));
        }
        Ok(Self { segments })
    }

    /// Parses a dotted path such as `"address.city"`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty path, leading/trailing dots or `..`.
    pub fn parse(dotted: &str) -> QueryResult<Self> {
        if dotted.is_empty() {
            return Err(QueryError::invalid("field path must not be empty"));
        }
        Self::from_segments(dotted.split('.')).map_err(|_| {
            QueryError::InvalidArgument(format!("invalid field path '{dotted}'"))
        })
    }

    /// The pseudo-field naming a document's own key.
    #[must_use]
    pub fn document_id() -> Self {
        Self { segments: vec![DOCUMENT_ID_FIELD.to_string()] }
    }

    #[must_use]
    pub fn is_document_id(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == DOCUMENT_ID_FIELD
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = QueryError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

/// A slash separated path to a collection or document, e.g. `users/alice/posts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// # Errors
    /// Returns `InvalidArgument` on empty segments (`a//b`, leading or trailing `/`).
    pub fn parse(path: &str) -> QueryResult<Self> {
        if path.is_empty() {
            return Ok(Self::default());
        }
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(QueryError::InvalidArgument(format!("invalid resource path '{path}'")));
        }
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Collections live at odd-length paths.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.segments.len() % 2 == 1
    }

    #[must_use]
    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self { segments: rest.to_vec() })
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Identity of a document: its full path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey(ResourcePath);

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> QueryResult<Self> {
        if path.is_empty() || path.is_collection() {
            return Err(QueryError::InvalidArgument(format!(
                "'{path}' is not a document path"
            )));
        }
        Ok(Self(path))
    }

    pub fn in_collection(collection: &ResourcePath, id: &str) -> QueryResult<Self> {
        if id.is_empty() || id.contains('/') {
            return Err(QueryError::InvalidArgument(format!("invalid document id '{id}'")));
        }
        Self::from_path(collection.child(id))
    }

    #[must_use]
    pub fn path(&self) -> &ResourcePath {
        &self.0
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.0.last_segment().unwrap_or_default()
    }

    #[must_use]
    pub fn collection_path(&self) -> ResourcePath {
        self.0.parent().unwrap_or_default()
    }

    /// The value this key takes when a query orders or filters by `__name__`.
    #[must_use]
    pub fn to_value(&self) -> crate::value::Value {
        crate::value::Value::String(self.0.to_string())
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
