use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Too many bound values: {values} values for {orderings} orderings")]
    CardinalityMismatch { values: usize, orderings: usize },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Operation abandoned: owner was destroyed")]
    Abandoned,

    #[error("App not found: {0}")]
    NoSuchApp(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(String),

    #[error("TOML: {0}")]
    Toml(String),
}

impl QueryError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<toml::de::Error> for QueryError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
