use thiserror::Error;

/// Result type for session store operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while persisting session state
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session event: {message}")]
    InvalidEvent { message: String },

    #[error("Duplicate key in {collection}: {key}")]
    Conflict { collection: String, key: String },

    #[error("Malformed document in {collection}: {message}")]
    MalformedDocument { collection: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Document store error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn invalid_event<S: Into<String>>(message: S) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    /// Shorthand for a lifecycle payload missing a required field
    pub fn missing_field(kind: &str, field: &str) -> Self {
        Self::invalid_event(format!("{kind} event requires `{field}`"))
    }

    pub fn conflict<C: Into<String>, K: Into<String>>(collection: C, key: K) -> Self {
        Self::Conflict {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn malformed<C: Into<String>, M: Into<String>>(collection: C, message: M) -> Self {
        Self::MalformedDocument {
            collection: collection.into(),
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
