//! Unified error handling for the store.
//!
//! Every public operation returns `DbResult<T>`. Variants map one-to-one
//! onto the failure categories callers can act on; `code()` gives a stable
//! machine-readable identifier and `status_code()` the HTTP mapping used
//! by the replication endpoints.

use thiserror::Error;

/// Result type for all store operations
pub type DbResult<T> = Result<T, DbError>;

/// Store-wide error type
#[derive(Debug, Error)]
pub enum DbError {
    /// Empty, reserved, or illegal-character id or collection name
    #[error("validation error: {0}")]
    Validation(String),

    /// Collection directory does not exist
    #[error("collection '{0}' doesn't exist")]
    CollectionNotFound(String),

    /// Document file does not exist
    #[error("document '{id}' doesn't exist in '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    /// Filesystem failure (permission, disk full, rename failure)
    #[error("io error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Cipher initialization, encryption or decryption failure
    #[error("codec error: {0}")]
    Codec(String),

    /// JSON marshal/unmarshal failure on a mutation path
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document file exists but does not parse back into a document
    #[error("corrupt document '{id}' in '{collection}': {reason}")]
    CorruptDocument {
        collection: String,
        id: String,
        reason: String,
    },

    /// Unsupported operator, mismatched filter type, unparseable timestamp
    #[error("query error: {0}")]
    Query(String),

    /// Network error, bad state transition, or auth failure between peers
    #[error("replication error: {0}")]
    Replication(String),

    /// Operation on a cancelled subscription or a forbidden collection-wide delete
    #[error("{0}")]
    Lifecycle(String),
}

impl DbError {
    /// Create an io error with call-site context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a replication error
    pub fn replication(msg: impl Into<String>) -> Self {
        Self::Replication(msg.into())
    }

    /// Stable machine-readable code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::Io { .. } => "IO_ERROR",
            Self::Codec(_) => "CODEC_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::CorruptDocument { .. } => "CORRUPT_DOCUMENT",
            Self::Query(_) => "QUERY_ERROR",
            Self::Replication(_) => "REPLICATION_ERROR",
            Self::Lifecycle(_) => "LIFECYCLE_ERROR",
        }
    }

    /// HTTP status code used by the replication endpoints
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Query(_) => 400,
            Self::CollectionNotFound(_) | Self::DocumentNotFound { .. } => 404,
            Self::Lifecycle(_) => 403,
            _ => 500,
        }
    }
}
