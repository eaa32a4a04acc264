//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No document with this id is stored.
    #[error("missing document: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A document with this id is already stored.
    #[error("document already exists: {id}")]
    AlreadyExists {
        /// The conflicting id.
        id: String,
    },

    /// The state handed to a write has no `id` field.
    #[error("state has no id")]
    MissingId,

    /// The query predicate or ordering cannot be evaluated.
    #[error("invalid expression: {message}")]
    InvalidExpression {
        /// Description of the problem.
        message: String,
    },

    /// The store cannot be reached.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of why the store is unavailable.
        message: String,
    },
}

impl StorageError {
    /// Creates a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates an already exists error.
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Creates an invalid expression error.
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}
