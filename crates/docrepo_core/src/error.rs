//! Error types for docrepo core.

use docrepo_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in docrepo core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Document store error, surfaced unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Operation on a session handle after it was closed.
    #[error("cannot use closed connection handle: {session_id}")]
    ClosedHandle {
        /// Id of the handle's session.
        session_id: String,
    },

    /// Operation on a session after it was closed.
    #[error("session is closed")]
    SessionClosed,

    /// A sibling with the same name already exists.
    #[error("document {name:?} already exists under {parent_id}")]
    NameConflict {
        /// The parent document.
        parent_id: String,
        /// The conflicting name.
        name: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// The calling thread has no active transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// A blocking wait was interrupted.
    #[error("interrupted")]
    Interrupted,

    /// A collaborator (store, work queue) cannot be reached.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Description of why it is unavailable.
        message: String,
    },
}

impl CoreError {
    /// Creates a closed handle error.
    pub fn closed_handle(session_id: impl Into<String>) -> Self {
        Self::ClosedHandle {
            session_id: session_id.into(),
        }
    }

    /// Creates a name conflict error.
    pub fn name_conflict(parent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NameConflict {
            parent_id: parent_id.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a document not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::Storage(StorageError::not_found(id))
    }

    /// Returns true for a missing document.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }

    /// Returns true for a duplicate document id.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Storage(StorageError::AlreadyExists { .. }))
    }

    /// Returns true for use of a closed handle.
    pub fn is_closed_handle(&self) -> bool {
        matches!(self, Self::ClosedHandle { .. })
    }
}
