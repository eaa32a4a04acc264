//! Transaction-scoped session sharing.
//!
//! Inside a transaction every call to
//! [`SessionCoordinator::get_session`] returns a new [`crate::SessionHandle`]
//! over one shared [`crate::DocumentSession`], owned by the transaction's
//! [`TransactionContext`]. Handles from the same transaction see each
//! other's writes immediately. When the transaction completes the context
//! commits the shared session (before completion), then closes it together
//! with every handle (after completion).
//!
//! Transaction lifecycle comes from a [`TransactionProvider`];
//! [`LocalTransactionManager`] is a thread-bound implementation.

mod context;
mod coordinator;
mod provider;

pub use context::TransactionContext;
pub use coordinator::SessionCoordinator;
pub use provider::{LocalTransactionManager, Synchronization, TransactionProvider};
