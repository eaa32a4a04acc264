//! # docrepo Core
//!
//! Sessions and transaction-scoped session sharing for docrepo.
//!
//! This crate provides:
//! - The [`Session`] surface: store primitives plus document-tree operations
//!   (children, move, copy, proxies, versions, ACLs, queries)
//! - [`SessionCoordinator`], which shares one session per transaction and
//!   hands each caller a revocable [`SessionHandle`]
//! - [`LocalTransactionManager`], a thread-bound [`TransactionProvider`]
//! - A background fulltext queue fed by session commits
//! - The [`Repository`] facade tying them together

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
mod config;
mod error;
pub mod fulltext;
mod id;
pub mod interrupt;
mod repository;
mod session;
mod transaction;
mod types;

pub use acl::{Ace, Acl, Acp};
pub use config::{IdStrategy, RepositoryConfig};
pub use error::{CoreError, CoreResult};
pub use fulltext::{FulltextJob, FulltextQueue, FulltextStats, WorkSubmitter};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use interrupt::InterruptHandle;
pub use repository::Repository;
pub use session::{DocumentSession, Session, SessionHandle, TYPE_ROOT, TYPE_VERSION_STORAGE};
pub use transaction::{
    LocalTransactionManager, SessionCoordinator, Synchronization, TransactionContext,
    TransactionProvider,
};
pub use types::{CompletionStatus, TransactionId, VersionIncrement};
