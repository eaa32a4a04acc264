//! # docrepo storage
//!
//! Document store contract and query engine for docrepo.
//!
//! This crate is the lowest layer of the repository. A store holds complete
//! document states keyed by id and answers the lookups the session layer
//! needs: by id, by parent and name, by field value, by array membership,
//! and by predicate with ordering and pagination.
//!
//! ## Design Principles
//!
//! - Stores keep whole states; writers replace, never patch
//! - No knowledge of sessions, transactions or the document tree
//! - Must be `Send + Sync` for concurrent access
//! - Every scan honors a set of ignored ids
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - linear-scan reference store
//!
//! ## Example
//!
//! ```rust
//! use docrepo_state::State;
//! use docrepo_storage::{DocumentStore, IgnoredIds, InMemoryStore, Query};
//!
//! let store = InMemoryStore::new();
//! store.create_state(State::with_id("a").with("size", 10i64)).unwrap();
//! store.create_state(State::with_id("b").with("size", 20i64)).unwrap();
//!
//! let query = Query::parse("size > 15", "").unwrap();
//! let page = store.query_and_fetch(&query, &IgnoredIds::new()).unwrap();
//! assert_eq!(page.items[0].id(), Some("b"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
pub mod query;

pub use backend::{ArrayMatches, DocumentStore, IgnoredIds};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use query::{
    execute, CountMode, Expression, OrderBy, OrderByItem, PartialList, Query, TotalSize,
};
