//! # docrepo Testkit
//!
//! Test utilities for docrepo.
//!
//! This crate provides:
//! - Test fixtures and repository helpers
//! - Property-based test generators using proptest
//! - Concurrent stress helpers for shared transaction sessions
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust
//! use docrepo_testkit::prelude::*;
//!
//! let repo = TestRepository::new();
//! repo.with_transaction(|session| {
//!     session.add_child(repo.root_id(), "doc", "File")?;
//!     Ok(())
//! })
//! .unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stress::*;
    pub use docrepo_core::{Session, VersionIncrement};
    pub use docrepo_state::{keys, State, Value};
    pub use docrepo_storage::IgnoredIds;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use stress::*;
