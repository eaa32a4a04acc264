//! # docrepo State
//!
//! The schema-less record that is the unit of storage in a docrepo
//! repository.
//!
//! A [`State`] is an ordered mapping from field name to [`Value`]. A handful
//! of field names are reserved (see [`keys`]) and carry the structural
//! information of a document: its id, its place in the tree, its proxy and
//! version links.
//!
//! ## Usage
//!
//! ```
//! use docrepo_state::{keys, State, Value};
//!
//! let state = State::with_id("doc-1")
//!     .with(keys::KEY_PARENT_ID, Value::reference("root"))
//!     .with(keys::KEY_NAME, "report")
//!     .with("title", "Quarterly report");
//!
//! assert_eq!(state.id(), Some("doc-1"));
//! assert_eq!(state.parent_id(), Some("root"));
//! assert_eq!(state.get("title").and_then(Value::as_str), Some("Quarterly report"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod keys;
mod state;
mod value;

pub use state::State;
pub use value::Value;
