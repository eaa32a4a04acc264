//! Sessions over a repository.
//!
//! A [`Session`] is the one capability surface callers use: the document
//! store primitives plus the document-tree operations built on top of them.
//!
//! - [`DocumentSession`] does the work against the store
//! - [`SessionHandle`] is a revocable forwarder to the document session a
//!   transaction shares among all its handles

mod document;
mod handle;

pub use document::{DocumentSession, TYPE_ROOT, TYPE_VERSION_STORAGE};
pub(crate) use document::SessionBackend;
pub use handle::SessionHandle;

use crate::acl::Acp;
use crate::error::CoreResult;
use crate::types::VersionIncrement;
use docrepo_state::{State, Value};
use docrepo_storage::{ArrayMatches, IgnoredIds, PartialList, Query};
use std::sync::Arc;
use std::time::Duration;

/// Operations available on a repository session.
///
/// Store-level methods behave exactly like the matching
/// [`docrepo_storage::DocumentStore`] methods; their errors surface as
/// [`crate::CoreError::Storage`]. Tree operations keep the document
/// invariants: sibling names stay unique, `ancestorIds` stay accurate and
/// proxy back references (`proxyIds`) stay in sync with their proxies.
///
/// # Concurrency
///
/// Tree operations on one session, and on every handle sharing it, are
/// serialized, so concurrent `add_child` calls with the same name yield
/// one document. Separate sessions over the same store are not: callers
/// writing one folder through several sessions must serialize themselves.
pub trait Session: Send + Sync {
    /// Returns the caller-chosen session id.
    fn session_id(&self) -> &str;

    /// Returns false once the session is closed.
    fn is_live(&self) -> bool;

    /// Closes the session. Idempotent.
    fn close(&self);

    /// Returns the repository root id.
    fn root_id(&self) -> CoreResult<String>;

    /// Reads a state by id.
    fn read_state(&self, id: &str) -> CoreResult<Option<Arc<State>>>;

    /// Reads several states, one slot per id, in order.
    fn read_states(&self, ids: &[String]) -> CoreResult<Vec<Option<Arc<State>>>>;

    /// Stores a new state.
    fn create_state(&self, state: State) -> CoreResult<()>;

    /// Replaces a stored state.
    fn update_state(&self, state: State) -> CoreResult<()>;

    /// Deletes a single stored state, without touching its subtree.
    fn delete_state(&self, id: &str) -> CoreResult<()>;

    /// Finds a child by parent and name.
    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &IgnoredIds,
    ) -> CoreResult<Option<Arc<State>>>;

    /// Returns true if `read_child_state` would find a document.
    fn has_child(&self, parent_id: &str, name: &str, ignored: &IgnoredIds) -> CoreResult<bool>;

    /// States whose `key` equals `value` exactly.
    fn query_key_value(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> CoreResult<Vec<Arc<State>>>;

    /// Whether any state has `key` equal to `value`.
    fn query_key_value_presence(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> CoreResult<bool>;

    /// States whose array field `key` contains `value`.
    fn query_key_value_array(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
        want_proxy_targets: bool,
        want_target_proxies: bool,
    ) -> CoreResult<ArrayMatches>;

    /// Evaluates a prepared query.
    fn query_and_fetch(
        &self,
        query: &Query,
        ignored: &IgnoredIds,
    ) -> CoreResult<PartialList<Arc<State>>>;

    /// Parses and evaluates a query.
    ///
    /// `count_up_to` is `-1` for an exact total, `0` to skip counting, or a
    /// bound beyond which the total is reported as truncated.
    fn query(
        &self,
        predicate: &str,
        order_by: &str,
        limit: usize,
        offset: usize,
        count_up_to: i64,
    ) -> CoreResult<PartialList<Arc<State>>>;

    /// Children of a document, in id order.
    fn get_children(&self, parent_id: &str) -> CoreResult<Vec<Arc<State>>>;

    /// Whether a document has a child with this name.
    fn exists_child(&self, parent_id: &str, name: &str) -> CoreResult<bool>;

    /// Creates a child document.
    fn add_child(&self, parent_id: &str, name: &str, primary_type: &str) -> CoreResult<Arc<State>>;

    /// Removes a document and its whole subtree.
    ///
    /// Proxies whose targets are removed are removed too; targets that
    /// survive lose the removed proxies from `proxyIds`.
    fn remove(&self, id: &str) -> CoreResult<()>;

    /// Moves a document under a new parent, optionally renaming it.
    fn move_document(
        &self,
        id: &str,
        dest_parent_id: &str,
        name: Option<&str>,
    ) -> CoreResult<Arc<State>>;

    /// Copies a document and its subtree under a new parent.
    fn copy(&self, id: &str, dest_parent_id: &str, name: Option<&str>) -> CoreResult<Arc<State>>;

    /// Snapshots a live document as a new version and returns the version.
    fn checkin(&self, id: &str, increment: VersionIncrement) -> CoreResult<Arc<State>>;

    /// Makes a checked-in document editable again.
    fn checkout(&self, id: &str) -> CoreResult<()>;

    /// Versions of a live document, oldest first.
    fn get_versions(&self, id: &str) -> CoreResult<Vec<Arc<State>>>;

    /// Proxies pointing at a document, optionally only those under `parent_id`.
    fn get_proxies(&self, target_id: &str, parent_id: Option<&str>) -> CoreResult<Vec<Arc<State>>>;

    /// Creates a proxy to `target_id` under `parent_id`.
    fn add_proxy(&self, target_id: &str, parent_id: &str, name: &str) -> CoreResult<Arc<State>>;

    /// Stores an access control policy, replacing or merging.
    fn set_acp(&self, id: &str, acp: &Acp, overwrite: bool) -> CoreResult<()>;

    /// Reads the stored access control policy; empty if none.
    fn get_acp(&self, id: &str) -> CoreResult<Acp>;

    /// Flushes pending work (fulltext) of this session.
    fn commit(&self) -> CoreResult<()>;

    /// Same as [`Session::commit`].
    fn save(&self) -> CoreResult<()>;

    /// Blocks until queued fulltext work is done. Returns false on timeout.
    fn wait_for_indexing(&self, timeout: Duration) -> CoreResult<bool>;
}
