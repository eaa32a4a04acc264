//! Document store trait definition.

use crate::error::{StorageError, StorageResult};
use crate::query::{PartialList, Query};
use docrepo_state::keys::KEY_ID;
use docrepo_state::{State, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Ids excluded from a scan.
///
/// Models visibility exceptions such as documents deleted, or being
/// created, by a transaction that has not committed yet.
pub type IgnoredIds = HashSet<String>;

/// Outcome of [`DocumentStore::query_key_value_array`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayMatches {
    /// Ids of every matching document, each listed once.
    pub ids: BTreeSet<String>,
    /// Matching proxy id to its target id. Filled only when requested.
    pub proxy_targets: BTreeMap<String, String>,
    /// Matching document id to the ids of its proxies. Filled only when
    /// requested, for documents that have proxies.
    pub target_proxies: BTreeMap<String, Vec<String>>,
}

/// A keyed collection of document states.
///
/// The store holds complete states keyed by their `id` field. It keeps no
/// history and performs no partial updates: writers hand over the full new
/// state. Structural invariants (sibling name uniqueness, proxy back
/// references) are the writer's responsibility.
///
/// # Invariants
///
/// - `create_state` never overwrites; `update_state` and `delete_state`
///   never create
/// - reads never mutate
/// - scans skip every id in the `ignored` set
/// - once a store is unavailable every call fails with `Unavailable`
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - reference semantics for every other backend
pub trait DocumentStore: Send + Sync {
    /// Reads the state stored under `id`.
    fn read_state(&self, id: &str) -> StorageResult<Option<Arc<State>>>;

    /// Reads several states, one slot per requested id, in request order.
    fn read_states(&self, ids: &[String]) -> StorageResult<Vec<Option<Arc<State>>>> {
        ids.iter().map(|id| self.read_state(id)).collect()
    }

    /// Stores a new state.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if a state with the same id is stored, and
    /// `MissingId` if the state has no id. The store is left unchanged.
    fn create_state(&self, state: State) -> StorageResult<()>;

    /// Replaces a stored state entirely.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no state with the same id is stored.
    fn update_state(&self, state: State) -> StorageResult<()>;

    /// Edits the current state of `id` in place and stores the result.
    ///
    /// `edit` sees a copy of the stored state and returns false to leave it
    /// untouched. The id survives whatever `edit` does. Returns whether the
    /// state was replaced.
    ///
    /// The provided implementation reads, then updates: a write landing in
    /// between is overwritten. Stores shared by concurrent writers must
    /// override it to run `edit` under their write lock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no state with this id is stored.
    fn update_state_with(
        &self,
        id: &str,
        edit: &mut dyn FnMut(&mut State) -> bool,
    ) -> StorageResult<bool> {
        let current = self
            .read_state(id)?
            .ok_or_else(|| StorageError::not_found(id))?;
        let mut state = State::clone(&current);
        if !edit(&mut state) {
            return Ok(false);
        }
        state.set(KEY_ID, id);
        self.update_state(state)?;
        Ok(true)
    }

    /// Removes a stored state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no state with this id is stored.
    fn delete_state(&self, id: &str) -> StorageResult<()>;

    /// Finds the first non-ignored child of `parent_id` named `name`.
    ///
    /// Indexed implementations must return the same document a linear scan
    /// would whenever at most one candidate exists.
    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &IgnoredIds,
    ) -> StorageResult<Option<Arc<State>>>;

    /// Returns true if `read_child_state` would find a document.
    fn has_child(&self, parent_id: &str, name: &str, ignored: &IgnoredIds) -> StorageResult<bool> {
        Ok(self.read_child_state(parent_id, name, ignored)?.is_some())
    }

    /// Returns every non-ignored state whose field `key` equals `value`.
    ///
    /// Equality is exact: no coercion between value variants.
    fn query_key_value(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> StorageResult<Vec<Arc<State>>>;

    /// Returns true if `query_key_value` would return at least one state.
    fn query_key_value_presence(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> StorageResult<bool> {
        Ok(!self.query_key_value(key, value, ignored)?.is_empty())
    }

    /// Scans for states whose array field `key` contains `value`.
    ///
    /// For matching proxies the target id is recorded when
    /// `want_proxy_targets` is set; for any match carrying `proxyIds` the
    /// proxy ids are recorded when `want_target_proxies` is set. A single
    /// match may populate both maps.
    fn query_key_value_array(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
        want_proxy_targets: bool,
        want_target_proxies: bool,
    ) -> StorageResult<ArrayMatches>;

    /// Evaluates a query: filter, order, count, paginate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidExpression` if the predicate cannot be evaluated.
    fn query_and_fetch(
        &self,
        query: &Query,
        ignored: &IgnoredIds,
    ) -> StorageResult<PartialList<Arc<State>>>;
}
