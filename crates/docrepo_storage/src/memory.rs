//! In-memory document store.

use crate::backend::{ArrayMatches, DocumentStore, IgnoredIds};
use crate::error::{StorageError, StorageResult};
use crate::query::{self, PartialList, Query};
use docrepo_state::keys::{KEY_ID, KEY_NAME};
use docrepo_state::{State, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

type StateMap = BTreeMap<String, Arc<State>>;

/// An in-memory document store.
///
/// Internally the store is a map from id to shared state. Every lookup is a
/// linear scan; this store defines the reference semantics that indexed
/// backends must reproduce, not a fast path. Scans visit ids in ascending
/// order, so "first match" is deterministic.
///
/// Writes apply immediately and are visible to every reader of the store.
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use docrepo_state::State;
/// use docrepo_storage::{DocumentStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.create_state(State::with_id("a").with("title", "A")).unwrap();
/// let read = store.read_state("a").unwrap().unwrap();
/// assert_eq!(read.id(), Some("a"));
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    states: RwLock<Option<StateMap>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            states: RwLock::new(Some(StateMap::new())),
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored states.
    pub fn len(&self) -> StorageResult<usize> {
        self.read(|states| Ok(states.len()))
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Discards all content. Every later call fails with `Unavailable`.
    pub fn shutdown(&self) {
        let discarded = self.states.write().take();
        if let Some(states) = discarded {
            tracing::debug!(documents = states.len(), "in-memory store shut down");
        }
    }

    fn read<T>(&self, f: impl FnOnce(&StateMap) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.states.read();
        match guard.as_ref() {
            Some(states) => f(states),
            None => Err(StorageError::unavailable("store has been shut down")),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut StateMap) -> StorageResult<T>) -> StorageResult<T> {
        let mut guard = self.states.write();
        match guard.as_mut() {
            Some(states) => f(states),
            None => Err(StorageError::unavailable("store has been shut down")),
        }
    }
}

fn visible<'a>(
    states: &'a StateMap,
    ignored: &'a IgnoredIds,
) -> impl Iterator<Item = &'a Arc<State>> + 'a {
    states
        .iter()
        .filter(move |(id, _)| !ignored.contains(id.as_str()))
        .map(|(_, state)| state)
}

fn owned_id(state: &State) -> StorageResult<String> {
    state.id().map(str::to_string).ok_or(StorageError::MissingId)
}

impl DocumentStore for InMemoryStore {
    fn read_state(&self, id: &str) -> StorageResult<Option<Arc<State>>> {
        self.read(|states| Ok(states.get(id).cloned()))
    }

    fn read_states(&self, ids: &[String]) -> StorageResult<Vec<Option<Arc<State>>>> {
        self.read(|states| Ok(ids.iter().map(|id| states.get(id).cloned()).collect()))
    }

    fn create_state(&self, state: State) -> StorageResult<()> {
        let id = owned_id(&state)?;
        self.write(|states| {
            if states.contains_key(&id) {
                return Err(StorageError::already_exists(id));
            }
            tracing::trace!(%id, "create");
            states.insert(id, Arc::new(state));
            Ok(())
        })
    }

    fn update_state(&self, state: State) -> StorageResult<()> {
        let id = owned_id(&state)?;
        self.write(|states| match states.get_mut(&id) {
            Some(slot) => {
                tracing::trace!(%id, "update");
                *slot = Arc::new(state);
                Ok(())
            }
            None => Err(StorageError::not_found(id)),
        })
    }

    fn update_state_with(
        &self,
        id: &str,
        edit: &mut dyn FnMut(&mut State) -> bool,
    ) -> StorageResult<bool> {
        self.write(|states| {
            let slot = states
                .get_mut(id)
                .ok_or_else(|| StorageError::not_found(id))?;
            let mut state = State::clone(slot.as_ref());
            if !edit(&mut state) {
                return Ok(false);
            }
            state.set(KEY_ID, id);
            tracing::trace!(%id, "update in place");
            *slot = Arc::new(state);
            Ok(true)
        })
    }

    fn delete_state(&self, id: &str) -> StorageResult<()> {
        self.write(|states| match states.remove(id) {
            Some(_) => {
                tracing::trace!(%id, "delete");
                Ok(())
            }
            None => Err(StorageError::not_found(id)),
        })
    }

    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &IgnoredIds,
    ) -> StorageResult<Option<Arc<State>>> {
        self.read(|states| {
            Ok(visible(states, ignored)
                .find(|state| {
                    state.parent_id() == Some(parent_id)
                        && state.get(KEY_NAME).and_then(Value::as_str) == Some(name)
                })
                .cloned())
        })
    }

    fn query_key_value(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> StorageResult<Vec<Arc<State>>> {
        self.read(|states| {
            Ok(visible(states, ignored)
                .filter(|state| state.get(key) == Some(value))
                .cloned()
                .collect())
        })
    }

    fn query_key_value_presence(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
    ) -> StorageResult<bool> {
        self.read(|states| Ok(visible(states, ignored).any(|state| state.get(key) == Some(value))))
    }

    fn query_key_value_array(
        &self,
        key: &str,
        value: &Value,
        ignored: &IgnoredIds,
        want_proxy_targets: bool,
        want_target_proxies: bool,
    ) -> StorageResult<ArrayMatches> {
        self.read(|states| {
            let mut matches = ArrayMatches::default();
            for state in visible(states, ignored) {
                if !state.array_contains(key, value) {
                    continue;
                }
                let Some(id) = state.id() else { continue };
                matches.ids.insert(id.to_string());
                if want_proxy_targets && state.is_proxy() {
                    if let Some(target) = state.proxy_target_id() {
                        matches
                            .proxy_targets
                            .insert(id.to_string(), target.to_string());
                    }
                }
                if want_target_proxies {
                    let proxies = state.proxy_ids();
                    if !proxies.is_empty() {
                        matches.target_proxies.insert(
                            id.to_string(),
                            proxies.into_iter().map(str::to_string).collect(),
                        );
                    }
                }
            }
            Ok(matches)
        })
    }

    fn query_and_fetch(
        &self,
        query: &Query,
        ignored: &IgnoredIds,
    ) -> StorageResult<PartialList<Arc<State>>> {
        self.read(|states| query::execute(visible(states, ignored), query))
    }
}
