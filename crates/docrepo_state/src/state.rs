//! Document state record.

use crate::keys::{
    KEY_ANCESTOR_IDS, KEY_ID, KEY_IS_CHECKED_IN, KEY_IS_PROXY, KEY_IS_VERSION, KEY_NAME,
    KEY_PARENT_ID, KEY_PRIMARY_TYPE, KEY_PROXY_IDS, KEY_PROXY_TARGET_ID,
};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// A schema-less document record.
///
/// Fields are kept in key order, which makes equality, debugging output and
/// serialized form deterministic. Structural accessors read the reserved
/// fields listed in [`crate::keys`]; they return `None` (or `false`) when a
/// field is absent or has an unexpected variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, Value>);

impl State {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state holding only an id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.set(KEY_ID, Value::String(id.into()));
        state
    }

    /// Sets a field, consuming and returning the state.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns true if the field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over fields in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the state has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the document id.
    pub fn id(&self) -> Option<&str> {
        self.get(KEY_ID).and_then(Value::as_str)
    }

    /// Returns the parent id; `None` on the root.
    pub fn parent_id(&self) -> Option<&str> {
        self.get(KEY_PARENT_ID).and_then(Value::as_reference)
    }

    /// Returns the document name.
    pub fn name(&self) -> Option<&str> {
        self.get(KEY_NAME).and_then(Value::as_str)
    }

    /// Returns the document type.
    pub fn primary_type(&self) -> Option<&str> {
        self.get(KEY_PRIMARY_TYPE).and_then(Value::as_str)
    }

    /// Returns true if the document is a proxy.
    pub fn is_proxy(&self) -> bool {
        self.flag(KEY_IS_PROXY)
    }

    /// Returns the proxy target id.
    pub fn proxy_target_id(&self) -> Option<&str> {
        self.get(KEY_PROXY_TARGET_ID).and_then(Value::as_reference)
    }

    /// Returns the ids of the proxies pointing at this document.
    pub fn proxy_ids(&self) -> Vec<&str> {
        self.reference_array(KEY_PROXY_IDS)
    }

    /// Returns the ancestor ids, root first.
    pub fn ancestor_ids(&self) -> Vec<&str> {
        self.reference_array(KEY_ANCESTOR_IDS)
    }

    /// Returns true if the document is a version.
    pub fn is_version(&self) -> bool {
        self.flag(KEY_IS_VERSION)
    }

    /// Returns true if a live document is checked in.
    pub fn is_checked_in(&self) -> bool {
        self.flag(KEY_IS_CHECKED_IN)
    }

    /// Returns true if the field is an array containing `value`.
    pub fn array_contains(&self, key: &str, value: &Value) -> bool {
        self.get(key)
            .and_then(Value::as_array)
            .is_some_and(|array| array.contains(value))
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn reference_array(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .and_then(Value::as_array)
            .map(|array| array.iter().filter_map(Value::as_reference).collect())
            .unwrap_or_default()
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for State {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<State> for Value {
    fn from(state: State) -> Self {
        Value::Object(state.0)
    }
}
