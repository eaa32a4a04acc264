//! Test fixtures and repository helpers.
//!
//! Provides convenience functions for setting up test repositories
//! and common test scenarios.

use docrepo_core::{
    CoreResult, IdStrategy, LocalTransactionManager, Repository, RepositoryConfig, Session,
};
use docrepo_state::{State, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An in-memory repository with its own transaction manager.
pub struct TestRepository {
    /// The repository instance.
    pub repo: Repository,
    /// The transaction manager the repository consults.
    pub tm: Arc<LocalTransactionManager>,
}

impl TestRepository {
    /// Creates a repository with sequential ids and fulltext disabled.
    pub fn new() -> Self {
        Self::with_config(
            RepositoryConfig::default()
                .name("test")
                .id_strategy(IdStrategy::Sequential)
                .fulltext_enabled(false),
        )
    }

    /// Creates a repository with sequential ids and fulltext enabled.
    pub fn with_fulltext() -> Self {
        Self::with_config(
            RepositoryConfig::default()
                .name("test")
                .id_strategy(IdStrategy::Sequential),
        )
    }

    /// Creates a repository from an explicit configuration.
    pub fn with_config(config: RepositoryConfig) -> Self {
        let tm = Arc::new(LocalTransactionManager::new());
        let repo = Repository::open_in_memory(config, tm.clone())
            .expect("Failed to open in-memory repository");
        Self { repo, tm }
    }

    /// Opens a session outside of any transaction.
    pub fn session(&self, session_id: &str) -> Box<dyn Session> {
        self.repo
            .get_session(session_id)
            .expect("Failed to open session")
    }

    /// Runs `f` with a transaction-scoped session, committing on success.
    pub fn with_transaction<F, R>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&dyn Session) -> CoreResult<R>,
    {
        self.tm.in_transaction(|_| {
            let session = self.repo.get_session("txn")?;
            f(session.as_ref())
        })
    }

    /// Creates a chain of folders under the root and returns their ids.
    pub fn folder_path(&self, names: &[&str]) -> Vec<String> {
        let session = self.session("fixture");
        let mut parent = self.repo.root_id().to_string();
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let folder = session
                .add_child(&parent, name, "Folder")
                .expect("Failed to create folder");
            parent = folder.id().expect("Folder without id").to_string();
            ids.push(parent.clone());
        }
        ids
    }
}

impl Default for TestRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestRepository {
    type Target = Repository;

    fn deref(&self) -> &Self::Target {
        &self.repo
    }
}

/// Parses a JSON array of states in their serialized (tagged) form.
///
/// # Example
///
/// ```rust
/// let states = docrepo_testkit::states_from_json(
///     r#"[{"id": {"type": "string", "value": "a"}, "size": {"type": "long", "value": 3}}]"#,
/// )
/// .unwrap();
/// assert_eq!(states[0].id(), Some("a"));
/// ```
pub fn states_from_json(json: &str) -> Result<Vec<State>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Builds a state from plain JSON: strings, integers, floats, booleans,
/// arrays and objects map to the matching [`Value`]; nulls are skipped.
///
/// Returns `None` unless `json` is an object.
pub fn state_from_plain(json: &serde_json::Value) -> Option<State> {
    let object = json.as_object()?;
    let mut state = State::new();
    for (key, value) in object {
        if let Some(value) = plain_value(value) {
            state.set(key.as_str(), value);
        }
    }
    Some(state)
}

fn plain_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Long)
            .or_else(|| n.as_f64().map(Value::Double)),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            Some(Value::Array(items.iter().filter_map(plain_value).collect()))
        }
        serde_json::Value::Object(fields) => Some(Value::Object(
            fields
                .iter()
                .filter_map(|(k, v)| plain_value(v).map(|v| (k.clone(), v)))
                .collect::<BTreeMap<_, _>>(),
        )),
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a repository whose root holds `count` documents named
    /// `doc-0`, `doc-1`, ... with a `size` field equal to their index.
    pub fn populated_repository(count: usize) -> TestRepository {
        let test = TestRepository::new();
        let session = test.session("populate");
        for i in 0..count {
            let doc = session
                .add_child(test.root_id(), &format!("doc-{i}"), "File")
                .expect("Failed to add child");
            let mut doc = State::clone(&doc);
            doc.set("size", i as i64);
            session.update_state(doc).expect("Failed to update child");
        }
        test
    }
}
