//! Repository facade.

use crate::config::RepositoryConfig;
use crate::error::{CoreError, CoreResult};
use crate::fulltext::{FulltextQueue, FulltextStats, WorkSubmitter};
use crate::session::{Session, SessionBackend};
use crate::transaction::{SessionCoordinator, TransactionProvider};
use docrepo_storage::{DocumentStore, InMemoryStore};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// The main repository handle.
///
/// `Repository` ties together a document store, an id generator, the
/// optional fulltext queue and the session coordinator. The root document
/// is created when the repository opens.
///
/// # Sessions
///
/// ```rust
/// use docrepo_core::{LocalTransactionManager, Repository, RepositoryConfig};
/// use std::sync::Arc;
///
/// let tm = Arc::new(LocalTransactionManager::new());
/// let repo = Repository::open_in_memory(RepositoryConfig::default(), tm.clone()).unwrap();
///
/// tm.begin().unwrap();
/// let a = repo.get_session("a").unwrap();
/// let b = repo.get_session("b").unwrap();
/// let root = a.root_id().unwrap();
/// a.add_child(&root, "doc", "File").unwrap();
/// assert!(b.exists_child(&root, "doc").unwrap());
/// tm.commit().unwrap();
///
/// assert!(a.root_id().unwrap_err().is_closed_handle());
/// repo.shutdown();
/// ```
pub struct Repository {
    config: RepositoryConfig,
    store: Arc<dyn DocumentStore>,
    in_memory: Option<Arc<InMemoryStore>>,
    fulltext: Option<Arc<FulltextQueue>>,
    backend: Arc<SessionBackend>,
    coordinator: SessionCoordinator,
    is_open: RwLock<bool>,
}

impl Repository {
    /// Opens a repository over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the fulltext worker cannot start.
    pub fn open_in_memory(
        config: RepositoryConfig,
        provider: Arc<dyn TransactionProvider>,
    ) -> CoreResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        let mut repository =
            Self::open_with_store(config, Arc::clone(&store) as Arc<dyn DocumentStore>, provider)?;
        repository.in_memory = Some(store);
        Ok(repository)
    }

    /// Opens a repository over an empty store.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the root cannot be created, and
    /// `Unavailable` if the fulltext worker cannot start.
    pub fn open_with_store(
        config: RepositoryConfig,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn TransactionProvider>,
    ) -> CoreResult<Self> {
        let fulltext = if config.fulltext_enabled {
            Some(Arc::new(FulltextQueue::start(
                config.name.as_str(),
                Arc::clone(&store),
                config.fulltext_queue_capacity,
            )?))
        } else {
            None
        };

        let backend = Arc::new(SessionBackend::bootstrap(
            config.name.as_str(),
            Arc::clone(&store),
            config.id_strategy.generator(),
            fulltext
                .as_ref()
                .map(|queue| Arc::clone(queue) as Arc<dyn WorkSubmitter>),
            config.query_deep_copy,
        )?);
        let coordinator = SessionCoordinator::new(Arc::clone(&backend), provider);

        tracing::info!(
            repository = %config.name,
            fulltext = config.fulltext_enabled,
            "repository opened"
        );
        Ok(Self {
            config,
            store,
            in_memory: None,
            fulltext,
            backend,
            coordinator,
            is_open: RwLock::new(true),
        })
    }

    /// Returns a session for the caller's scope.
    ///
    /// Outside a transaction this is a fresh session; inside one, a handle
    /// on the session the transaction shares.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` after [`shutdown`](Self::shutdown).
    pub fn get_session(&self, session_id: &str) -> CoreResult<Box<dyn Session>> {
        self.ensure_open()?;
        self.coordinator.get_session(session_id)
    }

    /// Root document id.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.backend.root_id
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns repository configuration.
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The underlying document store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The session coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    /// Number of transactions currently sharing a session.
    #[must_use]
    pub fn active_context_count(&self) -> usize {
        self.coordinator.active_context_count()
    }

    /// Fulltext queue counters, if fulltext is enabled.
    #[must_use]
    pub fn fulltext_stats(&self) -> Option<FulltextStats> {
        self.fulltext.as_ref().map(|queue| queue.stats())
    }

    /// Checks if the repository is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Stops the fulltext worker and, for in-memory repositories, discards
    /// the store content. Idempotent.
    pub fn shutdown(&self) {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return;
        }
        if let Some(queue) = &self.fulltext {
            queue.shutdown();
        }
        if let Some(store) = &self.in_memory {
            store.shutdown();
        }
        *is_open = false;
        tracing::info!(repository = %self.config.name, "repository shut down");
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::unavailable(format!(
                "repository {} is shut down",
                self.config.name
            )))
        }
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.config.name)
            .field("root_id", &self.backend.root_id)
            .field("open", &self.is_open())
            .field("contexts", &self.active_context_count())
            .finish_non_exhaustive()
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::{ADMINISTRATORS, EVERYTHING, LOCAL_ACL, MEMBERS, READ};
    use crate::config::IdStrategy;
    use crate::session::TYPE_ROOT;
    use crate::transaction::LocalTransactionManager;
    use docrepo_state::keys::KEY_FULLTEXT_SIMPLE;
    use docrepo_state::{State, Value};
    use docrepo_storage::IgnoredIds;
    use std::time::Duration;

    fn open(config: RepositoryConfig) -> (Arc<LocalTransactionManager>, Repository) {
        let tm = Arc::new(LocalTransactionManager::new());
        let repo = Repository::open_in_memory(config, tm.clone()).unwrap();
        (tm, repo)
    }

    #[test]
    fn open_creates_root() {
        let (_tm, repo) = open(RepositoryConfig::default().id_strategy(IdStrategy::Sequential));
        assert!(repo.is_open());
        assert_eq!(repo.root_id(), "UUID_0");
        assert_eq!(repo.name(), "default");

        let session = repo.get_session("s").unwrap();
        let root = session.read_state(repo.root_id()).unwrap().unwrap();
        assert_eq!(root.primary_type(), Some(TYPE_ROOT));
        assert_eq!(root.name(), Some(""));
        assert!(root.parent_id().is_none());

        let acp = session.get_acp(repo.root_id()).unwrap();
        let local = acp.acl(LOCAL_ACL).unwrap();
        assert!(local
            .aces
            .iter()
            .any(|ace| ace.principal == ADMINISTRATORS && ace.permission == EVERYTHING));
        assert!(local
            .aces
            .iter()
            .any(|ace| ace.principal == MEMBERS && ace.permission == READ && ace.granted));
    }

    #[test]
    fn exactly_one_parentless_document() {
        let (_tm, repo) = open(RepositoryConfig::default().fulltext_enabled(false));
        let session = repo.get_session("s").unwrap();
        let parentless = session
            .query("parentId IS NULL", "", 0, 0, -1)
            .unwrap();
        assert_eq!(parentless.items.len(), 1);
        assert_eq!(parentless.items[0].id(), Some(repo.root_id()));
        // version storage is not listed among the root's children
        assert!(session.get_children(repo.root_id()).unwrap().is_empty());
    }

    #[test]
    fn transaction_sessions_are_shared_and_revoked() {
        let (tm, repo) = open(RepositoryConfig::default().fulltext_enabled(false));
        tm.begin().unwrap();
        let a = repo.get_session("a").unwrap();
        let b = repo.get_session("b").unwrap();
        assert_eq!(repo.active_context_count(), 1);
        a.add_child(repo.root_id(), "doc", "File").unwrap();
        assert!(b.exists_child(repo.root_id(), "doc").unwrap());
        tm.commit().unwrap();

        assert_eq!(repo.active_context_count(), 0);
        assert!(a.root_id().unwrap_err().is_closed_handle());
        assert!(b.root_id().unwrap_err().is_closed_handle());
        // writes are not undone by completion
        let fresh = repo.get_session("c").unwrap();
        assert!(fresh.exists_child(repo.root_id(), "doc").unwrap());
    }

    #[test]
    fn fulltext_runs_after_transaction_commit() {
        let (tm, repo) = open(RepositoryConfig::default());
        let doc_id = tm
            .in_transaction(|_| {
                let session = repo.get_session("writer")?;
                let doc = session.add_child(repo.root_id(), "doc", "File")?;
                let mut doc = State::clone(&doc);
                doc.set("title", "annual budget");
                session.update_state(doc.clone())?;
                Ok(doc.id().map(str::to_owned))
            })
            .unwrap()
            .unwrap();

        let session = repo.get_session("reader").unwrap();
        assert!(session.wait_for_indexing(Duration::from_secs(5)).unwrap());
        let doc = session.read_state(&doc_id).unwrap().unwrap();
        assert_eq!(doc.get(KEY_FULLTEXT_SIMPLE), Some(&Value::from("annual budget")));
        assert_eq!(repo.fulltext_stats().unwrap().processed, 1);
    }

    #[test]
    fn disabled_fulltext_has_no_queue() {
        let (_tm, repo) = open(RepositoryConfig::default().fulltext_enabled(false));
        assert!(repo.fulltext_stats().is_none());
        let session = repo.get_session("s").unwrap();
        assert!(session.wait_for_indexing(Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn shutdown_refuses_new_sessions() {
        let (_tm, repo) = open(RepositoryConfig::default());
        let session = repo.get_session("s").unwrap();
        repo.shutdown();
        repo.shutdown();
        assert!(!repo.is_open());
        assert!(matches!(
            repo.get_session("t"),
            Err(CoreError::Unavailable { .. })
        ));
        assert!(session
            .read_child_state(repo.root_id(), "x", &IgnoredIds::new())
            .is_err());
    }
}
