//! Hands out sessions, sharing one per transaction.

use crate::error::CoreResult;
use crate::session::{DocumentSession, Session, SessionBackend};
use crate::transaction::context::{Registry, TransactionContext};
use crate::transaction::provider::{Synchronization, TransactionProvider};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

/// Decides, per call, which session a caller gets.
///
/// Outside a transaction every call opens a fresh [`DocumentSession`].
/// Inside one, the first call creates the transaction's context and
/// registers it with the provider; that call and every later one in the
/// same transaction get a new handle over the context's shared session.
pub struct SessionCoordinator {
    backend: Arc<SessionBackend>,
    provider: Arc<dyn TransactionProvider>,
    registry: Arc<Registry>,
}

impl fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("backend", &self.backend)
            .field("contexts", &self.active_context_count())
            .finish()
    }
}

impl SessionCoordinator {
    pub(crate) fn new(backend: Arc<SessionBackend>, provider: Arc<dyn TransactionProvider>) -> Self {
        Self {
            backend,
            provider,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a session for the caller's current scope.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if the transaction completed before
    /// its context could be registered.
    pub fn get_session(&self, session_id: &str) -> CoreResult<Box<dyn Session>> {
        let Some(txid) = self.provider.current() else {
            return Ok(Box::new(DocumentSession::new(
                Arc::clone(&self.backend),
                session_id,
            )));
        };

        let mut registry = self.registry.lock();
        let context = match registry.entry(txid) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let base = DocumentSession::new(Arc::clone(&self.backend), session_id);
                let context = Arc::new(TransactionContext::new(
                    txid,
                    base,
                    Arc::downgrade(&self.registry),
                ));
                let synchronization: Arc<dyn Synchronization> = context.clone();
                if let Err(err) = self.provider.register_synchronization(txid, synchronization) {
                    context.base_session().close();
                    return Err(err);
                }
                tracing::debug!(%txid, session_id, "transaction session created");
                Arc::clone(entry.insert(context))
            }
        };
        let handle = context.new_handle(session_id);
        drop(registry);
        Ok(Box::new(handle))
    }

    /// Number of transactions with a live shared session.
    pub fn active_context_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// The context of a live transaction, if it has one.
    pub fn context(&self, txid: TransactionId) -> Option<Arc<TransactionContext>> {
        self.registry.lock().get(&txid).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::fulltext::{FulltextJob, WorkSubmitter};
    use crate::id::SequentialIdGenerator;
    use crate::interrupt;
    use crate::transaction::LocalTransactionManager;
    use docrepo_state::State;
    use docrepo_storage::{DocumentStore, IgnoredIds, InMemoryStore};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct StubSubmitter {
        fail_submit: bool,
        interrupt_wait: bool,
        submitted: Mutex<Vec<FulltextJob>>,
    }

    impl WorkSubmitter for StubSubmitter {
        fn submit(&self, job: FulltextJob) -> CoreResult<()> {
            if self.fail_submit {
                return Err(CoreError::unavailable("indexer offline"));
            }
            self.submitted.lock().push(job);
            Ok(())
        }

        fn wait_idle(&self, _timeout: Duration) -> CoreResult<bool> {
            if self.interrupt_wait {
                Err(CoreError::Interrupted)
            } else {
                Ok(true)
            }
        }
    }

    struct Fixture {
        tm: Arc<LocalTransactionManager>,
        coordinator: SessionCoordinator,
        root: String,
    }

    fn fixture_with(submitter: Option<Arc<StubSubmitter>>) -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let backend = SessionBackend::bootstrap(
            "test",
            store,
            Arc::new(SequentialIdGenerator::new()),
            submitter.map(|s| s as Arc<dyn WorkSubmitter>),
            true,
        )
        .unwrap();
        let root = backend.root_id.clone();
        let tm = Arc::new(LocalTransactionManager::new());
        let coordinator = SessionCoordinator::new(
            Arc::new(backend),
            Arc::clone(&tm) as Arc<dyn TransactionProvider>,
        );
        Fixture {
            tm,
            coordinator,
            root,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(None)
    }

    #[test]
    fn no_transaction_gives_independent_sessions() {
        let f = fixture();
        let a = f.coordinator.get_session("a").unwrap();
        let b = f.coordinator.get_session("b").unwrap();
        a.close();
        assert!(!a.is_live());
        assert!(b.is_live());
        assert_eq!(f.coordinator.active_context_count(), 0);
    }

    #[test]
    fn handles_share_one_session() {
        let f = fixture();
        let txid = f.tm.begin().unwrap();
        let a = f.coordinator.get_session("a").unwrap();
        let b = f.coordinator.get_session("b").unwrap();
        assert_eq!(a.session_id(), "a");
        assert_eq!(b.session_id(), "b");
        assert_eq!(f.coordinator.active_context_count(), 1);
        assert_eq!(f.coordinator.context(txid).unwrap().handle_count(), 2);

        let created = a.add_child(&f.root, "doc", "File").unwrap();
        let seen = b
            .read_child_state(&f.root, "doc", &IgnoredIds::new())
            .unwrap()
            .unwrap();
        assert_eq!(seen.id(), created.id());
        f.tm.commit().unwrap();
    }

    #[test]
    fn completion_closes_handles_and_context() {
        let f = fixture();
        let txid = f.tm.begin().unwrap();
        let a = f.coordinator.get_session("a").unwrap();
        let context = f.coordinator.context(txid).unwrap();
        f.tm.commit().unwrap();

        assert!(context.is_completed());
        assert_eq!(context.handle_count(), 0);
        assert!(!a.is_live());
        assert_eq!(
            a.root_id(),
            Err(CoreError::ClosedHandle {
                session_id: "a".into()
            })
        );
        assert_eq!(f.coordinator.active_context_count(), 0);
        assert!(f.coordinator.context(txid).is_none());
    }

    #[test]
    fn closing_one_handle_leaves_the_others() {
        let f = fixture();
        let txid = f.tm.begin().unwrap();
        let a = f.coordinator.get_session("a").unwrap();
        let b = f.coordinator.get_session("b").unwrap();
        a.close();
        a.close();
        assert!(matches!(a.root_id(), Err(CoreError::ClosedHandle { .. })));
        assert_eq!(b.root_id().unwrap(), f.root);
        assert_eq!(f.coordinator.context(txid).unwrap().handle_count(), 1);
        drop(b);
        assert_eq!(f.coordinator.context(txid).unwrap().handle_count(), 0);
        f.tm.rollback().unwrap();
        assert_eq!(f.coordinator.active_context_count(), 0);
    }

    #[test]
    fn closed_base_reads_as_closed_handle() {
        let f = fixture();
        let txid = f.tm.begin().unwrap();
        let a = f.coordinator.get_session("a").unwrap();
        let context = f.coordinator.context(txid).unwrap();
        // the base closes while the handle still looks open
        context.base_session().close();

        assert_eq!(
            a.read_state(&f.root),
            Err(CoreError::ClosedHandle {
                session_id: "a".into()
            })
        );
        f.tm.rollback().unwrap();
    }

    #[test]
    fn next_transaction_gets_a_fresh_context() {
        let f = fixture();
        let first = f.tm.begin().unwrap();
        let a = f.coordinator.get_session("a").unwrap();
        f.tm.commit().unwrap();

        let second = f.tm.begin().unwrap();
        assert_ne!(first, second);
        let b = f.coordinator.get_session("b").unwrap();
        assert!(b.is_live());
        assert!(!a.is_live());
        f.tm.commit().unwrap();
    }

    #[test]
    fn commit_flushes_fulltext_work() {
        let submitter = Arc::new(StubSubmitter::default());
        let f = fixture_with(Some(Arc::clone(&submitter)));
        f.tm.begin().unwrap();
        let session = f.coordinator.get_session("a").unwrap();
        let doc = session.add_child(&f.root, "doc", "File").unwrap();
        let mut doc = State::clone(&doc);
        doc.set("title", "minutes");
        session.update_state(doc).unwrap();
        assert!(submitter.submitted.lock().is_empty());

        f.tm.commit().unwrap();
        let submitted = submitter.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].indexes[0].text, "minutes");
    }

    #[test]
    fn failed_flush_rolls_back() {
        let submitter = Arc::new(StubSubmitter {
            fail_submit: true,
            ..StubSubmitter::default()
        });
        let f = fixture_with(Some(submitter));
        f.tm.begin().unwrap();
        let session = f.coordinator.get_session("a").unwrap();
        session.add_child(&f.root, "doc", "File").unwrap();

        assert!(matches!(
            f.tm.commit(),
            Err(CoreError::TransactionAborted { .. })
        ));
        assert!(!session.is_live());
        assert_eq!(f.coordinator.active_context_count(), 0);
    }

    #[test]
    fn interruption_is_reasserted() {
        let submitter = Arc::new(StubSubmitter {
            interrupt_wait: true,
            ..StubSubmitter::default()
        });
        let f = fixture_with(Some(submitter));
        f.tm.begin().unwrap();
        let session = f.coordinator.get_session("a").unwrap();
        interrupt::take_interrupted();

        assert_eq!(
            session.wait_for_indexing(Duration::from_millis(10)),
            Err(CoreError::Interrupted)
        );
        assert!(interrupt::take_interrupted());
        f.tm.rollback().unwrap();
    }

    #[test]
    fn handles_are_usable_from_other_threads() {
        let f = fixture();
        f.tm.begin().unwrap();
        let session: Arc<dyn Session> = Arc::from(f.coordinator.get_session("a").unwrap());
        let root = f.root.clone();
        let worker = Arc::clone(&session);
        std::thread::spawn(move || {
            worker.add_child(&root, "from-thread", "File").unwrap();
        })
        .join()
        .unwrap();
        assert!(session.exists_child(&f.root, "from-thread").unwrap());
        f.tm.commit().unwrap();
    }
}
