//! Per-transaction session ownership.

use crate::error::CoreResult;
use crate::session::{DocumentSession, Session, SessionHandle};
use crate::transaction::provider::Synchronization;
use crate::types::{CompletionStatus, TransactionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Live transaction contexts, keyed by transaction.
pub(crate) type Registry = Mutex<HashMap<TransactionId, Arc<TransactionContext>>>;

struct Handles {
    completed: bool,
    open: HashMap<u64, Arc<AtomicBool>>,
}

/// The shared document session of one transaction and its open handles.
///
/// Registered with the transaction provider as a [`Synchronization`]:
/// before completion it commits the shared session, after completion it
/// closes the session and every handle still open, and drops out of the
/// coordinator's registry.
pub struct TransactionContext {
    txid: TransactionId,
    base: DocumentSession,
    handles: Mutex<Handles>,
    next_key: AtomicU64,
    registry: Weak<Registry>,
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txid", &self.txid)
            .field("session", &self.base.session_id())
            .field("handles", &self.handle_count())
            .finish()
    }
}

impl TransactionContext {
    pub(crate) fn new(txid: TransactionId, base: DocumentSession, registry: Weak<Registry>) -> Self {
        Self {
            txid,
            base,
            handles: Mutex::new(Handles {
                completed: false,
                open: HashMap::new(),
            }),
            next_key: AtomicU64::new(0),
            registry,
        }
    }

    /// The transaction this context belongs to.
    pub fn transaction_id(&self) -> TransactionId {
        self.txid
    }

    /// Number of handles not yet closed.
    pub fn handle_count(&self) -> usize {
        self.handles.lock().open.len()
    }

    /// Whether the transaction has completed.
    pub fn is_completed(&self) -> bool {
        self.handles.lock().completed
    }

    pub(crate) fn base_session(&self) -> &dyn Session {
        &self.base
    }

    /// Opens a handle on the shared session. A handle opened after
    /// completion starts out closed.
    pub(crate) fn new_handle(self: &Arc<Self>, session_id: impl Into<String>) -> SessionHandle {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let mut handles = self.handles.lock();
        let closed = Arc::new(AtomicBool::new(handles.completed));
        if !handles.completed {
            handles.open.insert(key, Arc::clone(&closed));
        }
        drop(handles);
        SessionHandle::new(Arc::clone(self), session_id.into(), key, closed)
    }

    pub(crate) fn remove_handle(&self, key: u64) {
        self.handles.lock().open.remove(&key);
    }
}

impl Synchronization for TransactionContext {
    fn before_completion(&self) -> CoreResult<()> {
        self.base.commit().map_err(|err| {
            tracing::warn!(txid = %self.txid, error = %err, "shared session commit failed");
            err
        })
    }

    fn after_completion(&self, status: CompletionStatus) {
        self.base.close();
        let revoked: Vec<Arc<AtomicBool>> = {
            let mut handles = self.handles.lock();
            handles.completed = true;
            handles.open.drain().map(|(_, closed)| closed).collect()
        };
        for closed in &revoked {
            closed.store(true, Ordering::SeqCst);
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.txid);
        }
        tracing::debug!(
            txid = %self.txid,
            %status,
            revoked = revoked.len(),
            "transaction session released"
        );
    }
}
