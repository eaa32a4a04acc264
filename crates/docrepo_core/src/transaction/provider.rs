//! Transaction lifecycle providers.

use crate::error::{CoreError, CoreResult};
use crate::types::{CompletionStatus, TransactionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Callbacks fired around a transaction's completion.
pub trait Synchronization: Send + Sync {
    /// Runs before a commit decision. An error aborts the transaction.
    fn before_completion(&self) -> CoreResult<()>;

    /// Runs exactly once after the transaction committed or rolled back.
    fn after_completion(&self, status: CompletionStatus);
}

/// Source of the ambient transaction.
pub trait TransactionProvider: Send + Sync {
    /// Returns the transaction active in the caller's scope, if any.
    fn current(&self) -> Option<TransactionId>;

    /// Registers callbacks for a transaction's completion.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if the transaction is not active.
    fn register_synchronization(
        &self,
        txid: TransactionId,
        synchronization: Arc<dyn Synchronization>,
    ) -> CoreResult<()>;
}

struct TransactionState {
    rollback_only: bool,
    synchronizations: Vec<Arc<dyn Synchronization>>,
}

#[derive(Default)]
struct Inner {
    bindings: HashMap<ThreadId, TransactionId>,
    transactions: HashMap<TransactionId, TransactionState>,
}

/// Thread-bound transaction manager.
///
/// A transaction begun on a thread is that thread's ambient transaction
/// until it commits or rolls back. [`suspend`](Self::suspend) and
/// [`resume`](Self::resume) move a transaction between threads, so several
/// threads can work inside one transaction.
///
/// ## Completion
///
/// `commit` runs every `before_completion` callback in registration order;
/// the first failure turns the outcome into a rollback. Either way each
/// `after_completion` callback then runs once, and the transaction is
/// unbound from every thread.
pub struct LocalTransactionManager {
    next_txid: AtomicU64,
    inner: Mutex<Inner>,
}

impl fmt::Debug for LocalTransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransactionManager")
            .field("active", &self.active_count())
            .finish()
    }
}

impl Default for LocalTransactionManager {
    fn default() -> Self {
        Self {
            next_txid: AtomicU64::new(1),
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl LocalTransactionManager {
    /// Creates a manager with no transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction bound to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the thread already has one.
    pub fn begin(&self) -> CoreResult<TransactionId> {
        let thread = thread::current().id();
        let mut inner = self.inner.lock();
        if inner.bindings.contains_key(&thread) {
            return Err(CoreError::invalid_operation(
                "transaction already active on this thread",
            ));
        }
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        inner.bindings.insert(thread, txid);
        inner.transactions.insert(
            txid,
            TransactionState {
                rollback_only: false,
                synchronizations: Vec::new(),
            },
        );
        tracing::trace!(%txid, "transaction begun");
        Ok(txid)
    }

    /// Returns true if the calling thread has a transaction.
    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// Returns the number of transactions not yet completed.
    pub fn active_count(&self) -> usize {
        self.inner.lock().transactions.len()
    }

    /// Marks the calling thread's transaction so that it can only roll back.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if the thread has none.
    pub fn set_rollback_only(&self) -> CoreResult<()> {
        let thread = thread::current().id();
        let mut inner = self.inner.lock();
        let txid = *inner
            .bindings
            .get(&thread)
            .ok_or(CoreError::NoActiveTransaction)?;
        let state = inner
            .transactions
            .get_mut(&txid)
            .ok_or(CoreError::NoActiveTransaction)?;
        state.rollback_only = true;
        Ok(())
    }

    /// Unbinds the calling thread's transaction without completing it.
    pub fn suspend(&self) -> Option<TransactionId> {
        self.inner.lock().bindings.remove(&thread::current().id())
    }

    /// Binds an active transaction to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if `txid` has completed, and
    /// `InvalidOperation` if the thread already has a transaction.
    pub fn resume(&self, txid: TransactionId) -> CoreResult<()> {
        let thread = thread::current().id();
        let mut inner = self.inner.lock();
        if !inner.transactions.contains_key(&txid) {
            return Err(CoreError::NoActiveTransaction);
        }
        if inner.bindings.contains_key(&thread) {
            return Err(CoreError::invalid_operation(
                "transaction already active on this thread",
            ));
        }
        inner.bindings.insert(thread, txid);
        Ok(())
    }

    /// Commits the calling thread's transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionAborted` if a before-completion callback failed or
    /// the transaction was marked rollback-only; it was rolled back.
    pub fn commit(&self) -> CoreResult<()> {
        self.complete(true)
    }

    /// Rolls back the calling thread's transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveTransaction` if the thread has none.
    pub fn rollback(&self) -> CoreResult<()> {
        self.complete(false)
    }

    /// Runs `f` inside a new transaction, committing on success and rolling
    /// back on error.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or of the commit.
    pub fn in_transaction<T>(&self, f: impl FnOnce(TransactionId) -> CoreResult<T>) -> CoreResult<T> {
        let txid = self.begin()?;
        match f(txid) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback() {
                    tracing::warn!(%txid, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn complete(&self, commit: bool) -> CoreResult<()> {
        let (txid, state) = {
            let mut inner = self.inner.lock();
            let txid = inner
                .bindings
                .remove(&thread::current().id())
                .ok_or(CoreError::NoActiveTransaction)?;
            inner.bindings.retain(|_, bound| *bound != txid);
            let state = inner
                .transactions
                .remove(&txid)
                .ok_or(CoreError::NoActiveTransaction)?;
            (txid, state)
        };

        let mut failure = None;
        if commit {
            if state.rollback_only {
                failure = Some("transaction marked rollback-only".to_string());
            } else {
                for synchronization in &state.synchronizations {
                    if let Err(err) = synchronization.before_completion() {
                        tracing::warn!(%txid, error = %err, "before completion failed, rolling back");
                        failure = Some(err.to_string());
                        break;
                    }
                }
            }
        }

        let status = if commit && failure.is_none() {
            CompletionStatus::Committed
        } else {
            CompletionStatus::RolledBack
        };
        for synchronization in &state.synchronizations {
            synchronization.after_completion(status);
        }
        tracing::debug!(%txid, %status, "transaction completed");

        match failure {
            Some(reason) => Err(CoreError::transaction_aborted(reason)),
            None => Ok(()),
        }
    }
}

impl TransactionProvider for LocalTransactionManager {
    fn current(&self) -> Option<TransactionId> {
        self.inner.lock().bindings.get(&thread::current().id()).copied()
    }

    fn register_synchronization(
        &self,
        txid: TransactionId,
        synchronization: Arc<dyn Synchronization>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let state = inner
            .transactions
            .get_mut(&txid)
            .ok_or(CoreError::NoActiveTransaction)?;
        state.synchronizations.push(synchronization);
        Ok(())
    }
}
