//! Deferred fulltext indexing.
//!
//! Committing a session hands fulltext work to a [`WorkSubmitter`]. The
//! bundled [`FulltextQueue`] runs one worker thread per repository and
//! processes jobs strictly one at a time, so index writes never interleave.
//! Jobs that fail are logged and dropped; nothing is retried.

use crate::error::{CoreError, CoreResult};
use crate::interrupt;
use docrepo_state::keys::{KEY_FULLTEXT_BINARY, KEY_FULLTEXT_JOB_ID, KEY_FULLTEXT_SIMPLE};
use docrepo_state::{State, Value};
use docrepo_storage::{DocumentStore, IgnoredIds, StorageError, StorageResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Name of the index whose property carries no suffix.
pub const DEFAULT_INDEX: &str = "default";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Which kind of extracted text a job writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulltextKind {
    /// Text taken from string properties.
    Simple,
    /// Text extracted from binaries.
    Binary,
}

/// Documents a job applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulltextTarget {
    /// A single document, skipped if it vanished or is a proxy.
    Document(String),
    /// Every non-proxy document whose `fulltextJobId` equals this id.
    Job(String),
}

/// Text for one fulltext index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedText {
    /// Index name.
    pub index: String,
    /// Extracted text.
    pub text: String,
}

/// A unit of fulltext work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulltextJob {
    /// Repository the documents live in.
    pub repository: String,
    /// Documents to update.
    pub target: FulltextTarget,
    /// Kind of text being written.
    pub kind: FulltextKind,
    /// Text per index.
    pub indexes: Vec<IndexedText>,
}

impl FulltextJob {
    /// Creates a job for one document.
    pub fn document(repository: impl Into<String>, id: impl Into<String>, kind: FulltextKind) -> Self {
        Self {
            repository: repository.into(),
            target: FulltextTarget::Document(id.into()),
            kind,
            indexes: Vec::new(),
        }
    }

    /// Creates a job for every document sharing a job id.
    pub fn job(repository: impl Into<String>, job_id: impl Into<String>, kind: FulltextKind) -> Self {
        Self {
            repository: repository.into(),
            target: FulltextTarget::Job(job_id.into()),
            kind,
            indexes: Vec::new(),
        }
    }

    /// Adds text for an index.
    #[must_use]
    pub fn with_text(mut self, index: impl Into<String>, text: impl Into<String>) -> Self {
        self.indexes.push(IndexedText {
            index: index.into(),
            text: text.into(),
        });
        self
    }
}

/// Returns the property a job of `kind` writes for `index`.
///
/// The default index uses the bare property; other indexes append
/// `_<index>`.
pub fn fulltext_key(kind: FulltextKind, index: &str) -> String {
    let base = match kind {
        FulltextKind::Simple => KEY_FULLTEXT_SIMPLE,
        FulltextKind::Binary => KEY_FULLTEXT_BINARY,
    };
    if index == DEFAULT_INDEX {
        base.to_string()
    } else {
        format!("{base}_{index}")
    }
}

/// Background work submission.
pub trait WorkSubmitter: Send + Sync {
    /// Queues a job. May block while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` once the queue has shut down.
    fn submit(&self, job: FulltextJob) -> CoreResult<()>;

    /// Blocks until every submitted job has been processed or `timeout`
    /// elapses. Returns false on timeout.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the calling thread is interrupted.
    fn wait_idle(&self, timeout: Duration) -> CoreResult<bool>;
}

/// Counters of a [`FulltextQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FulltextStats {
    /// Jobs submitted but not yet processed.
    pub pending: usize,
    /// Jobs processed successfully.
    pub processed: u64,
    /// Jobs that failed.
    pub failed: u64,
}

#[derive(Default)]
struct Shared {
    stats: Mutex<FulltextStats>,
    idle: Condvar,
}

/// Single-worker fulltext queue for one repository.
pub struct FulltextQueue {
    repository: String,
    sender: Mutex<Option<SyncSender<FulltextJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl fmt::Debug for FulltextQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FulltextQueue")
            .field("repository", &self.repository)
            .field("stats", &self.stats())
            .finish()
    }
}

impl FulltextQueue {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the thread cannot be spawned.
    pub fn start(
        repository: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        capacity: usize,
    ) -> CoreResult<Self> {
        let repository = repository.into();
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let shared = Arc::new(Shared::default());

        let worker = {
            let shared = Arc::clone(&shared);
            let repository = repository.clone();
            std::thread::Builder::new()
                .name(format!("fulltext-{repository}"))
                .spawn(move || run(&repository, store.as_ref(), receiver, &shared))
                .map_err(|err| CoreError::unavailable(format!("fulltext worker: {err}")))?
        };
        tracing::debug!(%repository, capacity, "fulltext queue started");

        Ok(Self {
            repository,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            shared,
        })
    }

    /// Returns the current counters.
    pub fn stats(&self) -> FulltextStats {
        *self.shared.stats.lock()
    }

    /// Stops accepting jobs, drains the queue and joins the worker.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                tracing::error!(repository = %self.repository, "fulltext worker panicked");
            }
            tracing::debug!(repository = %self.repository, "fulltext queue shut down");
        }
    }
}

impl WorkSubmitter for FulltextQueue {
    fn submit(&self, job: FulltextJob) -> CoreResult<()> {
        if job.repository != self.repository {
            return Err(CoreError::invalid_operation(format!(
                "fulltext job for repository {} submitted to {}",
                job.repository, self.repository
            )));
        }
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| CoreError::unavailable("fulltext queue is shut down"))?;

        self.shared.stats.lock().pending += 1;
        if sender.send(job).is_err() {
            let mut stats = self.shared.stats.lock();
            stats.pending = stats.pending.saturating_sub(1);
            self.shared.idle.notify_all();
            return Err(CoreError::unavailable("fulltext worker has stopped"));
        }
        Ok(())
    }

    fn wait_idle(&self, timeout: Duration) -> CoreResult<bool> {
        let deadline = Instant::now().checked_add(timeout);
        let mut stats = self.shared.stats.lock();
        loop {
            if stats.pending == 0 {
                return Ok(true);
            }
            interrupt::check()?;
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            self.shared.idle.wait_for(&mut stats, slice);
        }
    }
}

impl Drop for FulltextQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(repository: &str, store: &dyn DocumentStore, receiver: Receiver<FulltextJob>, shared: &Shared) {
    for job in receiver {
        let outcome = apply(store, &job);
        let mut stats = shared.stats.lock();
        stats.pending = stats.pending.saturating_sub(1);
        match outcome {
            Ok(updated) => {
                stats.processed += 1;
                tracing::trace!(%repository, target = ?job.target, updated, "fulltext job done");
            }
            Err(err) => {
                stats.failed += 1;
                tracing::error!(%repository, target = ?job.target, error = %err, "fulltext job failed");
            }
        }
        shared.idle.notify_all();
    }
    tracing::debug!(%repository, "fulltext worker stopped");
}

fn apply(store: &dyn DocumentStore, job: &FulltextJob) -> StorageResult<usize> {
    match &job.target {
        FulltextTarget::Document(id) => {
            let mut edit = |state: &mut State| {
                // a proxy's target carries the text
                if state.is_proxy() {
                    return false;
                }
                set_text(state, job);
                true
            };
            match store.update_state_with(id, &mut edit) {
                Ok(updated) => Ok(usize::from(updated)),
                Err(StorageError::NotFound { .. }) => Ok(0),
                Err(err) => Err(err),
            }
        }
        FulltextTarget::Job(job_id) => {
            let job_value = Value::from(job_id.as_str());
            let ids: Vec<String> = store
                .query_key_value(KEY_FULLTEXT_JOB_ID, &job_value, &IgnoredIds::new())?
                .iter()
                .filter(|state| !state.is_proxy())
                .filter_map(|state| state.id().map(str::to_string))
                .collect();
            let mut edit = |state: &mut State| {
                // another writer may have reassigned the job meanwhile
                if state.is_proxy() || state.get(KEY_FULLTEXT_JOB_ID) != Some(&job_value) {
                    return false;
                }
                set_text(state, job);
                state.remove(KEY_FULLTEXT_JOB_ID);
                true
            };
            let mut updated = 0;
            for id in &ids {
                match store.update_state_with(id, &mut edit) {
                    Ok(true) => updated += 1,
                    Ok(false) | Err(StorageError::NotFound { .. }) => {}
                    Err(err) => {
                        tracing::error!(%id, error = %err, "could not set fulltext");
                    }
                }
            }
            Ok(updated)
        }
    }
}

fn set_text(state: &mut State, job: &FulltextJob) {
    for entry in &job.indexes {
        state.set(fulltext_key(job.kind, &entry.index), entry.text.as_str());
    }
}
