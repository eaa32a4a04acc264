//! Stress helpers for shared transaction sessions.
//!
//! These helpers drive many threads through the handles of one
//! transaction, the way request workers share a transaction's session.

use crate::fixtures::TestRepository;
use docrepo_core::{CoreResult, Session};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Operations per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of worker threads, each with its own handle.
    pub threads: usize,
    /// Documents each worker creates.
    pub docs_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            docs_per_thread: 50,
        }
    }
}

/// Creates documents from several threads inside one transaction.
///
/// Each worker gets its own handle from the repository and creates
/// `docs_per_thread` children of the root named `w<thread>-<n>`. The
/// transaction commits once every worker is done.
///
/// # Errors
///
/// Returns the commit error, if any.
pub fn concurrent_handle_writes(
    test: &TestRepository,
    config: &StressConfig,
) -> CoreResult<StressTestResult> {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let root = test.root_id().to_string();
    let start = Instant::now();

    test.tm.begin()?;
    let handles: Vec<Box<dyn Session>> = (0..config.threads)
        .map(|t| test.get_session(&format!("worker-{t}")))
        .collect::<CoreResult<_>>()?;

    thread::scope(|scope| {
        for (t, session) in handles.iter().enumerate() {
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let root = root.as_str();
            scope.spawn(move || {
                for n in 0..config.docs_per_thread {
                    match session.add_child(root, &format!("w{t}-{n}"), "File") {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    test.tm.commit()?;
    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    tracing::debug!(
        threads = config.threads,
        ops = result.total_ops,
        ops_per_second = result.ops_per_second(),
        "concurrent handle writes finished"
    );
    Ok(result)
}
