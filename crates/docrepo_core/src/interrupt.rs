//! Per-thread interruption flag.
//!
//! Blocking waits in docrepo (fulltext indexing, mostly) poll the calling
//! thread's flag. A wait that observes it clears it and fails with
//! [`CoreError::Interrupted`]; callers that propagate that error should
//! re-assert the flag with [`interrupt_current`] so outer code still sees it.
//!
//! Another thread can interrupt a waiter through the [`InterruptHandle`] the
//! waiter published with [`current_handle`].

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static FLAG: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

/// Sets the interruption flag of another thread.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Interrupts the thread this handle was taken on.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true if the thread's flag is set.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Returns a handle that interrupts the calling thread.
pub fn current_handle() -> InterruptHandle {
    FLAG.with(|flag| InterruptHandle {
        flag: Arc::clone(flag),
    })
}

/// Sets the calling thread's flag.
pub fn interrupt_current() {
    FLAG.with(|flag| flag.store(true, Ordering::SeqCst));
}

/// Returns true if the calling thread's flag is set, leaving it set.
pub fn is_interrupted() -> bool {
    FLAG.with(|flag| flag.load(Ordering::SeqCst))
}

/// Clears the calling thread's flag, returning its previous value.
pub fn take_interrupted() -> bool {
    FLAG.with(|flag| flag.swap(false, Ordering::SeqCst))
}

/// Fails with `Interrupted` (clearing the flag) if the calling thread is
/// interrupted.
pub fn check() -> CoreResult<()> {
    if take_interrupted() {
        Err(CoreError::Interrupted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_per_thread() {
        interrupt_current();
        let other = std::thread::spawn(is_interrupted).join().unwrap();
        assert!(!other);
        assert!(is_interrupted());
        assert!(take_interrupted());
        assert!(!is_interrupted());
    }

    #[test]
    fn check_consumes_flag() {
        interrupt_current();
        assert_eq!(check(), Err(CoreError::Interrupted));
        assert_eq!(check(), Ok(()));
    }

    #[test]
    fn handle_interrupts_owner() {
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = std::thread::spawn(move || {
            tx.send(current_handle()).unwrap();
            while !is_interrupted() {
                std::thread::yield_now();
            }
            take_interrupted()
        });
        rx.recv().unwrap().interrupt();
        assert!(worker.join().unwrap());
        assert!(!is_interrupted());
    }
}
