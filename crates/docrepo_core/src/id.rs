//! Document id generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of new document ids.
///
/// Ids must be unique for the lifetime of the repository and never reused.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Returns a new id.
    fn generate(&self) -> String;
}

/// Random UUID v4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `UUID_<n>` ids, counting from zero.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Creates a generator whose first id is `UUID_0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        format!("UUID_{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidGenerator;
        let generated: HashSet<String> = (0..1000).map(|_| ids.generate()).collect();
        assert_eq!(generated.len(), 1000);
        assert!(generated.iter().all(|id| Uuid::parse_str(id).is_ok()));
    }

    #[test]
    fn sequential_ids_across_threads() {
        let ids = Arc::new(SequentialIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.generate()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(all.len(), 1000);
        assert!(all.contains("UUID_999"));
    }
}
