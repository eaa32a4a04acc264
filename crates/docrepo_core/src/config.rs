//! Repository configuration.

use crate::id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
use std::sync::Arc;

/// How new document ids are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Random UUID v4 strings.
    #[default]
    Random,
    /// Deterministic `UUID_<n>` strings, for debugging.
    Sequential,
}

impl IdStrategy {
    /// Builds a fresh generator for this strategy.
    pub fn generator(self) -> Arc<dyn IdGenerator> {
        match self {
            Self::Random => Arc::new(UuidGenerator),
            Self::Sequential => Arc::new(SequentialIdGenerator::new()),
        }
    }
}

/// Configuration for opening a repository.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Repository name, carried on fulltext jobs and in logs.
    pub name: String,

    /// Id generation strategy.
    pub id_strategy: IdStrategy,

    /// Whether committing a session schedules fulltext jobs.
    pub fulltext_enabled: bool,

    /// Maximum number of queued fulltext jobs before `submit` blocks.
    pub fulltext_queue_capacity: usize,

    /// Whether session-level queries return copies instead of shared states.
    pub query_deep_copy: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            id_strategy: IdStrategy::Random,
            fulltext_enabled: true,
            fulltext_queue_capacity: 1024,
            query_deep_copy: true,
        }
    }
}

impl RepositoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the repository name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the id generation strategy.
    #[must_use]
    pub const fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Sets whether fulltext jobs are scheduled.
    #[must_use]
    pub const fn fulltext_enabled(mut self, value: bool) -> Self {
        self.fulltext_enabled = value;
        self
    }

    /// Sets the fulltext queue bound.
    #[must_use]
    pub const fn fulltext_queue_capacity(mut self, capacity: usize) -> Self {
        self.fulltext_queue_capacity = capacity;
        self
    }

    /// Sets whether session queries deep-copy their results.
    #[must_use]
    pub const fn query_deep_copy(mut self, value: bool) -> Self {
        self.query_deep_copy = value;
        self
    }
}
