//! Configuration for indexing, entity loading and the local backend.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpathaError};

/// When entity changes observed by a session are turned into index work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutomaticIndexingStrategy {
    /// Changes are recorded, processed on flush and executed on commit.
    #[default]
    Session,
    /// Changes are ignored; only explicit write plan calls index anything.
    None,
}

/// Configuration of session write plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Automatic indexing strategy.
    pub strategy: AutomaticIndexingStrategy,

    /// Whether documents are built on a thread pool.
    pub parallel_document_building: bool,

    /// Minimum number of pending works before building goes parallel.
    pub parallel_threshold: usize,

    /// Thread pool size for document building.
    /// If None, uses the number of CPU cores.
    pub document_building_threads: Option<usize>,

    /// Whether a rollback after an explicit execution logs a warning.
    pub warn_on_rollback_after_flush: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            strategy: AutomaticIndexingStrategy::Session,
            parallel_document_building: false,
            parallel_threshold: 64,
            document_building_threads: None,
            warn_on_rollback_after_flush: true,
        }
    }
}

impl IndexingConfig {
    pub fn with_strategy(mut self, strategy: AutomaticIndexingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_parallel_document_building(mut self, parallel: bool) -> Self {
        self.parallel_document_building = parallel;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_document_building_threads(mut self, threads: usize) -> Self {
        self.document_building_threads = Some(threads);
        self
    }

    pub fn with_warn_on_rollback_after_flush(mut self, warn: bool) -> Self {
        self.warn_on_rollback_after_flush = warn;
        self
    }

    /// Number of threads used for parallel document building.
    pub fn effective_threads(&self) -> usize {
        self.document_building_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Configuration of entity loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityLoadingConfig {
    /// Batch size hint passed to entity stores.
    pub fetch_size: usize,
}

impl Default for EntityLoadingConfig {
    fn default() -> Self {
        Self { fetch_size: 100 }
    }
}

impl EntityLoadingConfig {
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }
}

/// Configuration of the in-process backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendConfig {
    /// BM25 term frequency saturation.
    pub bm25_k1: f32,

    /// BM25 length normalization.
    pub bm25_b: f32,

    /// Capacity of each index writer queue.
    pub writer_queue_capacity: usize,

    /// Default maximum edit distance of fuzzy predicates.
    pub default_max_edit_distance: usize,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            bm25_k1: 1.2,
            bm25_b: 0.75,
            writer_queue_capacity: 1024,
            default_max_edit_distance: 2,
        }
    }
}

impl LocalBackendConfig {
    pub fn with_bm25(mut self, k1: f32, b: f32) -> Self {
        self.bm25_k1 = k1;
        self.bm25_b = b;
        self
    }

    pub fn with_writer_queue_capacity(mut self, capacity: usize) -> Self {
        self.writer_queue_capacity = capacity;
        self
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpathaConfig {
    pub indexing: IndexingConfig,
    pub loading: EntityLoadingConfig,
    pub local: LocalBackendConfig,
}

impl SpathaConfig {
    /// Parse and validate a JSON configuration; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SpathaConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_indexing(mut self, indexing: IndexingConfig) -> Self {
        self.indexing = indexing;
        self
    }

    pub fn with_loading(mut self, loading: EntityLoadingConfig) -> Self {
        self.loading = loading;
        self
    }

    pub fn with_local(mut self, local: LocalBackendConfig) -> Self {
        self.local = local;
        self
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.loading.fetch_size == 0 {
            return Err(SpathaError::invalid_config("loading.fetch_size must be positive"));
        }
        if self.local.writer_queue_capacity == 0 {
            return Err(SpathaError::invalid_config(
                "local.writer_queue_capacity must be positive",
            ));
        }
        if self.local.default_max_edit_distance > 2 {
            return Err(SpathaError::invalid_config(
                "local.default_max_edit_distance must be at most 2",
            ));
        }
        if !(0.0..=1.0).contains(&self.local.bm25_b) || self.local.bm25_k1 < 0.0 {
            return Err(SpathaError::invalid_config("invalid BM25 parameters"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SpathaConfig::default();
        assert_eq!(config.indexing.strategy, AutomaticIndexingStrategy::Session);
        assert_eq!(config.loading.fetch_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = SpathaConfig::from_json_str(
            r#"{"indexing": {"strategy": "none"}, "loading": {"fetch_size": 25}}"#,
        )
        .unwrap();
        assert_eq!(config.indexing.strategy, AutomaticIndexingStrategy::None);
        assert!(config.indexing.warn_on_rollback_after_flush);
        assert_eq!(config.loading.fetch_size, 25);
        assert_eq!(config.local.bm25_k1, 1.2);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SpathaConfig::from_json_str(r#"{"loading": {"fetch_size": 0}}"#).is_err());
        assert!(SpathaConfig::from_json_str("not json").is_err());
    }
}
