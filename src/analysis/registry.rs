//! Name-based lookup of analyzers and normalizers.

use std::sync::Arc;

use ahash::AHashMap;

use crate::analysis::analyzer::{
    Analyzer, KeywordAnalyzer, LowercaseNormalizer, SimpleAnalyzer, StandardAnalyzer,
    WhitespaceAnalyzer,
};
use crate::error::{Result, SpathaError};

/// Registry of named analyzers and normalizers shared by the indexes of a backend.
#[derive(Debug, Clone)]
pub struct AnalysisRegistry {
    analyzers: AHashMap<String, Arc<dyn Analyzer>>,
    normalizers: AHashMap<String, Arc<dyn Analyzer>>,
}

impl AnalysisRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        AnalysisRegistry {
            analyzers: AHashMap::new(),
            normalizers: AHashMap::new(),
        }
    }

    /// Register an analyzer under a name, replacing any previous one.
    pub fn register_analyzer<S: Into<String>>(&mut self, name: S, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(name.into(), analyzer);
    }

    /// Register a normalizer under a name, replacing any previous one.
    pub fn register_normalizer<S: Into<String>>(
        &mut self,
        name: S,
        normalizer: Arc<dyn Analyzer>,
    ) {
        self.normalizers.insert(name.into(), normalizer);
    }

    /// Resolve an analyzer by name.
    pub fn analyzer(&self, name: &str) -> Result<Arc<dyn Analyzer>> {
        self.analyzers
            .get(name)
            .cloned()
            .ok_or_else(|| SpathaError::analysis(format!("Unknown analyzer '{name}'")))
    }

    /// Resolve a normalizer by name.
    pub fn normalizer(&self, name: &str) -> Result<Arc<dyn Analyzer>> {
        self.normalizers
            .get(name)
            .cloned()
            .ok_or_else(|| SpathaError::analysis(format!("Unknown normalizer '{name}'")))
    }
}

impl Default for AnalysisRegistry {
    /// The built-in analyzers (`standard`, `simple`, `whitespace`, `keyword`)
    /// and normalizers (`lowercase`, `keyword`).
    fn default() -> Self {
        let mut registry = AnalysisRegistry::empty();
        registry.register_analyzer("standard", Arc::new(StandardAnalyzer::new()));
        registry.register_analyzer("simple", Arc::new(SimpleAnalyzer));
        registry.register_analyzer("whitespace", Arc::new(WhitespaceAnalyzer));
        registry.register_analyzer("keyword", Arc::new(KeywordAnalyzer));
        registry.register_normalizer("lowercase", Arc::new(LowercaseNormalizer));
        registry.register_normalizer("keyword", Arc::new(KeywordAnalyzer));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = AnalysisRegistry::default();
        assert_eq!(registry.analyzer("standard").unwrap().name(), "standard");
        assert_eq!(registry.normalizer("lowercase").unwrap().name(), "lowercase");

        let err = registry.analyzer("klingon").unwrap_err();
        assert!(err.to_string().contains("Unknown analyzer 'klingon'"));
    }
}
