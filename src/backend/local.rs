//! In-process search backend.
//!
//! Each index keeps its documents and term statistics in memory. Writes go
//! through a dedicated writer thread per index; queries read the stores under
//! a shared lock, score matching documents with BM25 and sort them with the
//! requested sort chain.
//!
//! ```
//! use spatha::backend::local::LocalBackend;
//! use spatha::config::LocalBackendConfig;
//! use spatha::schema::{IndexField, IndexSchema};
//!
//! let backend = LocalBackend::new(LocalBackendConfig::default());
//! let schema = IndexSchema::builder("books")
//!     .field(IndexField::text("title"))
//!     .build()
//!     .unwrap();
//! let index = backend.create_index(schema).unwrap();
//! assert_eq!(index.document_count(), 0);
//! ```

pub mod executor;
pub mod factory;
pub mod store;
pub mod writer;

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::analysis::registry::AnalysisRegistry;
use crate::backend::local::executor::{collect_candidates, sort_candidates, to_hit};
use crate::backend::local::factory::{
    LocalPredicate, LocalPredicateFactory, LocalProjection, LocalProjectionFactory, LocalSort,
    LocalSortFactory, create_factories,
};
use crate::backend::local::store::IndexStore;
use crate::backend::local::writer::{IndexWriter, LocalWorkPlan};
use crate::backend::work::{IndexManager, IndexWorkPlan};
use crate::config::LocalBackendConfig;
use crate::error::{Result, SpathaError};
use crate::query::search_query::SearchResult;
use crate::query::spi::{IndexModel, SearchBackend, SearchRequest};
use crate::schema::schema::IndexSchema;

/// One index of the local backend.
#[derive(Debug)]
pub struct LocalIndex {
    model: Arc<IndexModel<LocalBackend>>,
    store: Arc<RwLock<IndexStore>>,
    writer: IndexWriter,
}

impl LocalIndex {
    pub fn model(&self) -> &Arc<IndexModel<LocalBackend>> {
        &self.model
    }

    /// Number of documents currently visible to queries.
    pub fn document_count(&self) -> usize {
        self.store.read().len()
    }

    /// Whether a document with this id is indexed.
    pub fn contains(&self, id: &str) -> bool {
        self.store.read().get(id).is_some()
    }
}

impl IndexManager for LocalIndex {
    fn index_name(&self) -> &str {
        self.model.name()
    }

    fn schema(&self) -> &Arc<IndexSchema> {
        self.model.schema()
    }

    fn create_work_plan(&self) -> Box<dyn IndexWorkPlan> {
        Box::new(LocalWorkPlan::new(self.writer.clone()))
    }
}

/// The in-process backend.
#[derive(Debug)]
pub struct LocalBackend {
    config: LocalBackendConfig,
    analysis: Arc<AnalysisRegistry>,
    indexes: RwLock<AHashMap<String, Arc<LocalIndex>>>,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Self {
        LocalBackend {
            config,
            analysis: Arc::new(AnalysisRegistry::default()),
            indexes: RwLock::new(AHashMap::new()),
        }
    }

    /// Use a custom analysis registry for indexes created afterwards.
    pub fn with_analysis(mut self, analysis: AnalysisRegistry) -> Self {
        self.analysis = Arc::new(analysis);
        self
    }

    pub fn config(&self) -> &LocalBackendConfig {
        &self.config
    }

    /// Create an index and start its writer thread.
    pub fn create_index(&self, schema: IndexSchema) -> Result<Arc<LocalIndex>> {
        let name = schema.index_name().to_string();
        if self.indexes.read().contains_key(&name) {
            return Err(SpathaError::backend(format!("Index '{name}' already exists")));
        }
        let model = Arc::new(IndexModel::build(Arc::new(schema), |descriptor| {
            create_factories(descriptor, &self.analysis)
        })?);
        let store = Arc::new(RwLock::new(IndexStore::new(&model)));
        let writer = IndexWriter::spawn(&name, Arc::clone(&store), self.config.writer_queue_capacity)?;
        let index = Arc::new(LocalIndex {
            model,
            store,
            writer,
        });

        let mut indexes = self.indexes.write();
        if indexes.contains_key(&name) {
            return Err(SpathaError::backend(format!("Index '{name}' already exists")));
        }
        indexes.insert(name.clone(), Arc::clone(&index));
        info!(index = %name, "created local index");
        Ok(index)
    }

    pub fn index(&self, name: &str) -> Option<Arc<LocalIndex>> {
        self.indexes.read().get(name).cloned()
    }
}

impl SearchBackend for LocalBackend {
    type PredicateLeaf = LocalPredicate;
    type SortLeaf = LocalSort;
    type ProjectionLeaf = LocalProjection;
    type PredicateFactory = LocalPredicateFactory;
    type SortFactory = LocalSortFactory;
    type ProjectionFactory = LocalProjectionFactory;

    fn name(&self) -> &'static str {
        "local"
    }

    fn index_model(&self, index_name: &str) -> Option<Arc<IndexModel<Self>>> {
        self.index(index_name).map(|index| Arc::clone(&index.model))
    }

    fn execute(&self, request: &SearchRequest<'_, Self>) -> Result<SearchResult> {
        let mut candidates = Vec::new();
        for (position, model) in request.indexes.iter().enumerate() {
            let index = self.index(model.name()).ok_or_else(|| {
                SpathaError::backend(format!("Index '{}' no longer exists", model.name()))
            })?;
            let store = index.store.read();
            collect_candidates(
                &store,
                position,
                request.predicate,
                &self.config,
                &mut candidates,
            );
        }
        let total_hit_count = candidates.len();
        sort_candidates(&mut candidates, request.sorts);

        let hits = candidates
            .iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|candidate| to_hit(candidate, request.projections))
            .collect::<Result<Vec<_>>>()?;
        debug!(total_hit_count, hits = hits.len(), "local search executed");
        Ok(SearchResult {
            total_hit_count,
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::document::document::Document;
    use crate::document::field_value::FieldValue;
    use crate::query::scope::SearchScope;
    use crate::schema::field::IndexField;

    fn backend() -> Arc<LocalBackend> {
        let backend = Arc::new(LocalBackend::new(LocalBackendConfig::default()));
        let schema = IndexSchema::builder("books")
            .field(IndexField::text("title"))
            .field(IndexField::integer("pages").sortable(true).projectable(true))
            .build()
            .unwrap();
        let index = backend.create_index(schema).unwrap();

        let mut plan = index.create_work_plan();
        for (id, title, pages) in [
            ("1", "The quick brown fox", 120_i64),
            ("2", "A lazy dog", 80),
            ("3", "Quick quick fox", 300),
        ] {
            let mut document = Document::new();
            document.add_value("title", FieldValue::from(title));
            document.add_value("pages", FieldValue::from(pages));
            plan.add(id.to_string(), document);
        }
        block_on(plan.execute()).unwrap();
        backend
    }

    #[test]
    fn test_duplicate_index_is_rejected() {
        let backend = backend();
        let schema = IndexSchema::builder("books").build().unwrap();
        assert!(backend.create_index(schema).is_err());
    }

    #[test]
    fn test_writes_are_visible_after_execute() {
        let backend = backend();
        let index = backend.index("books").unwrap();
        assert_eq!(index.document_count(), 3);

        let mut plan = index.create_work_plan();
        plan.delete("2".to_string());
        block_on(plan.execute()).unwrap();
        assert!(!index.contains("2"));
    }

    #[test]
    fn test_term_frequency_ranks_higher() {
        let scope = SearchScope::new(backend(), &["books"]).unwrap();
        let predicate = scope
            .predicate()
            .match_()
            .on_field("title")
            .matching("quick")
            .unwrap();
        let result = scope.query().predicate(predicate).build().fetch(10, 0).unwrap();
        assert_eq!(result.total_hit_count, 2);
        assert_eq!(result.ids(), vec!["3", "1"]);
    }

    #[test]
    fn test_sort_and_paging() {
        let scope = SearchScope::new(backend(), &["books"]).unwrap();
        let sort = scope.sort().field("pages").desc().build().unwrap();
        let projection = scope.projection().field("pages").unwrap();
        let query = scope.query().sort(sort).projection(projection).build();

        let page = query.fetch(2, 1).unwrap();
        assert_eq!(page.total_hit_count, 3);
        assert_eq!(page.ids(), vec!["1", "2"]);
        assert_eq!(
            page.hits[0].projections[0].first(),
            Some(&FieldValue::Integer(120))
        );
    }
}
