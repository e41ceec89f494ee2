//! Search session bound to a persistence session.

use std::any::Any;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::config::{AutomaticIndexingStrategy, SpathaConfig};
use crate::error::{Result, SpathaError};
use crate::mapping::entity::EntityRef;
use crate::mapping::registry::MappingRegistry;
use crate::query::scope::SearchScope;
use crate::query::search_query::SearchResult;
use crate::query::spi::SearchBackend;
use crate::session::loader::{EntityLoader, EntityStore};
use crate::session::write_plan::SearchWritePlan;

/// Opens sessions sharing a mapping, an entity store and a document building pool.
#[derive(Debug, Clone)]
pub struct SearchSessionFactory {
    registry: Arc<MappingRegistry>,
    store: Arc<dyn EntityStore>,
    config: SpathaConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl SearchSessionFactory {
    pub fn new(
        registry: Arc<MappingRegistry>,
        store: Arc<dyn EntityStore>,
        config: SpathaConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = if config.indexing.parallel_document_building {
            let threads = config.indexing.effective_threads();
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("spatha-document-builder-{i}"))
                .build()
                .map_err(|e| SpathaError::other(format!("Failed to create thread pool: {e}")))?;
            info!(threads, "document building pool started");
            Some(Arc::new(pool))
        } else {
            None
        };
        Ok(SearchSessionFactory {
            registry,
            store,
            config,
            pool,
        })
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SpathaConfig {
        &self.config
    }

    pub fn open_session(&self) -> SearchSession {
        let mut session = SearchSession::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.config.clone(),
        );
        if let Some(pool) = &self.pool {
            session.write_plan = session.write_plan.with_thread_pool(Arc::clone(pool));
        }
        session
    }
}

/// Search side of a persistence session.
///
/// Entity change events are recorded in the session's write plan, processed
/// on flush and executed on commit. Writes executed before the commit, through
/// [`SearchSession::execute_now`], are not undone by a rollback.
#[derive(Debug)]
pub struct SearchSession {
    registry: Arc<MappingRegistry>,
    store: Arc<dyn EntityStore>,
    config: SpathaConfig,
    write_plan: SearchWritePlan,
    in_transaction: bool,
    executed_in_transaction: bool,
}

impl SearchSession {
    pub fn new(registry: Arc<MappingRegistry>, store: Arc<dyn EntityStore>, config: SpathaConfig) -> Self {
        let write_plan = SearchWritePlan::new(Arc::clone(&registry), config.indexing.clone());
        SearchSession {
            registry,
            store,
            config,
            write_plan,
            in_transaction: false,
            executed_in_transaction: false,
        }
    }

    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SpathaConfig {
        &self.config
    }

    pub fn write_plan(&mut self) -> &mut SearchWritePlan {
        &mut self.write_plan
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn automatic_indexing(&self) -> bool {
        self.config.indexing.strategy == AutomaticIndexingStrategy::Session
    }

    pub fn loader(&self) -> EntityLoader<'_> {
        EntityLoader::new(&self.registry, self.store.as_ref(), self.config.loading.fetch_size)
    }

    /// Load the entities behind the hits of `result`, in hit order.
    pub fn load_hits(&self, result: &SearchResult) -> Result<Vec<Option<EntityRef>>> {
        self.loader().load_blocking(&result.references())
    }

    /// A search scope over the indexes of the given entity types.
    pub fn scope<B: SearchBackend>(&self, backend: Arc<B>, entity_types: &[&str]) -> Result<SearchScope<B>> {
        let mut indexes = Vec::with_capacity(entity_types.len());
        for entity_type in entity_types {
            let index = self
                .registry
                .type_mapping(entity_type)
                .and_then(|mapping| mapping.index())
                .ok_or_else(|| SpathaError::NotIndexed {
                    entity_type: entity_type.to_string(),
                })?;
            indexes.push(index);
        }
        SearchScope::new(backend, &indexes)
    }

    pub fn begin_transaction(&mut self) {
        self.in_transaction = true;
        self.executed_in_transaction = false;
    }

    pub fn on_entity_inserted<T: Any + Send + Sync>(&mut self, entity: Arc<T>) -> Result<()> {
        if !self.automatic_indexing() {
            return Ok(());
        }
        self.write_plan.add(entity)
    }

    pub fn on_entity_updated<T: Any + Send + Sync>(&mut self, entity: Arc<T>) -> Result<()> {
        if !self.automatic_indexing() {
            return Ok(());
        }
        self.write_plan.add_or_update(entity)
    }

    pub fn on_entity_deleted<T: Any + Send + Sync>(&mut self, entity: Arc<T>) -> Result<()> {
        if !self.automatic_indexing() {
            return Ok(());
        }
        self.write_plan.delete(entity)
    }

    /// Build the documents of the changes recorded so far.
    pub fn on_flush(&mut self) -> Result<()> {
        if !self.automatic_indexing() {
            return Ok(());
        }
        self.write_plan.process()
    }

    /// Execute the write plan at transaction commit.
    pub fn on_commit(&mut self) -> BoxFuture<'static, Result<()>> {
        self.in_transaction = false;
        self.executed_in_transaction = false;
        if !self.automatic_indexing() {
            return future::ready(Ok(())).boxed();
        }
        self.write_plan.execute()
    }

    /// Discard the changes recorded during the transaction.
    pub fn on_rollback(&mut self) {
        let discarded = self.write_plan.pending_len() + self.write_plan.built_len();
        self.write_plan.clear();
        if self.executed_in_transaction && self.config.indexing.warn_on_rollback_after_flush {
            warn!(
                "transaction rolled back after index writes were executed; \
                 the indexes keep those writes until the entities are reindexed"
            );
        }
        debug!(discarded, "rolled back search session");
        self.in_transaction = false;
        self.executed_in_transaction = false;
    }

    /// Execute the write plan immediately, inside or outside a transaction.
    pub fn execute_now(&mut self) -> BoxFuture<'static, Result<()>> {
        if self.in_transaction && (self.write_plan.pending_len() > 0 || self.write_plan.built_len() > 0) {
            self.executed_in_transaction = true;
        }
        self.write_plan.execute()
    }
}
