//! Write plan of a search session.
//!
//! The plan buffers entity-level operations (add, update, delete, purge)
//! keyed by entity identity, so that at most one effective operation per
//! entity survives until documents are built. When the plan is processed,
//! every entity whose final operation is not a purge cascades an update to
//! each indexed entity that embeds it. Flushing happens in two phases:
//! [`SearchWritePlan::process`] builds documents, [`SearchWritePlan::execute`]
//! hands them to the index managers.
//!
//! Once `execute` has been called the writes are out of the plan's hands: a
//! transaction rollback afterwards does not undo them.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use futures::future::{self, BoxFuture, FutureExt};
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::backend::work::DocumentWork;
use crate::config::IndexingConfig;
use crate::error::{DocumentBuildFailure, Result, SpathaError};
use crate::mapping::entity::{EntityId, EntityKey, EntityRef};
use crate::mapping::registry::{MappingRegistry, TypeMapping};

/// Lifecycle state of a write plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePlanState {
    Empty,
    Accumulating,
    Processed,
    Executing,
}

/// The effective operation recorded for one entity.
#[derive(Clone)]
pub enum PendingWork {
    Add(EntityRef),
    Update(EntityRef),
    Delete,
    Purge,
}

impl PendingWork {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingWork::Add(_) => "add",
            PendingWork::Update(_) => "update",
            PendingWork::Delete => "delete",
            PendingWork::Purge => "purge",
        }
    }

    /// The operation left after `next` is recorded on top of `self`.
    fn supersede(self, next: PendingWork) -> PendingWork {
        match (self, next) {
            (_, PendingWork::Purge) => PendingWork::Purge,
            (_, PendingWork::Delete) => PendingWork::Delete,
            // The document may exist in the index, so re-adding replaces it.
            (PendingWork::Delete | PendingWork::Purge, PendingWork::Add(e) | PendingWork::Update(e)) => {
                PendingWork::Update(e)
            }
            (PendingWork::Add(_), PendingWork::Add(e) | PendingWork::Update(e)) => PendingWork::Add(e),
            (PendingWork::Update(_), PendingWork::Add(e) | PendingWork::Update(e)) => {
                PendingWork::Update(e)
            }
        }
    }
}

impl std::fmt::Debug for PendingWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

struct PendingEntry {
    mapping: Arc<TypeMapping>,
    key: EntityKey,
    work: PendingWork,
    /// Last entity recorded directly for this key; embedding entities are
    /// reindexed from it unless the final work is a purge.
    cascade_source: Option<EntityRef>,
}

/// Outcome of building the document of one pending entry.
enum Built {
    Work(String, DocumentWork),
    Failed(DocumentBuildFailure),
}

/// Buffers the index writes of one session.
pub struct SearchWritePlan {
    id: Uuid,
    registry: Arc<MappingRegistry>,
    config: IndexingConfig,
    pool: Option<Arc<ThreadPool>>,
    state: WritePlanState,
    pending: Vec<PendingEntry>,
    positions: AHashMap<EntityKey, usize>,
    /// Changed entities that are only embedded, never indexed themselves.
    embedded_changes: Vec<(Arc<TypeMapping>, EntityRef)>,
    built: BTreeMap<String, Vec<DocumentWork>>,
}

impl std::fmt::Debug for SearchWritePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchWritePlan")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("built", &self.built_len())
            .finish()
    }
}

impl SearchWritePlan {
    pub fn new(registry: Arc<MappingRegistry>, config: IndexingConfig) -> Self {
        SearchWritePlan {
            id: Uuid::new_v4(),
            registry,
            config,
            pool: None,
            state: WritePlanState::Empty,
            pending: Vec::new(),
            positions: AHashMap::new(),
            embedded_changes: Vec::new(),
            built: BTreeMap::new(),
        }
    }

    /// Build documents in this pool when parallel building is enabled.
    pub fn with_thread_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn state(&self) -> WritePlanState {
        self.state
    }

    /// Number of entities with a pending operation.
    pub fn pending_len(&self) -> usize {
        self.pending.len() + self.embedded_changes.len()
    }

    /// The pending operation of an entity, if any.
    ///
    /// Updates cascaded to embedding entities only appear once the plan is
    /// processed.
    pub fn pending_work(&self, key: &EntityKey) -> Option<&PendingWork> {
        self.positions.get(key).map(|&i| &self.pending[i].work)
    }

    /// Pending entries in insertion order.
    pub fn pending(&self) -> impl Iterator<Item = (&EntityKey, &PendingWork)> + '_ {
        self.pending.iter().map(|entry| (&entry.key, &entry.work))
    }

    /// Built writes waiting for `execute`, per index.
    pub fn built(&self) -> &BTreeMap<String, Vec<DocumentWork>> {
        &self.built
    }

    pub fn built_len(&self) -> usize {
        self.built.values().map(Vec::len).sum()
    }

    /// Add an entity that is not indexed yet.
    pub fn add<T: Any + Send + Sync>(&mut self, entity: Arc<T>) -> Result<()> {
        let mapping = self.resolve(TypeId::of::<T>(), std::any::type_name::<T>())?;
        self.record_entity(mapping, entity, PendingWork::Add)
    }

    /// Add an entity, or replace its document if already indexed.
    pub fn add_or_update<T: Any + Send + Sync>(&mut self, entity: Arc<T>) -> Result<()> {
        let mapping = self.resolve(TypeId::of::<T>(), std::any::type_name::<T>())?;
        self.record_entity(mapping, entity, PendingWork::Update)
    }

    /// Delete the document of an entity.
    pub fn delete<T: Any + Send + Sync>(&mut self, entity: Arc<T>) -> Result<()> {
        let mapping = self.resolve(TypeId::of::<T>(), std::any::type_name::<T>())?;
        self.record_entity(mapping, entity, |_| PendingWork::Delete)
    }

    /// Delete a document by the id it was built from.
    ///
    /// Entities embedding the purged one are not reindexed and keep stale
    /// copies of its fields until they are reindexed. This also holds when
    /// the entity was added, updated or deleted earlier in the same plan.
    pub fn purge<T: Any, I: Into<EntityId>>(&mut self, provided_id: I) -> Result<()> {
        let type_name = std::any::type_name::<T>();
        let mapping = self.resolve(TypeId::of::<T>(), type_name)?;
        if !mapping.is_indexed() {
            return Err(SpathaError::NotIndexed {
                entity_type: mapping.name().to_string(),
            });
        }
        let key = EntityKey::new(mapping.name(), provided_id.into());
        debug!(plan = %self.id, entity = %key, "purge does not reindex embedding entities");
        self.record(mapping, key, PendingWork::Purge, None);
        Ok(())
    }

    fn resolve(&self, type_id: TypeId, type_name: &str) -> Result<Arc<TypeMapping>> {
        let mapping = self
            .registry
            .type_name_of(type_id)
            .and_then(|name| self.registry.type_mapping(name))
            .filter(|mapping| mapping.is_indexed() || mapping.is_embedded());
        match mapping {
            Some(mapping) => Ok(Arc::clone(mapping)),
            None => Err(SpathaError::NotIndexed {
                entity_type: self
                    .registry
                    .type_name_of(type_id)
                    .unwrap_or(type_name)
                    .to_string(),
            }),
        }
    }

    fn record_entity<F>(&mut self, mapping: Arc<TypeMapping>, entity: EntityRef, work: F) -> Result<()>
    where
        F: FnOnce(EntityRef) -> PendingWork,
    {
        if !mapping.is_indexed() {
            trace!(plan = %self.id, entity_type = mapping.name(), "recording embedded change");
            self.state = WritePlanState::Accumulating;
            self.embedded_changes.push((mapping, entity));
            return Ok(());
        }
        let id = mapping.entity_id(entity.as_ref()).ok_or_else(|| {
            SpathaError::mapping(format!(
                "Cannot extract the document id of an entity of type '{}'",
                mapping.name()
            ))
        })?;
        let key = EntityKey::new(mapping.name(), id);
        let work = work(Arc::clone(&entity));
        self.record(mapping, key, work, Some(entity));
        Ok(())
    }

    fn record(
        &mut self,
        mapping: Arc<TypeMapping>,
        key: EntityKey,
        work: PendingWork,
        cascade_source: Option<EntityRef>,
    ) {
        trace!(plan = %self.id, entity = %key, work = work.kind(), "recording work");
        self.state = WritePlanState::Accumulating;
        match self.positions.get(&key) {
            Some(&i) => {
                let entry = &mut self.pending[i];
                entry.work = entry.work.clone().supersede(work);
                if cascade_source.is_some() {
                    entry.cascade_source = cascade_source;
                }
            }
            None => {
                self.positions.insert(key.clone(), self.pending.len());
                self.pending.push(PendingEntry {
                    mapping,
                    key,
                    work,
                    cascade_source,
                });
            }
        }
    }

    /// Cascade updates from the final work of every pending entity.
    fn resolve_cascades(&mut self) {
        let mut sources: Vec<(Arc<TypeMapping>, EntityRef)> = self
            .pending
            .iter()
            .filter(|entry| !matches!(entry.work, PendingWork::Purge))
            .filter_map(|entry| {
                let source = entry.cascade_source.as_ref()?;
                Some((Arc::clone(&entry.mapping), Arc::clone(source)))
            })
            .collect();
        sources.append(&mut self.embedded_changes);

        let mut visited = AHashSet::new();
        for (mapping, entity) in sources {
            self.cascade(&mapping, &entity, &mut visited);
        }
    }

    /// Schedule an update of every entity transitively embedding `entity`.
    fn cascade(&mut self, mapping: &TypeMapping, entity: &EntityRef, visited: &mut AHashSet<usize>) {
        if !visited.insert(Arc::as_ptr(entity) as *const () as usize) {
            return;
        }
        let registry = Arc::clone(&self.registry);
        for (container_mapping, container) in registry.containing_entities(mapping, entity.as_ref()) {
            if container_mapping.is_indexed() {
                match container_mapping.entity_id(container.as_ref()) {
                    Some(id) => {
                        let key = EntityKey::new(container_mapping.name(), id);
                        self.record_cascade(Arc::clone(&container_mapping), key, Arc::clone(&container));
                    }
                    None => warn!(
                        plan = %self.id,
                        entity_type = container_mapping.name(),
                        "cannot reindex an embedding entity without document id"
                    ),
                }
            }
            self.cascade(&container_mapping, &container, visited);
        }
    }

    /// Cascaded updates never override a delete or a purge.
    fn record_cascade(&mut self, mapping: Arc<TypeMapping>, key: EntityKey, entity: EntityRef) {
        if let Some(&i) = self.positions.get(&key) {
            if !matches!(self.pending[i].work, PendingWork::Update(_)) {
                return;
            }
        }
        self.record(mapping, key, PendingWork::Update(entity), None);
    }

    /// Build the documents of every pending operation.
    ///
    /// Documents that could be built are kept for `execute` even when others
    /// failed; the failures are returned together.
    pub fn process(&mut self) -> Result<()> {
        let failures = self.process_pending();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SpathaError::DocumentBuildFailures(failures))
        }
    }

    fn process_pending(&mut self) -> Vec<DocumentBuildFailure> {
        self.resolve_cascades();
        let pending = std::mem::take(&mut self.pending);
        self.positions.clear();
        self.state = WritePlanState::Processed;
        if pending.is_empty() {
            return Vec::new();
        }

        let registry = Arc::clone(&self.registry);
        let build = |entry: &PendingEntry| build_work(&registry, entry);
        let parallel = self.config.parallel_document_building
            && pending.len() >= self.config.parallel_threshold;
        let results: Vec<Built> = if parallel {
            match &self.pool {
                Some(pool) => pool.install(|| pending.par_iter().map(build).collect()),
                None => pending.par_iter().map(build).collect(),
            }
        } else {
            pending.iter().map(build).collect()
        };

        let mut failures = Vec::new();
        for result in results {
            match result {
                Built::Work(index, work) => self.built.entry(index).or_default().push(work),
                Built::Failed(failure) => failures.push(failure),
            }
        }
        debug!(
            plan = %self.id,
            entities = pending.len(),
            failures = failures.len(),
            parallel,
            "processed write plan"
        );
        failures
    }

    /// Send the built writes to the index managers.
    ///
    /// Pending operations are processed first. The plan is empty again as
    /// soon as this returns; the future completes when every index applied
    /// its writes. A write error is returned as-is and takes precedence over
    /// document build failures, which are otherwise returned together.
    pub fn execute(&mut self) -> BoxFuture<'static, Result<()>> {
        let failures = if self.pending_len() == 0 {
            Vec::new()
        } else {
            self.process_pending()
        };
        self.state = WritePlanState::Executing;

        let built = std::mem::take(&mut self.built);
        let mut writes: Vec<BoxFuture<'static, Result<()>>> = Vec::with_capacity(built.len());
        for (index, works) in built {
            let Some(manager) = self.registry.index_manager(&index) else {
                writes.push(
                    future::ready(Err(SpathaError::mapping(format!(
                        "No index manager registered for index '{index}'"
                    ))))
                    .boxed(),
                );
                continue;
            };
            debug!(plan = %self.id, index = %index, works = works.len(), "executing index work plan");
            let mut plan = manager.create_work_plan();
            for work in works {
                plan.push(work);
            }
            writes.push(plan.execute());
        }
        self.state = WritePlanState::Empty;

        let plan_id = self.id;
        async move {
            let results = future::join_all(writes).await;
            let write_error = results.into_iter().find_map(|r| r.err());
            match write_error {
                Some(e) => {
                    if !failures.is_empty() {
                        let count = failures.len();
                        let hidden = SpathaError::DocumentBuildFailures(failures);
                        error!(
                            plan = %plan_id,
                            failures = count,
                            "document build failures hidden by a write error: {hidden}"
                        );
                    }
                    Err(e)
                }
                None if failures.is_empty() => Ok(()),
                None => Err(SpathaError::DocumentBuildFailures(failures)),
            }
        }
        .boxed()
    }

    /// Drop pending operations and built documents.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.positions.clear();
        self.embedded_changes.clear();
        self.built.clear();
        self.state = WritePlanState::Empty;
    }
}

fn build_work(registry: &MappingRegistry, entry: &PendingEntry) -> Built {
    let Some(index) = entry.mapping.index() else {
        return Built::Failed(DocumentBuildFailure {
            entity_type: entry.key.entity_type.clone(),
            entity_id: entry.key.id.to_string(),
            index: String::new(),
            cause: Box::new(SpathaError::NotIndexed {
                entity_type: entry.key.entity_type.clone(),
            }),
        });
    };
    let id = entry.key.id.to_document_id();
    let entity = match &entry.work {
        PendingWork::Delete | PendingWork::Purge => {
            return Built::Work(index.to_string(), DocumentWork::Delete { id });
        }
        PendingWork::Add(entity) | PendingWork::Update(entity) => entity,
    };
    let document = registry
        .build_document(&entry.mapping, entity.as_ref())
        .and_then(|document| match registry.index_manager(index) {
            Some(manager) => manager.schema().validate_document(&document).map(|_| document),
            None => Ok(document),
        });
    match document {
        Ok(document) => Built::Work(
            index.to_string(),
            match entry.work {
                PendingWork::Add(_) => DocumentWork::Add { id, document },
                _ => DocumentWork::Update { id, document },
            },
        ),
        Err(cause) => {
            warn!(entity_type = %entry.key.entity_type, id = %id, error = %cause, "failed to build document");
            Built::Failed(DocumentBuildFailure {
                entity_type: entry.key.entity_type.clone(),
                entity_id: id,
                index: index.to_string(),
                cause: Box::new(cause),
            })
        }
    }
}
