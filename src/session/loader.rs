//! Loading of entities from document references.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::document::reference::DocumentReference;
use crate::error::{Result, SpathaError};
use crate::mapping::entity::{EntityId, EntityRef};
use crate::mapping::registry::MappingRegistry;

/// One entity returned by an [`EntityStore`] lookup.
#[derive(Clone)]
pub struct EntityLoadingResult {
    /// The id the entity was looked up by.
    pub document_id_source_value: EntityId,
    pub entity: EntityRef,
}

impl EntityLoadingResult {
    pub fn new<T: Any + Send + Sync>(id: impl Into<EntityId>, entity: Arc<T>) -> Self {
        EntityLoadingResult {
            document_id_source_value: id.into(),
            entity,
        }
    }
}

/// Source of entities, typically a persistence layer.
pub trait EntityStore: Send + Sync + Debug {
    /// Look up entities of `entity_type` by id, in batches of `fetch_size`.
    ///
    /// Entities that do not exist are left out of the result; order does not
    /// matter.
    fn load_by_ids(
        &self,
        entity_type: &str,
        ids: &[EntityId],
        fetch_size: usize,
    ) -> Result<Vec<EntityLoadingResult>>;
}

/// Turns search hits back into entities.
#[derive(Debug)]
pub struct EntityLoader<'a> {
    registry: &'a MappingRegistry,
    store: &'a dyn EntityStore,
    fetch_size: usize,
}

impl<'a> EntityLoader<'a> {
    pub fn new(registry: &'a MappingRegistry, store: &'a dyn EntityStore, fetch_size: usize) -> Self {
        EntityLoader {
            registry,
            store,
            fetch_size: fetch_size.max(1),
        }
    }

    /// Load the entities referenced by `references`.
    ///
    /// The result has one slot per reference, in the same order. References
    /// to the same document share the same entity instance; entities that no
    /// longer exist yield `None`. Each entity type is looked up once.
    pub fn load_blocking(&self, references: &[DocumentReference]) -> Result<Vec<Option<EntityRef>>> {
        let mut keys = Vec::with_capacity(references.len());
        let mut ids_per_type: Vec<(&str, Vec<EntityId>, AHashSet<EntityId>)> = Vec::new();

        for reference in references {
            let mapping = self
                .registry
                .type_for_index(reference.index_name())
                .ok_or_else(|| {
                    SpathaError::mapping(format!(
                        "No entity type is indexed in '{}'",
                        reference.index_name()
                    ))
                })?;
            let kind = mapping.id_kind().ok_or_else(|| {
                SpathaError::mapping(format!(
                    "Entity type '{}' has no document id",
                    mapping.name()
                ))
            })?;
            let id = EntityId::parse(kind, reference.id())?;

            let slot = match ids_per_type.iter().position(|(name, ..)| *name == mapping.name()) {
                Some(slot) => slot,
                None => {
                    ids_per_type.push((mapping.name(), Vec::new(), AHashSet::new()));
                    ids_per_type.len() - 1
                }
            };
            let (_, ids, seen) = &mut ids_per_type[slot];
            if seen.insert(id.clone()) {
                ids.push(id.clone());
            }
            keys.push((slot, id));
        }

        let mut loaded: Vec<AHashMap<EntityId, EntityRef>> = Vec::with_capacity(ids_per_type.len());
        for (entity_type, ids, _) in &ids_per_type {
            let results = self.store.load_by_ids(entity_type, ids, self.fetch_size)?;
            debug!(
                entity_type = %entity_type,
                requested = ids.len(),
                found = results.len(),
                "loaded entities"
            );
            loaded.push(
                results
                    .into_iter()
                    .map(|result| (result.document_id_source_value, result.entity))
                    .collect(),
            );
        }

        Ok(keys
            .into_iter()
            .map(|(slot, id)| {
                let entity = loaded[slot].get(&id).cloned();
                if entity.is_none() {
                    debug!(entity_type = %ids_per_type[slot].0, id = %id, "referenced entity no longer exists");
                }
                entity
            })
            .collect())
    }

    /// Like [`EntityLoader::load_blocking`], downcasting every entity to `T`.
    pub fn load_as<T: Any + Send + Sync>(
        &self,
        references: &[DocumentReference],
    ) -> Result<Vec<Option<Arc<T>>>> {
        self.load_blocking(references)?
            .into_iter()
            .map(|entity| {
                entity
                    .map(|entity| {
                        entity.downcast::<T>().map_err(|_| {
                            SpathaError::mapping(format!(
                                "Loaded entity is not a {}",
                                std::any::type_name::<T>()
                            ))
                        })
                    })
                    .transpose()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::backend::local::LocalBackend;
    use crate::config::LocalBackendConfig;
    use crate::schema::{IndexField, IndexSchema};

    struct Book {
        id: i64,
    }

    #[derive(Debug, Default)]
    struct Books {
        calls: Mutex<Vec<Vec<EntityId>>>,
    }

    impl EntityStore for Books {
        fn load_by_ids(
            &self,
            entity_type: &str,
            ids: &[EntityId],
            _fetch_size: usize,
        ) -> Result<Vec<EntityLoadingResult>> {
            assert_eq!(entity_type, "Book");
            self.calls.lock().push(ids.to_vec());
            Ok(ids
                .iter()
                .filter_map(|id| match id {
                    EntityId::Long(n) if *n < 100 => Some(EntityLoadingResult::new(*n, Arc::new(Book { id: *n }))),
                    _ => None,
                })
                .collect())
        }
    }

    fn registry() -> MappingRegistry {
        let backend = LocalBackend::new(LocalBackendConfig::default());
        let index = backend
            .create_index(IndexSchema::builder("books").field(IndexField::integer("id")).build().unwrap())
            .unwrap();
        MappingRegistry::builder()
            .entity::<Book, _>("Book", |m| m.indexed("books").document_id(|b: &Book| b.id))
            .index_manager(index)
            .build()
            .unwrap()
    }

    #[test]
    fn test_load_keeps_order_and_identity() {
        let registry = registry();
        let store = Books::default();
        let loader = EntityLoader::new(&registry, &store, 10);
        let references = vec![
            DocumentReference::new("books", "2"),
            DocumentReference::new("books", "500"),
            DocumentReference::new("books", "1"),
            DocumentReference::new("books", "2"),
        ];

        let entities = loader.load_as::<Book>(&references).unwrap();
        assert_eq!(entities.len(), 4);
        assert_eq!(entities[0].as_ref().unwrap().id, 2);
        assert!(entities[1].is_none());
        assert_eq!(entities[2].as_ref().unwrap().id, 1);
        assert!(Arc::ptr_eq(entities[0].as_ref().unwrap(), entities[3].as_ref().unwrap()));

        let calls = store.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![EntityId::Long(2), EntityId::Long(500), EntityId::Long(1)]
        );
    }

    #[test]
    fn test_unknown_index() {
        let registry = registry();
        let store = Books::default();
        let loader = EntityLoader::new(&registry, &store, 10);
        assert!(loader.load_blocking(&[DocumentReference::new("authors", "1")]).is_err());
        assert!(loader.load_blocking(&[DocumentReference::new("books", "x")]).is_err());
    }
}
