//! Static mapping table: entity types, their contributions and index managers.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::backend::work::IndexManager;
use crate::document::document::{Document, DocumentElement};
use crate::document::field_value::FieldValue;
use crate::error::{Result, SpathaError};
use crate::mapping::contribution::{
    ContributorFn, MappingContribution, UpcastFn, embedded_fn, upcast_fn,
};
use crate::mapping::entity::{EntityId, EntityIdValue, EntityRef, IdKind};

/// Mapping of one entity type, with inherited contributions merged in.
#[derive(Debug)]
pub struct TypeMapping {
    name: String,
    type_id: TypeId,
    index: Option<String>,
    id_kind: Option<IdKind>,
    embedded: bool,
    contributions: Vec<MappingContribution>,
}

impl TypeMapping {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The index this type is directly indexed in.
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Whether an indexed type embeds this type, directly or transitively.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn id_kind(&self) -> Option<IdKind> {
        self.id_kind
    }

    pub fn contributions(&self) -> &[MappingContribution] {
        &self.contributions
    }

    /// The identifier of `entity`, read through the document id contribution.
    pub fn entity_id(&self, entity: &dyn Any) -> Option<EntityId> {
        self.contributions.iter().rev().find_map(|c| match c {
            MappingContribution::DocumentId { extract, .. } => extract(entity),
            _ => None,
        })
    }
}

/// Registry of every mapped entity type.
#[derive(Debug)]
pub struct MappingRegistry {
    types: BTreeMap<String, Arc<TypeMapping>>,
    type_names: AHashMap<TypeId, String>,
    index_types: AHashMap<String, String>,
    index_managers: AHashMap<String, Arc<dyn IndexManager>>,
}

impl MappingRegistry {
    pub fn builder() -> MappingRegistryBuilder {
        MappingRegistryBuilder::default()
    }

    pub fn type_mapping(&self, name: &str) -> Option<&Arc<TypeMapping>> {
        self.types.get(name)
    }

    /// The name under which a Rust type is mapped.
    pub fn type_name_of(&self, type_id: TypeId) -> Option<&str> {
        self.type_names.get(&type_id).map(String::as_str)
    }

    /// The type indexed in `index`.
    pub fn type_for_index(&self, index: &str) -> Option<&Arc<TypeMapping>> {
        self.index_types.get(index).and_then(|name| self.types.get(name))
    }

    pub fn index_manager(&self, index: &str) -> Option<&Arc<dyn IndexManager>> {
        self.index_managers.get(index)
    }

    pub fn index_managers(&self) -> impl Iterator<Item = &Arc<dyn IndexManager>> + '_ {
        self.index_managers.values()
    }

    pub fn is_indexed_or_embedded(&self, name: &str) -> bool {
        self.types
            .get(name)
            .is_some_and(|mapping| mapping.is_indexed() || mapping.is_embedded())
    }

    /// Entities that directly embed `entity`, with their type names.
    pub fn containing_entities(
        &self,
        mapping: &TypeMapping,
        entity: &dyn Any,
    ) -> Vec<(Arc<TypeMapping>, EntityRef)> {
        let mut containing = Vec::new();
        for contribution in &mapping.contributions {
            if let MappingContribution::ContainedIn { target, extract } = contribution {
                let Some(target) = self
                    .type_names
                    .get(target)
                    .and_then(|name| self.types.get(name))
                else {
                    continue;
                };
                for container in extract(entity) {
                    containing.push((Arc::clone(target), container));
                }
            }
        }
        containing
    }

    /// Build the document of an entity of type `mapping`.
    pub fn build_document(&self, mapping: &TypeMapping, entity: &dyn Any) -> Result<Document> {
        let mut document = Document::new();
        let mut element = DocumentElement::new(&mut document);
        self.contribute(mapping, entity, &mut element, None)?;
        Ok(document)
    }

    fn contribute(
        &self,
        mapping: &TypeMapping,
        entity: &dyn Any,
        element: &mut DocumentElement<'_>,
        levels_left: Option<usize>,
    ) -> Result<()> {
        for contribution in &mapping.contributions {
            match contribution {
                MappingContribution::Field { name, extract } => {
                    for value in extract(entity)? {
                        element.add_value(name, value);
                    }
                }
                MappingContribution::Contributor(contribute) => contribute(entity, element)?,
                MappingContribution::IndexedEmbedded {
                    name,
                    target,
                    max_depth,
                    extract,
                } => {
                    let allowed = levels_left.map_or(*max_depth, |left| left.min(*max_depth));
                    if allowed == 0 {
                        continue;
                    }
                    let Some(target) = self
                        .type_names
                        .get(target)
                        .and_then(|name| self.types.get(name))
                    else {
                        continue;
                    };
                    for embedded in extract(entity) {
                        let mut child = element.child(name);
                        self.contribute(target, embedded, &mut child, Some(allowed - 1))?;
                    }
                }
                MappingContribution::Indexed { .. }
                | MappingContribution::DocumentId { .. }
                | MappingContribution::ContainedIn { .. } => {}
            }
        }
        Ok(())
    }
}

struct TypeDeclaration {
    name: String,
    type_id: TypeId,
    parent: Option<(TypeId, UpcastFn)>,
    contributions: Vec<MappingContribution>,
}

/// Builder of [`MappingRegistry`].
#[derive(Default)]
pub struct MappingRegistryBuilder {
    declarations: Vec<TypeDeclaration>,
    index_managers: Vec<Arc<dyn IndexManager>>,
}

impl std::fmt::Debug for MappingRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingRegistryBuilder")
            .field(
                "types",
                &self.declarations.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MappingRegistryBuilder {
    /// Declare the mapping of entity type `T`.
    pub fn entity<T, F>(mut self, name: &str, declare: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(EntityMapping<T>) -> EntityMapping<T>,
    {
        let mapping = declare(EntityMapping {
            name: name.to_string(),
            parent: None,
            contributions: Vec::new(),
            _marker: PhantomData,
        });
        self.declarations.push(TypeDeclaration {
            name: mapping.name,
            type_id: TypeId::of::<T>(),
            parent: mapping.parent,
            contributions: mapping.contributions,
        });
        self
    }

    /// Register the manager of an index.
    pub fn index_manager(mut self, manager: Arc<dyn IndexManager>) -> Self {
        self.index_managers.push(manager);
        self
    }

    pub fn build(self) -> Result<MappingRegistry> {
        let mut type_names = AHashMap::new();
        let mut by_id: AHashMap<TypeId, &TypeDeclaration> = AHashMap::new();
        for declaration in &self.declarations {
            if type_names
                .insert(declaration.type_id, declaration.name.clone())
                .is_some()
                || type_names.values().filter(|n| **n == declaration.name).count() > 1
            {
                return Err(SpathaError::mapping(format!(
                    "Entity type '{}' is declared twice",
                    declaration.name
                )));
            }
            by_id.insert(declaration.type_id, declaration);
        }

        let mut merged: AHashMap<TypeId, Vec<MappingContribution>> = AHashMap::new();
        for declaration in &self.declarations {
            merge_contributions(declaration, &by_id, &mut merged, &mut Vec::new())?;
        }

        let mut index_managers = AHashMap::new();
        for manager in self.index_managers {
            index_managers.insert(manager.index_name().to_string(), manager);
        }

        let mut types = BTreeMap::new();
        let mut index_types = AHashMap::new();
        for declaration in &self.declarations {
            let contributions = merged.remove(&declaration.type_id).unwrap_or_default();
            for contribution in &contributions {
                let target = match contribution {
                    MappingContribution::IndexedEmbedded { target, .. }
                    | MappingContribution::ContainedIn { target, .. } => target,
                    _ => continue,
                };
                if !type_names.contains_key(target) {
                    return Err(SpathaError::mapping(format!(
                        "Entity type '{}' references a type that is not mapped",
                        declaration.name
                    )));
                }
            }
            let index = contributions.iter().rev().find_map(|c| match c {
                MappingContribution::Indexed { index } => Some(index.clone()),
                _ => None,
            });
            let id_kind = contributions.iter().rev().find_map(|c| match c {
                MappingContribution::DocumentId { kind, .. } => Some(*kind),
                _ => None,
            });
            if let Some(index) = &index {
                if id_kind.is_none() {
                    return Err(SpathaError::mapping(format!(
                        "Indexed entity type '{}' has no document id",
                        declaration.name
                    )));
                }
                if !index_managers.contains_key(index) {
                    return Err(SpathaError::mapping(format!(
                        "No index manager registered for index '{index}' of entity type '{}'",
                        declaration.name
                    )));
                }
                if let Some(other) = index_types.insert(index.clone(), declaration.name.clone()) {
                    return Err(SpathaError::mapping(format!(
                        "Index '{index}' is mapped by both '{other}' and '{}'",
                        declaration.name
                    )));
                }
            }
            types.insert(
                declaration.name.clone(),
                TypeMapping {
                    name: declaration.name.clone(),
                    type_id: declaration.type_id,
                    index,
                    id_kind,
                    embedded: false,
                    contributions,
                },
            );
        }

        mark_embedded(&mut types, &type_names);
        debug!(types = types.len(), indexes = index_types.len(), "built mapping registry");
        Ok(MappingRegistry {
            types: types
                .into_iter()
                .map(|(name, mapping)| (name, Arc::new(mapping)))
                .collect(),
            type_names,
            index_types,
            index_managers,
        })
    }
}

/// Merge the inherited contributions of a type, supertypes first.
fn merge_contributions(
    declaration: &TypeDeclaration,
    by_id: &AHashMap<TypeId, &TypeDeclaration>,
    merged: &mut AHashMap<TypeId, Vec<MappingContribution>>,
    visiting: &mut Vec<TypeId>,
) -> Result<Vec<MappingContribution>> {
    if let Some(done) = merged.get(&declaration.type_id) {
        return Ok(done.clone());
    }
    if visiting.contains(&declaration.type_id) {
        return Err(SpathaError::mapping(format!(
            "Cyclic supertype declaration involving '{}'",
            declaration.name
        )));
    }
    visiting.push(declaration.type_id);

    let mut contributions = Vec::new();
    if let Some((parent_id, upcast)) = &declaration.parent {
        let parent = by_id.get(parent_id).ok_or_else(|| {
            SpathaError::mapping(format!(
                "Supertype of entity type '{}' is not mapped",
                declaration.name
            ))
        })?;
        let inherited = merge_contributions(parent, by_id, merged, visiting)?;
        contributions.extend(
            inherited
                .iter()
                .filter(|c| c.is_inherited())
                .map(|c| c.upcast(upcast)),
        );
    }
    contributions.extend(declaration.contributions.iter().cloned());

    visiting.pop();
    merged.insert(declaration.type_id, contributions.clone());
    Ok(contributions)
}

/// Flag every type reachable through embeddings from an indexed type.
fn mark_embedded(types: &mut BTreeMap<String, TypeMapping>, type_names: &AHashMap<TypeId, String>) {
    let mut embedded: AHashSet<String> = AHashSet::new();
    let mut queue: Vec<String> = types
        .values()
        .filter(|m| m.is_indexed())
        .map(|m| m.name.clone())
        .collect();
    let mut seen: AHashSet<String> = queue.iter().cloned().collect();
    while let Some(name) = queue.pop() {
        let Some(mapping) = types.get(&name) else {
            continue;
        };
        for contribution in &mapping.contributions {
            if let MappingContribution::IndexedEmbedded { target, .. } = contribution {
                if let Some(target) = type_names.get(target) {
                    embedded.insert(target.clone());
                    if seen.insert(target.clone()) {
                        queue.push(target.clone());
                    }
                }
            }
        }
    }
    for name in embedded {
        if let Some(mapping) = types.get_mut(&name) {
            mapping.embedded = true;
        }
    }
}

/// Typed declaration of the mapping of entity type `T`.
pub struct EntityMapping<T> {
    name: String,
    parent: Option<(TypeId, UpcastFn)>,
    contributions: Vec<MappingContribution>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Any + Send + Sync> EntityMapping<T> {
    /// Index entities of this type in `index`.
    pub fn indexed(mut self, index: &str) -> Self {
        self.contributions.push(MappingContribution::Indexed {
            index: index.to_string(),
        });
        self
    }

    /// Use a property as the document id.
    pub fn document_id<I, F>(mut self, extract: F) -> Self
    where
        I: EntityIdValue,
        F: Fn(&T) -> I + Send + Sync + 'static,
    {
        self.contributions.push(MappingContribution::DocumentId {
            kind: I::KIND,
            extract: Arc::new(move |entity: &dyn Any| {
                entity.downcast_ref::<T>().map(|e| extract(e).into())
            }),
        });
        self
    }

    /// Map an optional property to a field.
    pub fn field<F>(mut self, name: &str, extract: F) -> Self
    where
        F: Fn(&T) -> Option<FieldValue> + Send + Sync + 'static,
    {
        self.contributions.push(MappingContribution::Field {
            name: name.to_string(),
            extract: Arc::new(move |entity: &dyn Any| {
                Ok(entity
                    .downcast_ref::<T>()
                    .and_then(|e| extract(e))
                    .into_iter()
                    .collect())
            }),
        });
        self
    }

    /// Map a multi-valued property to a field; extraction may fail.
    pub fn try_field<F>(mut self, name: &str, extract: F) -> Self
    where
        F: Fn(&T) -> Result<Vec<FieldValue>> + Send + Sync + 'static,
    {
        self.contributions.push(MappingContribution::Field {
            name: name.to_string(),
            extract: Arc::new(move |entity: &dyn Any| match entity.downcast_ref::<T>() {
                Some(e) => extract(e),
                None => Ok(Vec::new()),
            }),
        });
        self
    }

    /// Add a free-form document contributor.
    pub fn contributor<F>(mut self, contribute: F) -> Self
    where
        F: Fn(&T, &mut DocumentElement<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let contribute: ContributorFn = Arc::new(
            move |entity: &dyn Any, element: &mut DocumentElement<'_>| match entity
                .downcast_ref::<T>()
            {
                Some(e) => contribute(e, element),
                None => Ok(()),
            },
        );
        self.contributions.push(MappingContribution::Contributor(contribute));
        self
    }

    /// Copy the fields of associated `U` entities under the `name` prefix.
    pub fn indexed_embedded<U, F>(mut self, name: &str, max_depth: usize, extract: F) -> Self
    where
        U: Any + Send + Sync,
        F: for<'a> Fn(&'a T) -> Vec<&'a U> + Send + Sync + 'static,
    {
        self.contributions.push(MappingContribution::IndexedEmbedded {
            name: name.to_string(),
            target: TypeId::of::<U>(),
            max_depth,
            extract: embedded_fn(move |entity| match entity.downcast_ref::<T>() {
                Some(e) => extract(e).into_iter().map(|u| u as &dyn Any).collect(),
                None => Vec::new(),
            }),
        });
        self
    }

    /// Declare the `U` entities embedding this one, reindexed when it changes.
    pub fn contained_in<U, F>(mut self, extract: F) -> Self
    where
        U: Any + Send + Sync,
        F: Fn(&T) -> Vec<Arc<U>> + Send + Sync + 'static,
    {
        self.contributions.push(MappingContribution::ContainedIn {
            target: TypeId::of::<U>(),
            extract: Arc::new(move |entity: &dyn Any| match entity.downcast_ref::<T>() {
                Some(e) => extract(e)
                    .into_iter()
                    .map(|u| u as EntityRef)
                    .collect(),
                None => Vec::new(),
            }),
        });
        self
    }

    /// Inherit the mapping of supertype `P`, reached through `upcast`.
    pub fn extends<P, F>(mut self, upcast: F) -> Self
    where
        P: Any + Send + Sync,
        F: for<'a> Fn(&'a T) -> &'a P + Send + Sync + 'static,
    {
        self.parent = Some((
            TypeId::of::<P>(),
            upcast_fn(move |entity| entity.downcast_ref::<T>().map(|e| upcast(e) as &dyn Any)),
        ));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::work::IndexWorkPlan;
    use crate::schema::schema::IndexSchema;

    #[derive(Debug)]
    struct StubIndex {
        schema: Arc<IndexSchema>,
    }

    impl IndexManager for StubIndex {
        fn index_name(&self) -> &str {
            self.schema.index_name()
        }

        fn schema(&self) -> &Arc<IndexSchema> {
            &self.schema
        }

        fn create_work_plan(&self) -> Box<dyn IndexWorkPlan> {
            unimplemented!("not used by mapping tests")
        }
    }

    fn manager(index: &str) -> Arc<dyn IndexManager> {
        Arc::new(StubIndex {
            schema: Arc::new(IndexSchema::builder(index).build().unwrap()),
        })
    }

    struct Named {
        name: String,
    }

    struct Author {
        named: Named,
        books: Vec<Arc<Book>>,
    }

    struct Book {
        id: i64,
        title: String,
        authors: Vec<Author>,
    }

    fn registry() -> MappingRegistry {
        MappingRegistry::builder()
            .entity::<Named, _>("Named", |m| {
                m.field("name", |n: &Named| Some(FieldValue::from(n.name.as_str())))
            })
            .entity::<Author, _>("Author", |m| {
                m.extends::<Named, _>(|a: &Author| &a.named)
                    .contained_in::<Book, _>(|a: &Author| a.books.clone())
            })
            .entity::<Book, _>("Book", |m| {
                m.indexed("books")
                    .document_id(|b: &Book| b.id)
                    .field("title", |b: &Book| Some(FieldValue::from(b.title.as_str())))
                    .indexed_embedded::<Author, _>("authors", 1, |b: &Book| {
                        b.authors.iter().collect()
                    })
            })
            .index_manager(manager("books"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_embedded_and_inherited_fields() {
        let registry = registry();
        let book = Book {
            id: 1,
            title: "Dune".to_string(),
            authors: vec![Author {
                named: Named {
                    name: "Herbert".to_string(),
                },
                books: Vec::new(),
            }],
        };
        let mapping = registry.type_mapping("Book").unwrap();
        let document = registry.build_document(mapping, &book).unwrap();
        assert_eq!(document.first("title"), Some(&FieldValue::from("Dune")));
        assert_eq!(document.first("authors.name"), Some(&FieldValue::from("Herbert")));
        assert_eq!(mapping.entity_id(&book), Some(EntityId::Long(1)));
    }

    #[test]
    fn test_indexed_or_embedded() {
        let registry = registry();
        assert!(registry.is_indexed_or_embedded("Book"));
        assert!(registry.is_indexed_or_embedded("Author"));
        assert!(!registry.is_indexed_or_embedded("Named"));
        assert_eq!(registry.type_for_index("books").unwrap().name(), "Book");
        assert_eq!(registry.type_name_of(TypeId::of::<Author>()), Some("Author"));
    }

    #[test]
    fn test_containing_entities() {
        let registry = registry();
        let book = Arc::new(Book {
            id: 3,
            title: "Dune".to_string(),
            authors: Vec::new(),
        });
        let author = Author {
            named: Named {
                name: "Herbert".to_string(),
            },
            books: vec![Arc::clone(&book)],
        };
        let mapping = registry.type_mapping("Author").unwrap();
        let containing = registry.containing_entities(mapping, &author);
        assert_eq!(containing.len(), 1);
        assert_eq!(containing[0].0.name(), "Book");
        assert!(containing[0].1.downcast_ref::<Book>().is_some());
    }

    #[test]
    fn test_missing_index_manager() {
        let err = MappingRegistry::builder()
            .entity::<Book, _>("Book", |m| m.indexed("books").document_id(|b: &Book| b.id))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("No index manager registered for index 'books'"));
    }
}
