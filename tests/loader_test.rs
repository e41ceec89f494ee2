use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use spatha::backend::local::LocalBackend;
use spatha::config::LocalBackendConfig;
use spatha::document::DocumentReference;
use spatha::error::Result;
use spatha::mapping::{EntityId, MappingRegistry};
use spatha::schema::{IndexField, IndexSchema};
use spatha::session::{EntityLoader, EntityLoadingResult, EntityStore};

#[derive(Debug)]
struct Book {
    id: i64,
}

#[derive(Debug)]
struct Author {
    login: String,
}

/// Store holding books with ids below `limit` and every author; records lookups.
#[derive(Debug)]
struct Library {
    limit: i64,
    lookups: Mutex<Vec<(String, usize, usize)>>,
}

impl Library {
    fn new(limit: i64) -> Self {
        Library {
            limit,
            lookups: Mutex::new(Vec::new()),
        }
    }
}

impl EntityStore for Library {
    fn load_by_ids(
        &self,
        entity_type: &str,
        ids: &[EntityId],
        fetch_size: usize,
    ) -> Result<Vec<EntityLoadingResult>> {
        self.lookups
            .lock()
            .push((entity_type.to_string(), ids.len(), fetch_size));
        let mut results = Vec::new();
        for id in ids.iter().rev() {
            match (entity_type, id) {
                ("Book", EntityId::Long(n)) if *n < self.limit => {
                    results.push(EntityLoadingResult::new(*n, Arc::new(Book { id: *n })));
                }
                ("Author", EntityId::Text(login)) => {
                    results.push(EntityLoadingResult::new(
                        login.clone(),
                        Arc::new(Author {
                            login: login.clone(),
                        }),
                    ));
                }
                _ => {}
            }
        }
        Ok(results)
    }
}

fn registry() -> Result<MappingRegistry> {
    let backend = LocalBackend::new(LocalBackendConfig::default());
    let books = backend.create_index(IndexSchema::builder("books").field(IndexField::integer("id")).build()?)?;
    let authors =
        backend.create_index(IndexSchema::builder("authors").field(IndexField::keyword("login")).build()?)?;
    MappingRegistry::builder()
        .entity::<Book, _>("Book", |m| m.indexed("books").document_id(|b: &Book| b.id))
        .entity::<Author, _>("Author", |m| {
            m.indexed("authors").document_id(|a: &Author| a.login.clone())
        })
        .index_manager(books)
        .index_manager(authors)
        .build()
}

#[test]
fn test_one_lookup_per_entity_type() -> Result<()> {
    let registry = registry()?;
    let store = Library::new(100);
    let loader = EntityLoader::new(&registry, &store, 25);

    let references = vec![
        DocumentReference::new("books", "1"),
        DocumentReference::new("authors", "frank"),
        DocumentReference::new("books", "2"),
        DocumentReference::new("books", "1"),
        DocumentReference::new("authors", "brian"),
    ];
    let entities = loader.load_blocking(&references)?;
    assert_eq!(entities.len(), 5);

    let author = entities[1].clone().unwrap().downcast::<Author>().unwrap();
    assert_eq!(author.login, "frank");

    let lookups = store.lookups.lock();
    assert_eq!(
        *lookups,
        vec![
            ("Book".to_string(), 2, 25),
            ("Author".to_string(), 2, 25)
        ]
    );
    Ok(())
}

#[test]
fn test_empty_references() -> Result<()> {
    let registry = registry()?;
    let store = Library::new(100);
    let loader = EntityLoader::new(&registry, &store, 25);

    assert!(loader.load_blocking(&[])?.is_empty());
    assert!(store.lookups.lock().is_empty());
    Ok(())
}

proptest! {
    #[test]
    fn prop_loader_preserves_length_order_and_identity(ids in prop::collection::vec(0_i64..40, 0..30)) {
        let registry = registry().unwrap();
        let store = Library::new(20);
        let loader = EntityLoader::new(&registry, &store, 8);

        let references: Vec<DocumentReference> = ids
            .iter()
            .map(|id| DocumentReference::new("books", id.to_string()))
            .collect();
        let entities = loader.load_as::<Book>(&references).unwrap();

        prop_assert_eq!(entities.len(), ids.len());
        for (id, entity) in ids.iter().zip(&entities) {
            match entity {
                Some(book) => prop_assert_eq!(book.id, *id),
                None => prop_assert!(*id >= 20),
            }
        }
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if let (Some(a), Some(b)) = (&entities[i], &entities[j]) {
                    prop_assert_eq!(ids[i] == ids[j], Arc::ptr_eq(a, b));
                }
            }
        }

        let distinct: BTreeSet<_> = ids.iter().collect();
        let lookups = store.lookups.lock();
        if ids.is_empty() {
            prop_assert!(lookups.is_empty());
        } else {
            prop_assert_eq!(lookups.len(), 1);
            prop_assert_eq!(lookups[0].1, distinct.len());
        }
    }
}
