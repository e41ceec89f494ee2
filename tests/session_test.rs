use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use spatha::backend::local::LocalBackend;
use spatha::config::{IndexingConfig, LocalBackendConfig, SpathaConfig};
use spatha::document::FieldValue;
use spatha::error::Result;
use spatha::mapping::{EntityId, MappingRegistry};
use spatha::schema::{IndexField, IndexSchema};
use spatha::session::{EntityLoadingResult, EntityStore, SearchSessionFactory};

struct Book {
    id: i64,
    title: String,
}

/// In-memory persistence layer.
#[derive(Debug, Default)]
struct BookStore {
    books: RwLock<AHashMap<i64, Arc<Book>>>,
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Book#{}", self.id)
    }
}

impl BookStore {
    fn save(&self, book: Book) -> Arc<Book> {
        let book = Arc::new(book);
        self.books.write().insert(book.id, Arc::clone(&book));
        book
    }
}

impl EntityStore for BookStore {
    fn load_by_ids(
        &self,
        entity_type: &str,
        ids: &[EntityId],
        _fetch_size: usize,
    ) -> Result<Vec<EntityLoadingResult>> {
        assert_eq!(entity_type, "Book");
        let books = self.books.read();
        Ok(ids
            .iter()
            .filter_map(|id| match id {
                EntityId::Long(n) => books
                    .get(n)
                    .map(|book| EntityLoadingResult::new(*n, Arc::clone(book))),
                EntityId::Text(_) => None,
            })
            .collect())
    }
}

#[test]
fn test_index_search_and_load() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let backend = Arc::new(LocalBackend::new(LocalBackendConfig::default()));
    let index = backend.create_index(
        IndexSchema::builder("books")
            .field(IndexField::text("title"))
            .build()?,
    )?;
    let registry = MappingRegistry::builder()
        .entity::<Book, _>("Book", |m| {
            m.indexed("books")
                .document_id(|b: &Book| b.id)
                .field("title", |b: &Book| Some(FieldValue::from(b.title.as_str())))
        })
        .index_manager(index)
        .build()?;

    let store = Arc::new(BookStore::default());
    let config = SpathaConfig::default().with_indexing(
        IndexingConfig::default()
            .with_parallel_document_building(true)
            .with_parallel_threshold(1)
            .with_document_building_threads(2),
    );
    let factory = SearchSessionFactory::new(Arc::new(registry), store.clone(), config)?;

    let mut session = factory.open_session();
    session.begin_transaction();
    for (id, title) in [(1, "Dune"), (2, "Dune Messiah"), (3, "The Jesus Incident")] {
        let book = store.save(Book {
            id,
            title: title.to_string(),
        });
        session.on_entity_inserted(book)?;
    }
    session.on_flush()?;
    tokio_test::block_on(session.on_commit())?;

    // A book removed from the store after indexing loads as None.
    store.books.write().remove(&2);

    let scope = session.scope(Arc::clone(&backend), &["Book"])?;
    let predicate = scope
        .predicate()
        .simple_query_string()
        .on_field("title")
        .matching("dune")?;
    let result = scope.query().predicate(predicate).build().fetch(10, 0)?;
    assert_eq!(result.total_hit_count, 2);

    let entities = session.load_hits(&result)?;
    assert_eq!(entities.len(), 2);
    let loaded: Vec<Option<i64>> = entities
        .into_iter()
        .map(|entity| entity.and_then(|e| e.downcast::<Book>().ok()).map(|b| b.id))
        .collect();
    let expected: Vec<Option<i64>> = result
        .ids()
        .iter()
        .map(|id| if id == "2" { None } else { Some(1) })
        .collect();
    assert_eq!(loaded, expected);
    Ok(())
}

#[test]
fn test_scope_rejects_unindexed_type() -> Result<()> {
    let backend = Arc::new(LocalBackend::new(LocalBackendConfig::default()));
    let index = backend.create_index(IndexSchema::builder("books").field(IndexField::text("title")).build()?)?;
    let registry = MappingRegistry::builder()
        .entity::<Book, _>("Book", |m| m.indexed("books").document_id(|b: &Book| b.id))
        .index_manager(index)
        .build()?;
    let factory = SearchSessionFactory::new(
        Arc::new(registry),
        Arc::new(BookStore::default()),
        SpathaConfig::default(),
    )?;

    let session = factory.open_session();
    assert!(session.scope(backend, &["Author"]).is_err());
    Ok(())
}
