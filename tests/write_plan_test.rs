use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use spatha::backend::local::{LocalBackend, LocalIndex};
use spatha::backend::work::{DocumentWork, IndexManager, IndexWorkPlan};
use spatha::config::{IndexingConfig, LocalBackendConfig};
use spatha::document::FieldValue;
use spatha::error::{Result, SpathaError};
use spatha::mapping::{EntityId, EntityKey, MappingRegistry};
use spatha::query::scope::SearchScope;
use spatha::schema::{IndexField, IndexSchema};
use spatha::session::{PendingWork, SearchWritePlan, WritePlanState};

struct Author {
    id: i64,
    name: RwLock<String>,
    books: RwLock<Vec<Arc<Book>>>,
}

struct Book {
    id: i64,
    title: String,
    authors: Vec<Arc<Author>>,
}

struct Unmapped;

struct Note {
    id: i64,
    text: String,
}

/// Index whose writes are always rejected.
#[derive(Debug)]
struct RejectingIndex {
    schema: Arc<IndexSchema>,
}

struct RejectingPlan {
    works: Vec<DocumentWork>,
}

impl IndexManager for RejectingIndex {
    fn index_name(&self) -> &str {
        self.schema.index_name()
    }

    fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    fn create_work_plan(&self) -> Box<dyn IndexWorkPlan> {
        Box::new(RejectingPlan { works: Vec::new() })
    }
}

impl IndexWorkPlan for RejectingPlan {
    fn push(&mut self, work: DocumentWork) {
        self.works.push(work);
    }

    fn len(&self) -> usize {
        self.works.len()
    }

    fn execute(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        futures::future::ready(Err(SpathaError::other("index is read-only"))).boxed()
    }
}

struct Fixture {
    backend: Arc<LocalBackend>,
    books: Arc<LocalIndex>,
    authors: Arc<LocalIndex>,
    registry: Arc<MappingRegistry>,
}

impl Fixture {
    fn new() -> Result<Self> {
        let backend = Arc::new(LocalBackend::new(LocalBackendConfig::default()));
        let books = backend.create_index(
            IndexSchema::builder("books")
                .field(IndexField::text("title"))
                .field(IndexField::text("authors.name"))
                .build()?,
        )?;
        let authors = backend.create_index(
            IndexSchema::builder("authors")
                .field(IndexField::text("name"))
                .build()?,
        )?;
        let registry = MappingRegistry::builder()
            .entity::<Author, _>("Author", |m| {
                m.indexed("authors")
                    .document_id(|a: &Author| a.id)
                    .field("name", |a: &Author| Some(FieldValue::from(a.name.read().as_str())))
                    .contained_in::<Book, _>(|a: &Author| a.books.read().clone())
            })
            .entity::<Book, _>("Book", |m| {
                m.indexed("books")
                    .document_id(|b: &Book| b.id)
                    .try_field("title", |b: &Book| {
                        if b.title == "boom" {
                            Err(SpathaError::other("cannot read title"))
                        } else {
                            Ok(vec![FieldValue::from(b.title.as_str())])
                        }
                    })
                    .indexed_embedded::<Author, _>("authors", 1, |b: &Book| {
                        b.authors.iter().map(|a| &**a).collect()
                    })
            })
            .index_manager(books.clone())
            .index_manager(authors.clone())
            .build()?;
        Ok(Fixture {
            backend,
            books,
            authors,
            registry: Arc::new(registry),
        })
    }

    fn plan(&self) -> SearchWritePlan {
        SearchWritePlan::new(Arc::clone(&self.registry), IndexingConfig::default())
    }
}

fn author(id: i64, name: &str) -> Arc<Author> {
    Arc::new(Author {
        id,
        name: RwLock::new(name.to_string()),
        books: RwLock::new(Vec::new()),
    })
}

fn book(id: i64, title: &str, authors: &[&Arc<Author>]) -> Arc<Book> {
    let book = Arc::new(Book {
        id,
        title: title.to_string(),
        authors: authors.iter().map(|a| Arc::clone(a)).collect(),
    });
    for author in authors {
        author.books.write().push(Arc::clone(&book));
    }
    book
}

fn key(entity_type: &str, id: i64) -> EntityKey {
    EntityKey::new(entity_type, EntityId::Long(id))
}

/// (document id, work kind) of the writes built for an index.
fn built(plan: &SearchWritePlan, index: &str) -> Vec<(String, &'static str)> {
    plan.built()
        .get(index)
        .map(|works| works.iter().map(|w| (w.id().to_string(), w.kind())).collect())
        .unwrap_or_default()
}

fn works(items: &[(&str, &'static str)]) -> Vec<(String, &'static str)> {
    items.iter().map(|(id, kind)| (id.to_string(), *kind)).collect()
}

#[test]
fn test_add_then_delete_leaves_single_delete() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut plan = fixture.plan();
    let dune = book(1, "Dune", &[]);

    plan.add(Arc::clone(&dune))?;
    plan.delete(dune)?;

    assert_eq!(plan.pending_len(), 1);
    assert!(matches!(plan.pending_work(&key("Book", 1)), Some(PendingWork::Delete)));
    Ok(())
}

#[test]
fn test_delete_then_add_becomes_update() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut plan = fixture.plan();
    let dune = book(1, "Dune", &[]);

    plan.delete(Arc::clone(&dune))?;
    plan.add(dune)?;

    assert!(matches!(plan.pending_work(&key("Book", 1)), Some(PendingWork::Update(_))));
    Ok(())
}

#[test]
fn test_change_cascades_to_embedding_entities() -> Result<()> {
    let fixture = Fixture::new()?;
    let frank = author(7, "Frank Herbert");
    let dune = book(1, "Dune", &[&frank]);

    let mut plan = fixture.plan();
    plan.add(Arc::clone(&dune))?;
    plan.add(Arc::clone(&frank))?;
    tokio_test::block_on(plan.execute())?;

    *frank.name.write() = "Brian Herbert".to_string();
    plan.add_or_update(Arc::clone(&frank))?;
    assert!(matches!(plan.pending_work(&key("Author", 7)), Some(PendingWork::Update(_))));
    plan.process()?;
    assert_eq!(built(&plan, "books"), works(&[("1", "update")]));
    assert_eq!(built(&plan, "authors"), works(&[("7", "update")]));
    tokio_test::block_on(plan.execute())?;

    let scope = SearchScope::new(Arc::clone(&fixture.backend), &["books"])?;
    let predicate = scope
        .predicate()
        .match_()
        .on_field("authors.name")
        .matching("brian")?;
    let result = scope.query().predicate(predicate).build().fetch(10, 0)?;
    assert_eq!(result.ids(), vec!["1".to_string()]);
    Ok(())
}

#[test]
fn test_cascade_does_not_override_delete() -> Result<()> {
    let fixture = Fixture::new()?;
    let frank = author(7, "Frank Herbert");
    let dune = book(1, "Dune", &[&frank]);

    let mut plan = fixture.plan();
    plan.delete(dune)?;
    plan.add_or_update(frank)?;
    plan.process()?;

    assert_eq!(built(&plan, "books"), works(&[("1", "delete")]));
    Ok(())
}

#[test]
fn test_purge_does_not_cascade() -> Result<()> {
    let fixture = Fixture::new()?;
    let frank = author(7, "Frank Herbert");
    let _dune = book(1, "Dune", &[&frank]);

    let mut plan = fixture.plan();
    plan.purge::<Author, _>(7_i64)?;

    assert_eq!(plan.pending_len(), 1);
    assert!(matches!(plan.pending_work(&key("Author", 7)), Some(PendingWork::Purge)));
    assert!(plan.pending_work(&key("Book", 1)).is_none());

    plan.delete(frank)?;
    plan.process()?;
    assert_eq!(built(&plan, "books"), works(&[("1", "update")]));
    assert_eq!(built(&plan, "authors"), works(&[("7", "delete")]));
    Ok(())
}

#[test]
fn test_trailing_purge_cancels_cascade() -> Result<()> {
    let fixture = Fixture::new()?;
    let frank = author(7, "Frank Herbert");
    let _dune = book(1, "Dune", &[&frank]);

    let mut plan = fixture.plan();
    plan.add_or_update(Arc::clone(&frank))?;
    plan.purge::<Author, _>(7_i64)?;

    assert!(matches!(plan.pending_work(&key("Author", 7)), Some(PendingWork::Purge)));
    assert!(plan.pending_work(&key("Book", 1)).is_none());
    plan.process()?;
    assert!(built(&plan, "books").is_empty());
    assert_eq!(built(&plan, "authors"), works(&[("7", "delete")]));

    // A change recorded after the purge cascades again.
    let mut plan = fixture.plan();
    plan.purge::<Author, _>(7_i64)?;
    plan.add_or_update(frank)?;
    plan.process()?;
    assert_eq!(built(&plan, "books"), works(&[("1", "update")]));
    Ok(())
}

#[test]
fn test_process_is_idempotent() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut plan = fixture.plan();
    assert_eq!(plan.state(), WritePlanState::Empty);

    plan.add(book(1, "Dune", &[]))?;
    assert_eq!(plan.state(), WritePlanState::Accumulating);

    plan.process()?;
    assert_eq!(plan.state(), WritePlanState::Processed);
    assert_eq!(plan.built_len(), 1);

    plan.process()?;
    assert_eq!(plan.built_len(), 1);
    assert_eq!(plan.pending_len(), 0);

    tokio_test::block_on(plan.execute())?;
    assert_eq!(plan.state(), WritePlanState::Empty);
    assert_eq!(fixture.books.document_count(), 1);
    Ok(())
}

#[test]
fn test_build_failures_are_isolated() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut plan = fixture.plan();
    plan.add(book(1, "Dune", &[]))?;
    plan.add(book(2, "boom", &[]))?;
    plan.add(book(3, "Children of Dune", &[]))?;

    match plan.process() {
        Err(SpathaError::DocumentBuildFailures(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].entity_type, "Book");
            assert_eq!(failures[0].entity_id, "2");
            assert_eq!(failures[0].index, "books");
        }
        other => panic!("expected build failures, got {other:?}"),
    }
    assert_eq!(plan.built_len(), 2);

    tokio_test::block_on(plan.execute())?;
    assert!(fixture.books.contains("1"));
    assert!(!fixture.books.contains("2"));
    assert!(fixture.books.contains("3"));
    Ok(())
}

#[test]
fn test_execute_reports_build_failures_after_writes() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut plan = fixture.plan();
    plan.add(book(1, "Dune", &[]))?;
    plan.add(book(2, "boom", &[]))?;

    let outcome = tokio_test::block_on(plan.execute());
    assert!(matches!(outcome, Err(SpathaError::DocumentBuildFailures(ref f)) if f.len() == 1));
    assert!(fixture.books.contains("1"));
    Ok(())
}

#[test]
fn test_unmapped_type_is_not_indexed() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut plan = fixture.plan();

    let err = plan.add(Arc::new(Unmapped)).unwrap_err();
    assert!(matches!(err, SpathaError::NotIndexed { .. }));
    assert!(plan.purge::<Unmapped, _>(1_i64).is_err());
    assert_eq!(plan.state(), WritePlanState::Empty);
    Ok(())
}

#[test]
fn test_parallel_building_matches_sequential() -> Result<()> {
    let fixture = Fixture::new()?;
    let config = IndexingConfig::default()
        .with_parallel_document_building(true)
        .with_parallel_threshold(2);
    let mut plan = SearchWritePlan::new(Arc::clone(&fixture.registry), config);
    for id in 0..16 {
        plan.add(book(id, &format!("volume {id}"), &[]))?;
    }
    plan.add(author(100, "Frank Herbert"))?;

    tokio_test::block_on(plan.execute())?;
    assert_eq!(fixture.books.document_count(), 16);
    assert_eq!(fixture.authors.document_count(), 1);
    Ok(())
}

#[test]
fn test_write_error_takes_precedence_over_build_failures() -> Result<()> {
    let index = Arc::new(RejectingIndex {
        schema: Arc::new(IndexSchema::builder("notes").field(IndexField::text("text")).build()?),
    });
    let registry = MappingRegistry::builder()
        .entity::<Note, _>("Note", |m| {
            m.indexed("notes")
                .document_id(|n: &Note| n.id)
                .try_field("text", |n: &Note| {
                    if n.text == "boom" {
                        Err(SpathaError::other("cannot read text"))
                    } else {
                        Ok(vec![FieldValue::from(n.text.as_str())])
                    }
                })
        })
        .index_manager(index)
        .build()?;

    let mut plan = SearchWritePlan::new(Arc::new(registry), IndexingConfig::default());
    plan.add(Arc::new(Note {
        id: 1,
        text: "fine".to_string(),
    }))?;
    plan.add(Arc::new(Note {
        id: 2,
        text: "boom".to_string(),
    }))?;

    let err = tokio_test::block_on(plan.execute()).unwrap_err();
    assert!(!matches!(err, SpathaError::DocumentBuildFailures(_)));
    assert!(err.to_string().contains("read-only"));
    assert_eq!(plan.state(), WritePlanState::Empty);
    Ok(())
}
