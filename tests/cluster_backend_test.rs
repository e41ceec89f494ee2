use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use spatha::backend::cluster::{ClusterBackend, ClusterClient};
use spatha::config::SpathaConfig;
use spatha::document::FieldValue;
use spatha::error::{Result, SpathaError};
use spatha::mapping::{EntityId, MappingRegistry};
use spatha::query::scope::SearchScope;
use spatha::schema::{IndexField, IndexSchema, OperationKind};
use spatha::session::{EntityLoadingResult, EntityStore, SearchSession};

/// Records every request and answers searches with a canned response.
#[derive(Debug)]
struct RecordingClient {
    response: Value,
    searches: Mutex<Vec<(Vec<String>, Value)>>,
    bulks: Mutex<Vec<(String, Vec<Value>)>>,
}

impl RecordingClient {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(RecordingClient {
            response,
            searches: Mutex::new(Vec::new()),
            bulks: Mutex::new(Vec::new()),
        })
    }
}

impl ClusterClient for RecordingClient {
    fn search(&self, indexes: &[String], body: Value) -> Result<Value> {
        self.searches.lock().push((indexes.to_vec(), body));
        Ok(self.response.clone())
    }

    fn bulk(&self, index: &str, operations: Vec<Value>) -> BoxFuture<'static, Result<()>> {
        self.bulks.lock().push((index.to_string(), operations));
        futures::future::ready(Ok(())).boxed()
    }
}

fn backend(client: Arc<RecordingClient>) -> Result<Arc<ClusterBackend>> {
    let backend = Arc::new(ClusterBackend::new(client));
    backend.create_index(
        IndexSchema::builder("books")
            .field(IndexField::text("title"))
            .field(IndexField::text("summary"))
            .field(IndexField::integer("pages").projectable(true))
            .build()?,
    )?;
    backend.create_index(
        IndexSchema::builder("magazines")
            .field(IndexField::keyword("pages"))
            .field(IndexField::text("summary"))
            .build()?,
    )?;
    Ok(backend)
}

#[test]
fn test_conflict_names_every_index_before_any_request() -> Result<()> {
    let client = RecordingClient::new(json!({ "hits": { "total": 0, "hits": [] } }));
    let scope = SearchScope::new(backend(Arc::clone(&client))?, &["books", "magazines"])?;

    let err = scope
        .predicate()
        .match_()
        .on_field("pages")
        .matching(12_i64)
        .unwrap_err();
    match err {
        SpathaError::ConflictingFieldCapabilities {
            path,
            kind,
            indexes,
        } => {
            assert_eq!(path, "pages");
            assert_eq!(kind, OperationKind::Predicate);
            assert_eq!(indexes, vec!["books".to_string(), "magazines".to_string()]);
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert!(client.searches.lock().is_empty());
    Ok(())
}

#[test]
fn test_field_missing_from_one_index_is_skipped() -> Result<()> {
    let client = RecordingClient::new(json!({ "hits": { "total": 0, "hits": [] } }));
    let scope = SearchScope::new(backend(Arc::clone(&client))?, &["books", "magazines"])?;

    let predicate = scope.predicate().match_().on_field("title").matching("dune")?;
    scope.query().predicate(predicate).build().fetch(10, 0)?;

    let searches = client.searches.lock();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].0, vec!["books".to_string(), "magazines".to_string()]);
    assert_eq!(
        searches[0].1["query"],
        json!({ "match": { "title": { "query": "dune" } } })
    );
    Ok(())
}

#[test]
fn test_simple_query_string_is_sent_natively() -> Result<()> {
    let client = RecordingClient::new(json!({
        "hits": {
            "total": { "value": 1 },
            "hits": [
                { "_index": "books", "_id": "1", "_score": 1.5, "_source": { "pages": 412 } }
            ]
        }
    }));
    let scope = SearchScope::new(backend(Arc::clone(&client))?, &["books"])?;

    let predicate = scope
        .predicate()
        .simple_query_string()
        .on_field("title")
        .boosted_to(2.0)
        .or_field("summary")
        .with_and_as_default_operator()
        .matching("dune + messiah")?;
    let projection = scope.projection().field("pages")?;
    let result = scope
        .query()
        .predicate(predicate)
        .projection(projection)
        .build()
        .fetch(20, 0)?;

    assert_eq!(result.total_hit_count, 1);
    assert_eq!(result.ids(), vec!["1".to_string()]);
    assert_eq!(result.hits[0].score, 1.5);
    assert_eq!(
        result.hits[0].projections[0].first(),
        Some(&FieldValue::Integer(412))
    );

    let searches = client.searches.lock();
    let body = &searches[0].1;
    assert_eq!(
        body["query"],
        json!({
            "simple_query_string": {
                "query": "dune + messiah",
                "fields": ["title^2", "summary"],
                "default_operator": "and"
            }
        })
    );
    assert_eq!(body["size"], json!(20));
    assert_eq!(body["_source"], json!(["pages"]));
    Ok(())
}

#[test]
fn test_blank_simple_query_string_matches_nothing() -> Result<()> {
    let client = RecordingClient::new(json!({ "hits": { "total": 0, "hits": [] } }));
    let scope = SearchScope::new(backend(Arc::clone(&client))?, &["books"])?;

    let predicate = scope
        .predicate()
        .simple_query_string()
        .on_field("title")
        .matching("  ")?;
    scope.query().predicate(predicate).build().fetch(10, 0)?;

    assert_eq!(client.searches.lock()[0].1["query"], json!({ "match_none": {} }));
    Ok(())
}

struct Book {
    id: i64,
    title: String,
}

#[derive(Debug)]
struct NoStore;

impl EntityStore for NoStore {
    fn load_by_ids(&self, _: &str, _: &[EntityId], _: usize) -> Result<Vec<EntityLoadingResult>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_session_commit_sends_bulk_request() -> Result<()> {
    let client = RecordingClient::new(json!({ "hits": { "total": 0, "hits": [] } }));
    let backend = backend(Arc::clone(&client))?;
    let books = backend
        .index("books")
        .ok_or_else(|| SpathaError::other("books index is missing"))?;
    let registry = MappingRegistry::builder()
        .entity::<Book, _>("Book", |m| {
            m.indexed("books")
                .document_id(|b: &Book| b.id)
                .field("title", |b: &Book| Some(FieldValue::from(b.title.as_str())))
        })
        .index_manager(books)
        .build()?;
    let mut session = SearchSession::new(Arc::new(registry), Arc::new(NoStore), SpathaConfig::default());

    session.begin_transaction();
    let dune = Arc::new(Book {
        id: 1,
        title: "Dune".to_string(),
    });
    session.on_entity_inserted(Arc::clone(&dune))?;
    session.on_entity_deleted(Arc::new(Book {
        id: 2,
        title: "Dune Messiah".to_string(),
    }))?;
    tokio_test::block_on(session.on_commit())?;

    let bulks = client.bulks.lock();
    assert_eq!(bulks.len(), 1);
    let (index, operations) = &bulks[0];
    assert_eq!(index, "books");
    assert_eq!(
        operations,
        &vec![
            json!({ "create": { "_index": "books", "_id": "1" } }),
            json!({ "title": "Dune" }),
            json!({ "delete": { "_index": "books", "_id": "2" } }),
        ]
    );
    Ok(())
}
