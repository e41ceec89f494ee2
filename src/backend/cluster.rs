//! Backend for a remote search cluster.
//!
//! Queries are translated into the cluster JSON query DSL and sent through a
//! [`client::ClusterClient`]; work plans are encoded as bulk requests. Simple
//! query strings are passed to the cluster natively rather than parsed here.

pub mod client;
pub mod factory;
pub mod translate;

pub use self::client::ClusterClient;

use std::sync::Arc;

use ahash::AHashMap;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::backend::cluster::factory::{
    ClusterPredicateFactory, ClusterProjection, ClusterProjectionFactory, ClusterSortFactory,
    create_factories,
};
use crate::backend::cluster::translate::{bulk_operations, parse_response, search_body};
use crate::backend::work::{DocumentWork, IndexManager, IndexWorkPlan};
use crate::error::{Result, SpathaError};
use crate::query::predicate::PredicateNode;
use crate::query::query_string::DefaultOperator;
use crate::query::search_query::SearchResult;
use crate::query::spi::{IndexModel, Predicate, SearchBackend, SearchRequest, TextField};
use crate::schema::schema::IndexSchema;

/// One index of the cluster backend.
#[derive(Debug)]
pub struct ClusterIndex {
    model: Arc<IndexModel<ClusterBackend>>,
    client: Arc<dyn ClusterClient>,
}

impl IndexManager for ClusterIndex {
    fn index_name(&self) -> &str {
        self.model.name()
    }

    fn schema(&self) -> &Arc<IndexSchema> {
        self.model.schema()
    }

    fn create_work_plan(&self) -> Box<dyn IndexWorkPlan> {
        Box::new(ClusterWorkPlan {
            index_name: self.model.name().to_string(),
            client: Arc::clone(&self.client),
            works: Vec::new(),
        })
    }
}

/// Work plan sent as a single bulk request.
#[derive(Debug)]
pub struct ClusterWorkPlan {
    index_name: String,
    client: Arc<dyn ClusterClient>,
    works: Vec<DocumentWork>,
}

impl IndexWorkPlan for ClusterWorkPlan {
    fn push(&mut self, work: DocumentWork) {
        self.works.push(work);
    }

    fn len(&self) -> usize {
        self.works.len()
    }

    fn execute(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        if self.works.is_empty() {
            return futures::future::ready(Ok(())).boxed();
        }
        let operations = bulk_operations(&self.index_name, &self.works);
        debug!(index = %self.index_name, works = self.works.len(), "sending bulk request");
        self.client.bulk(&self.index_name, operations)
    }
}

/// The cluster backend.
#[derive(Debug)]
pub struct ClusterBackend {
    client: Arc<dyn ClusterClient>,
    indexes: RwLock<AHashMap<String, Arc<ClusterIndex>>>,
}

impl ClusterBackend {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        ClusterBackend {
            client,
            indexes: RwLock::new(AHashMap::new()),
        }
    }

    /// Register an index; the cluster-side mapping is managed elsewhere.
    pub fn create_index(&self, schema: IndexSchema) -> Result<Arc<ClusterIndex>> {
        let name = schema.index_name().to_string();
        let model = IndexModel::build(Arc::new(schema), |descriptor| {
            Ok(create_factories(descriptor))
        })?;
        let index = Arc::new(ClusterIndex {
            model: Arc::new(model),
            client: Arc::clone(&self.client),
        });
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&name) {
            return Err(SpathaError::backend(format!("Index '{name}' already exists")));
        }
        indexes.insert(name.clone(), Arc::clone(&index));
        info!(index = %name, "registered cluster index");
        Ok(index)
    }

    pub fn index(&self, name: &str) -> Option<Arc<ClusterIndex>> {
        self.indexes.read().get(name).cloned()
    }
}

impl SearchBackend for ClusterBackend {
    type PredicateLeaf = Value;
    type SortLeaf = Value;
    type ProjectionLeaf = ClusterProjection;
    type PredicateFactory = ClusterPredicateFactory;
    type SortFactory = ClusterSortFactory;
    type ProjectionFactory = ClusterProjectionFactory;

    fn name(&self) -> &'static str {
        "cluster"
    }

    fn index_model(&self, index_name: &str) -> Option<Arc<IndexModel<Self>>> {
        self.index(index_name).map(|index| Arc::clone(&index.model))
    }

    fn simple_query_string(
        &self,
        fields: &[TextField<'_, ClusterPredicateFactory>],
        query: &str,
        default_operator: DefaultOperator,
    ) -> Result<Predicate<Self>> {
        if query.trim().is_empty() {
            return Ok(PredicateNode::MatchNone);
        }
        let fields: Vec<String> = fields
            .iter()
            .map(|field| {
                if field.boost == 1.0 {
                    field.path.to_string()
                } else {
                    format!("{}^{}", field.path, field.boost)
                }
            })
            .collect();
        let operator = match default_operator {
            DefaultOperator::Or => "or",
            DefaultOperator::And => "and",
        };
        Ok(PredicateNode::Leaf(json!({
            "simple_query_string": {
                "query": query,
                "fields": fields,
                "default_operator": operator
            }
        })))
    }

    fn execute(&self, request: &SearchRequest<'_, Self>) -> Result<SearchResult> {
        let indexes: Vec<String> = request
            .indexes
            .iter()
            .map(|index| index.name().to_string())
            .collect();
        let body = search_body(
            request.predicate,
            request.sorts,
            request.projections,
            request.limit,
            request.offset,
        );
        debug!(indexes = ?indexes, "sending search request");
        let response = self.client.search(&indexes, body)?;
        parse_response(&response, request.projections)
    }
}
