//! Query assembly and results.

use std::sync::Arc;

use tracing::debug;

use crate::document::reference::DocumentReference;
use crate::error::Result;
use crate::query::predicate::PredicateNode;
use crate::query::projection::{ProjectionNode, ProjectionValue};
use crate::query::scope::SearchScope;
use crate::query::spi::{IndexModel, Predicate, Projection, SearchBackend, SearchRequest, Sort};

/// A single search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matched document.
    pub reference: DocumentReference,
    /// Relevance score; 0 when the backend does not compute scores.
    pub score: f32,
    /// One value per requested projection, in request order.
    pub projections: Vec<ProjectionValue>,
}

/// The result of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    /// Number of matching documents, regardless of limit and offset.
    pub total_hit_count: usize,
    /// The requested page of hits.
    pub hits: Vec<SearchHit>,
}

impl SearchResult {
    /// References of the hits, in hit order.
    pub fn references(&self) -> Vec<DocumentReference> {
        self.hits.iter().map(|hit| hit.reference.clone()).collect()
    }

    /// Document identifiers of the hits, in hit order.
    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.reference.id().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// A query ready to be executed, possibly several times.
#[derive(Debug)]
pub struct SearchQuery<B: SearchBackend> {
    backend: Arc<B>,
    indexes: Vec<Arc<IndexModel<B>>>,
    predicate: Predicate<B>,
    sorts: Vec<Sort<B>>,
    projections: Vec<Projection<B>>,
}

impl<B: SearchBackend> SearchQuery<B> {
    pub fn predicate(&self) -> &Predicate<B> {
        &self.predicate
    }

    pub fn sorts(&self) -> &[Sort<B>] {
        &self.sorts
    }

    pub fn projections(&self) -> &[Projection<B>] {
        &self.projections
    }

    /// Fetch one page of hits.
    pub fn fetch(&self, limit: usize, offset: usize) -> Result<SearchResult> {
        debug!(
            backend = self.backend.name(),
            indexes = self.indexes.len(),
            limit,
            offset,
            "executing search query"
        );
        self.backend.execute(&SearchRequest {
            indexes: &self.indexes,
            predicate: &self.predicate,
            sorts: &self.sorts,
            projections: &self.projections,
            limit,
            offset,
        })
    }

    /// Fetch every hit.
    pub fn fetch_all(&self) -> Result<SearchResult> {
        self.fetch(usize::MAX, 0)
    }

    /// Count matching documents.
    pub fn fetch_total_hit_count(&self) -> Result<usize> {
        Ok(self.fetch(0, 0)?.total_hit_count)
    }
}

/// Builder for [`SearchQuery`].
#[derive(Debug)]
pub struct SearchQueryBuilder<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    predicate: Option<Predicate<B>>,
    sorts: Vec<Sort<B>>,
    projections: Vec<Projection<B>>,
}

impl<'s, B: SearchBackend> SearchQueryBuilder<'s, B> {
    pub(crate) fn new(scope: &'s SearchScope<B>) -> Self {
        SearchQueryBuilder {
            scope,
            predicate: None,
            sorts: Vec::new(),
            projections: Vec::new(),
        }
    }

    /// The predicate; defaults to matching every document.
    pub fn predicate(mut self, predicate: Predicate<B>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Add a sort; without sorts hits are ordered by descending score.
    pub fn sort(mut self, sort: Sort<B>) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Add a projection; without projections each hit projects its reference.
    pub fn projection(mut self, projection: Projection<B>) -> Self {
        self.projections.push(projection);
        self
    }

    pub fn build(self) -> SearchQuery<B> {
        let projections = if self.projections.is_empty() {
            vec![ProjectionNode::DocumentReference]
        } else {
            self.projections
        };
        SearchQuery {
            backend: Arc::clone(self.scope.backend()),
            indexes: self.scope.indexes().to_vec(),
            predicate: self.predicate.unwrap_or(PredicateNode::MatchAll),
            sorts: self.sorts,
            projections,
        }
    }
}
