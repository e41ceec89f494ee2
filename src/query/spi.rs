//! Backend service provider interface.
//!
//! A backend exposes, for every field of every index it manages, three
//! builder factories: one for predicates, one for sorts and one for
//! projections. Each factory knows the capabilities of its field and builds
//! backend-specific leaves, or refuses with a descriptive error when the
//! field cannot support the requested operation. Factories also decide
//! whether the factory of the same field in another index can be used
//! interchangeably, which is what makes multi-index queries possible.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::document::field_value::FieldValue;
use crate::error::Result;
use crate::query::predicate::{PredicateNode, ValueRange};
use crate::query::projection::ProjectionNode;
use crate::query::query_string::{self, DefaultOperator, TextQuery};
use crate::query::search_query::SearchResult;
use crate::query::sort::{MissingValue, SortNode, SortOrder};
use crate::schema::converter::ValueConvert;
use crate::schema::descriptor::{FieldCapabilityDescriptor, OperationKind};
use crate::schema::schema::IndexSchema;
use crate::spatial::GeoPoint;

/// Predicate tree of a backend.
pub type Predicate<B> = PredicateNode<<B as SearchBackend>::PredicateLeaf>;
/// Sort of a backend.
pub type Sort<B> = SortNode<<B as SearchBackend>::SortLeaf>;
/// Projection of a backend.
pub type Projection<B> = ProjectionNode<<B as SearchBackend>::ProjectionLeaf>;

/// Builds predicate leaves for one field.
pub trait FieldPredicateBuilderFactory: Debug + Send + Sync {
    type Leaf;

    /// The field this factory builds predicates for.
    fn descriptor(&self) -> &FieldCapabilityDescriptor;

    /// Match documents whose field matches `value`.
    ///
    /// Text fields analyze the value and match any of its terms.
    fn create_match_predicate(
        &self,
        path: &str,
        value: &FieldValue,
        convert: ValueConvert,
    ) -> Result<PredicateNode<Self::Leaf>>;

    /// Match documents whose field value lies within `range`.
    fn create_range_predicate(
        &self,
        path: &str,
        range: &ValueRange,
        convert: ValueConvert,
    ) -> Result<PredicateNode<Self::Leaf>>;

    /// Match documents whose geo point lies within `radius_meters` of `center`.
    fn create_spatial_within_circle_predicate(
        &self,
        path: &str,
        center: &GeoPoint,
        radius_meters: f64,
    ) -> Result<PredicateNode<Self::Leaf>>;

    /// Build one clause of a simple query string.
    ///
    /// Returns `None` when analysis leaves nothing to search for.
    fn create_text_predicate(
        &self,
        path: &str,
        query: &TextQuery,
    ) -> Result<Option<PredicateNode<Self::Leaf>>>;

    /// Whether `other` builds interchangeable value-based predicates.
    fn is_dsl_compatible_with(&self, other: &Self, convert: ValueConvert) -> bool {
        self.descriptor()
            .has_same_shape(other.descriptor(), OperationKind::Predicate, convert)
    }

    /// Whether `other` builds interchangeable full-text predicates.
    fn is_text_compatible_with(&self, other: &Self) -> bool {
        self.descriptor().has_same_shape(
            other.descriptor(),
            OperationKind::TextPredicate,
            ValueConvert::No,
        )
    }
}

/// Builds sort leaves for one field.
pub trait FieldSortBuilderFactory: Debug + Send + Sync {
    type Leaf;

    /// The field this factory builds sorts for.
    fn descriptor(&self) -> &FieldCapabilityDescriptor;

    /// Sort by field value.
    fn create_field_sort(
        &self,
        path: &str,
        order: SortOrder,
        missing: &MissingValue,
        convert: ValueConvert,
    ) -> Result<Self::Leaf>;

    /// Sort by distance to `center`.
    fn create_distance_sort(
        &self,
        path: &str,
        center: &GeoPoint,
        order: SortOrder,
    ) -> Result<Self::Leaf>;

    /// Whether `other` builds interchangeable sorts.
    fn is_dsl_compatible_with(&self, other: &Self, convert: ValueConvert) -> bool {
        let (this, that) = (self.descriptor(), other.descriptor());
        this.is_sortable() == that.is_sortable()
            && this.has_same_shape(that, OperationKind::Sort, convert)
    }
}

/// Builds projection leaves for one field.
pub trait FieldProjectionBuilderFactory: Debug + Send + Sync {
    type Leaf;

    /// The field this factory builds projections for.
    fn descriptor(&self) -> &FieldCapabilityDescriptor;

    /// Project the stored values of the field.
    fn create_field_projection(&self, path: &str, convert: ValueConvert) -> Result<Self::Leaf>;

    /// Whether `other` builds interchangeable projections.
    fn is_projection_compatible_with(&self, other: &Self, convert: ValueConvert) -> bool {
        let (this, that) = (self.descriptor(), other.descriptor());
        this.is_projectable() == that.is_projectable()
            && this.has_same_shape(that, OperationKind::Projection, convert)
    }
}

/// The three builder factories of one field.
#[derive(Debug)]
pub struct FieldBuilderFactories<B: SearchBackend> {
    pub predicate: B::PredicateFactory,
    pub sort: B::SortFactory,
    pub projection: B::ProjectionFactory,
}

/// The builder factories of every field of one index.
#[derive(Debug)]
pub struct IndexModel<B: SearchBackend> {
    schema: Arc<IndexSchema>,
    fields: BTreeMap<String, FieldBuilderFactories<B>>,
}

impl<B: SearchBackend> IndexModel<B> {
    /// Create the factories of every field declared by `schema`.
    pub fn build<F>(schema: Arc<IndexSchema>, mut create: F) -> Result<Self>
    where
        F: FnMut(&Arc<FieldCapabilityDescriptor>) -> Result<FieldBuilderFactories<B>>,
    {
        let mut fields = BTreeMap::new();
        for descriptor in schema.fields() {
            fields.insert(descriptor.path().to_string(), create(descriptor)?);
        }
        Ok(IndexModel { schema, fields })
    }

    pub fn name(&self) -> &str {
        self.schema.index_name()
    }

    pub fn schema(&self) -> &Arc<IndexSchema> {
        &self.schema
    }

    /// The factories of a field, if this index declares it.
    pub fn field(&self, path: &str) -> Option<&FieldBuilderFactories<B>> {
        self.fields.get(path)
    }
}

/// A field targeted by a simple query string, with its merged factory.
#[derive(Debug)]
pub struct TextField<'a, F> {
    pub path: &'a str,
    pub boost: f32,
    pub factory: &'a F,
}

/// Everything a backend needs to execute a query.
#[derive(Debug)]
pub struct SearchRequest<'a, B: SearchBackend> {
    pub indexes: &'a [Arc<IndexModel<B>>],
    pub predicate: &'a Predicate<B>,
    pub sorts: &'a [Sort<B>],
    pub projections: &'a [Projection<B>],
    pub limit: usize,
    pub offset: usize,
}

/// A search backend.
pub trait SearchBackend: Debug + Send + Sync + Sized + 'static {
    type PredicateLeaf: Debug + Clone + Send + Sync;
    type SortLeaf: Debug + Clone + Send + Sync;
    type ProjectionLeaf: Debug + Clone + Send + Sync;
    type PredicateFactory: FieldPredicateBuilderFactory<Leaf = Self::PredicateLeaf>;
    type SortFactory: FieldSortBuilderFactory<Leaf = Self::SortLeaf>;
    type ProjectionFactory: FieldProjectionBuilderFactory<Leaf = Self::ProjectionLeaf>;

    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// The model of an index managed by this backend.
    fn index_model(&self, index_name: &str) -> Option<Arc<IndexModel<Self>>>;

    /// Build a simple query string predicate over already resolved fields.
    fn simple_query_string(
        &self,
        fields: &[TextField<'_, Self::PredicateFactory>],
        query: &str,
        default_operator: DefaultOperator,
    ) -> Result<Predicate<Self>> {
        query_string::build_predicate(fields, query, default_operator)
    }

    /// Run a query.
    fn execute(&self, request: &SearchRequest<'_, Self>) -> Result<SearchResult>;
}
