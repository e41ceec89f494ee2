//! Multi-index query orchestration and the fragment DSL.

use std::sync::Arc;

use tracing::debug;

use crate::document::field_value::FieldValue;
use crate::error::{Result, SpathaError};
use crate::query::predicate::{BoolNode, PredicateNode, PredicateOptions, ValueRange};
use crate::query::projection::ProjectionNode;
use crate::query::query_string::DefaultOperator;
use crate::query::search_query::SearchQueryBuilder;
use crate::query::sort::{MissingValue, SortNode, SortOrder};
use crate::query::spi::{
    FieldBuilderFactories, FieldPredicateBuilderFactory, FieldProjectionBuilderFactory,
    FieldSortBuilderFactory, IndexModel, Predicate, Projection, SearchBackend, Sort, TextField,
};
use crate::schema::converter::ValueConvert;
use crate::schema::descriptor::{OperationKind, reduce_compatible};
use crate::spatial::GeoPoint;

/// A set of indexes of one backend, queried together.
#[derive(Debug)]
pub struct SearchScope<B: SearchBackend> {
    backend: Arc<B>,
    indexes: Vec<Arc<IndexModel<B>>>,
}

impl<B: SearchBackend> SearchScope<B> {
    /// Target the given indexes of `backend`.
    pub fn new(backend: Arc<B>, index_names: &[&str]) -> Result<Self> {
        if index_names.is_empty() {
            return Err(SpathaError::query("A search scope must target at least one index"));
        }
        let mut indexes: Vec<Arc<IndexModel<B>>> = Vec::with_capacity(index_names.len());
        for name in index_names {
            if indexes.iter().any(|index| index.name() == *name) {
                continue;
            }
            let model = backend.index_model(name).ok_or_else(|| {
                SpathaError::query(format!(
                    "Unknown index '{name}' in backend '{}'",
                    backend.name()
                ))
            })?;
            indexes.push(model);
        }
        Ok(SearchScope { backend, indexes })
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn indexes(&self) -> &[Arc<IndexModel<B>>] {
        &self.indexes
    }

    /// Names of the targeted indexes, in targeting order.
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.iter().map(|index| index.name().to_string()).collect()
    }

    /// Predicate DSL.
    pub fn predicate(&self) -> PredicateFactory<'_, B> {
        PredicateFactory { scope: self }
    }

    /// Sort DSL.
    pub fn sort(&self) -> SortFactory<'_, B> {
        SortFactory { scope: self }
    }

    /// Projection DSL.
    pub fn projection(&self) -> ProjectionFactory<'_, B> {
        ProjectionFactory { scope: self }
    }

    /// Start a query over this scope.
    pub fn query(&self) -> SearchQueryBuilder<'_, B> {
        SearchQueryBuilder::new(self)
    }

    /// Reduce the factories the targeted indexes declare for `path` to one.
    ///
    /// Indexes that do not declare the field are skipped; the field is unknown
    /// only when no targeted index declares it.
    fn resolve<'s, T, S, C>(
        &'s self,
        path: &str,
        kind: OperationKind,
        select: S,
        compatible: C,
    ) -> Result<&'s T>
    where
        S: Fn(&'s FieldBuilderFactories<B>) -> &'s T,
        C: Fn(&T, &T) -> bool,
    {
        let candidates: Vec<(String, &'s T)> = self
            .indexes
            .iter()
            .filter_map(|index| {
                index
                    .field(path)
                    .map(|factories| (index.name().to_string(), select(factories)))
            })
            .collect();
        if candidates.is_empty() {
            return Err(SpathaError::UnknownField {
                path: path.to_string(),
                indexes: self.index_names(),
            });
        }
        if candidates.len() < self.indexes.len() {
            debug!(
                path,
                declared = candidates.len(),
                targeted = self.indexes.len(),
                "field is not declared by every targeted index"
            );
        }
        reduce_compatible(path, kind, candidates, |a, b| compatible(*a, *b))
    }

    pub(crate) fn predicate_factory(
        &self,
        path: &str,
        convert: ValueConvert,
    ) -> Result<&B::PredicateFactory> {
        self.resolve(
            path,
            OperationKind::Predicate,
            |factories| &factories.predicate,
            |a, b| a.is_dsl_compatible_with(b, convert),
        )
    }

    pub(crate) fn text_predicate_factory(&self, path: &str) -> Result<&B::PredicateFactory> {
        self.resolve(
            path,
            OperationKind::TextPredicate,
            |factories| &factories.predicate,
            |a, b| a.is_text_compatible_with(b),
        )
    }

    pub(crate) fn sort_factory(&self, path: &str, convert: ValueConvert) -> Result<&B::SortFactory> {
        self.resolve(
            path,
            OperationKind::Sort,
            |factories| &factories.sort,
            |a, b| a.is_dsl_compatible_with(b, convert),
        )
    }

    pub(crate) fn projection_factory(
        &self,
        path: &str,
        convert: ValueConvert,
    ) -> Result<&B::ProjectionFactory> {
        self.resolve(
            path,
            OperationKind::Projection,
            |factories| &factories.projection,
            |a, b| a.is_projection_compatible_with(b, convert),
        )
    }
}

/// A field targeted by a predicate, with its field-level boost.
#[derive(Debug, Clone)]
struct TargetField {
    path: String,
    boost: f32,
}

#[derive(Debug, Clone, Default)]
struct TargetFields(Vec<TargetField>);

impl TargetFields {
    fn push<S: Into<String>>(&mut self, path: S) {
        self.0.push(TargetField {
            path: path.into(),
            boost: 1.0,
        });
    }

    fn boost_last(&mut self, boost: f32) {
        if let Some(field) = self.0.last_mut() {
            field.boost *= boost;
        }
    }

    /// Build one node per field and OR them.
    fn build<L, F>(&self, mut build: F) -> Result<PredicateNode<L>>
    where
        F: FnMut(&str) -> Result<PredicateNode<L>>,
    {
        let mut clauses = Vec::with_capacity(self.0.len());
        for field in &self.0 {
            let node = build(&field.path)?;
            clauses.push(PredicateOptions::default().boost(field.boost).apply(node));
        }
        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => PredicateNode::Bool(BoolNode {
                should: clauses,
                ..BoolNode::default()
            }),
        })
    }
}

/// Entry point of the predicate DSL.
#[derive(Debug)]
pub struct PredicateFactory<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
}

impl<'s, B: SearchBackend> PredicateFactory<'s, B> {
    pub fn match_all(&self) -> Predicate<B> {
        PredicateNode::MatchAll
    }

    pub fn match_none(&self) -> Predicate<B> {
        PredicateNode::MatchNone
    }

    /// Boolean junction of other predicates.
    pub fn bool(&self) -> BoolPredicateStep<B> {
        BoolPredicateStep {
            node: BoolNode::default(),
            options: PredicateOptions::default(),
        }
    }

    /// Match a value.
    pub fn match_(&self) -> MatchPredicateStep<'s, B> {
        MatchPredicateStep {
            scope: self.scope,
            options: PredicateOptions::default(),
        }
    }

    /// Match a range of values.
    pub fn range(&self) -> RangePredicateStep<'s, B> {
        RangePredicateStep {
            scope: self.scope,
            options: PredicateOptions::default(),
        }
    }

    /// Match geo points within an area.
    pub fn spatial_within(&self) -> SpatialPredicateStep<'s, B> {
        SpatialPredicateStep {
            scope: self.scope,
            options: PredicateOptions::default(),
        }
    }

    /// Match a simple query string.
    pub fn simple_query_string(&self) -> SimpleQueryStringStep<'s, B> {
        SimpleQueryStringStep {
            scope: self.scope,
            options: PredicateOptions::default(),
        }
    }
}

/// Boolean predicate under construction.
#[derive(Debug)]
pub struct BoolPredicateStep<B: SearchBackend> {
    node: BoolNode<B::PredicateLeaf>,
    options: PredicateOptions,
}

impl<B: SearchBackend> BoolPredicateStep<B> {
    pub fn must(mut self, predicate: Predicate<B>) -> Self {
        self.node.must.push(predicate);
        self
    }

    pub fn should(mut self, predicate: Predicate<B>) -> Self {
        self.node.should.push(predicate);
        self
    }

    pub fn must_not(mut self, predicate: Predicate<B>) -> Self {
        self.node.must_not.push(predicate);
        self
    }

    pub fn filter(mut self, predicate: Predicate<B>) -> Self {
        self.node.filter.push(predicate);
        self
    }

    pub fn minimum_should_match(mut self, count: usize) -> Self {
        self.node.minimum_should_match = Some(count);
        self
    }

    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.options = self.options.boost(boost);
        self
    }

    pub fn with_constant_score(mut self) -> Self {
        self.options = self.options.constant_score();
        self
    }

    pub fn build(self) -> Predicate<B> {
        self.options.apply(PredicateNode::Bool(self.node))
    }
}

/// Match predicate, before the first field.
#[derive(Debug)]
pub struct MatchPredicateStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
}

impl<'s, B: SearchBackend> MatchPredicateStep<'s, B> {
    /// Boost the whole predicate.
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.options = self.options.boost(boost);
        self
    }

    pub fn with_constant_score(mut self) -> Self {
        self.options = self.options.constant_score();
        self
    }

    pub fn on_field<S: Into<String>>(self, path: S) -> MatchFieldStep<'s, B> {
        let mut fields = TargetFields::default();
        fields.push(path);
        MatchFieldStep {
            scope: self.scope,
            options: self.options,
            fields,
        }
    }
}

/// Match predicate, with at least one field.
#[derive(Debug)]
pub struct MatchFieldStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
    fields: TargetFields,
}

impl<B: SearchBackend> MatchFieldStep<'_, B> {
    /// Boost the last added field.
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.fields.boost_last(boost);
        self
    }

    pub fn or_field<S: Into<String>>(mut self, path: S) -> Self {
        self.fields.push(path);
        self
    }

    /// Match a value, converted with the field DSL converters.
    pub fn matching<V: Into<FieldValue>>(self, value: V) -> Result<Predicate<B>> {
        self.build(value.into(), ValueConvert::Yes)
    }

    /// Match a raw index value, ignoring DSL converters.
    pub fn matching_raw<V: Into<FieldValue>>(self, value: V) -> Result<Predicate<B>> {
        self.build(value.into(), ValueConvert::No)
    }

    fn build(self, value: FieldValue, convert: ValueConvert) -> Result<Predicate<B>> {
        let scope = self.scope;
        let node = self.fields.build(|path| {
            scope
                .predicate_factory(path, convert)?
                .create_match_predicate(path, &value, convert)
        })?;
        Ok(self.options.apply(node))
    }
}

/// Range predicate, before the first field.
#[derive(Debug)]
pub struct RangePredicateStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
}

impl<'s, B: SearchBackend> RangePredicateStep<'s, B> {
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.options = self.options.boost(boost);
        self
    }

    pub fn with_constant_score(mut self) -> Self {
        self.options = self.options.constant_score();
        self
    }

    pub fn on_field<S: Into<String>>(self, path: S) -> RangeFieldStep<'s, B> {
        let mut fields = TargetFields::default();
        fields.push(path);
        RangeFieldStep {
            scope: self.scope,
            options: self.options,
            fields,
        }
    }
}

/// Range predicate, with at least one field.
#[derive(Debug)]
pub struct RangeFieldStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
    fields: TargetFields,
}

impl<B: SearchBackend> RangeFieldStep<'_, B> {
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.fields.boost_last(boost);
        self
    }

    pub fn or_field<S: Into<String>>(mut self, path: S) -> Self {
        self.fields.push(path);
        self
    }

    pub fn within(self, range: ValueRange) -> Result<Predicate<B>> {
        self.build(range, ValueConvert::Yes)
    }

    /// Range over raw index values, ignoring DSL converters.
    pub fn within_raw(self, range: ValueRange) -> Result<Predicate<B>> {
        self.build(range, ValueConvert::No)
    }

    pub fn between<L: Into<FieldValue>, U: Into<FieldValue>>(
        self,
        lower: L,
        upper: U,
    ) -> Result<Predicate<B>> {
        self.within(ValueRange::between(lower, upper))
    }

    pub fn at_least<V: Into<FieldValue>>(self, lower: V) -> Result<Predicate<B>> {
        self.within(ValueRange::at_least(lower))
    }

    pub fn at_most<V: Into<FieldValue>>(self, upper: V) -> Result<Predicate<B>> {
        self.within(ValueRange::at_most(upper))
    }

    fn build(self, range: ValueRange, convert: ValueConvert) -> Result<Predicate<B>> {
        let scope = self.scope;
        let node = self.fields.build(|path| {
            scope
                .predicate_factory(path, convert)?
                .create_range_predicate(path, &range, convert)
        })?;
        Ok(self.options.apply(node))
    }
}

/// Spatial predicate, before the first field.
#[derive(Debug)]
pub struct SpatialPredicateStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
}

impl<'s, B: SearchBackend> SpatialPredicateStep<'s, B> {
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.options = self.options.boost(boost);
        self
    }

    pub fn with_constant_score(mut self) -> Self {
        self.options = self.options.constant_score();
        self
    }

    pub fn on_field<S: Into<String>>(self, path: S) -> SpatialFieldStep<'s, B> {
        let mut fields = TargetFields::default();
        fields.push(path);
        SpatialFieldStep {
            scope: self.scope,
            options: self.options,
            fields,
        }
    }
}

/// Spatial predicate, with at least one field.
#[derive(Debug)]
pub struct SpatialFieldStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
    fields: TargetFields,
}

impl<B: SearchBackend> SpatialFieldStep<'_, B> {
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.fields.boost_last(boost);
        self
    }

    pub fn or_field<S: Into<String>>(mut self, path: S) -> Self {
        self.fields.push(path);
        self
    }

    /// Points within `radius_meters` of `center`.
    pub fn circle(self, center: GeoPoint, radius_meters: f64) -> Result<Predicate<B>> {
        if radius_meters.is_nan() || radius_meters < 0.0 {
            return Err(SpathaError::query(format!(
                "Invalid radius {radius_meters}: must be a non-negative number of meters"
            )));
        }
        let scope = self.scope;
        let node = self.fields.build(|path| {
            scope
                .predicate_factory(path, ValueConvert::Yes)?
                .create_spatial_within_circle_predicate(path, &center, radius_meters)
        })?;
        Ok(self.options.apply(node))
    }
}

/// Simple query string predicate, before the first field.
#[derive(Debug)]
pub struct SimpleQueryStringStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
}

impl<'s, B: SearchBackend> SimpleQueryStringStep<'s, B> {
    /// Boost the whole predicate.
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.options = self.options.boost(boost);
        self
    }

    pub fn with_constant_score(mut self) -> Self {
        self.options = self.options.constant_score();
        self
    }

    pub fn on_field<S: Into<String>>(self, path: S) -> SimpleQueryStringFieldStep<'s, B> {
        let mut fields = TargetFields::default();
        fields.push(path);
        SimpleQueryStringFieldStep {
            scope: self.scope,
            options: self.options,
            fields,
            default_operator: DefaultOperator::Or,
        }
    }

    pub fn on_fields<I, S>(self, paths: I) -> SimpleQueryStringFieldStep<'s, B>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields = TargetFields::default();
        for path in paths {
            fields.push(path);
        }
        SimpleQueryStringFieldStep {
            scope: self.scope,
            options: self.options,
            fields,
            default_operator: DefaultOperator::Or,
        }
    }
}

/// Simple query string predicate, with fields.
#[derive(Debug)]
pub struct SimpleQueryStringFieldStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    options: PredicateOptions,
    fields: TargetFields,
    default_operator: DefaultOperator,
}

impl<B: SearchBackend> SimpleQueryStringFieldStep<'_, B> {
    /// Boost the last added field.
    pub fn boosted_to(mut self, boost: f32) -> Self {
        self.fields.boost_last(boost);
        self
    }

    pub fn or_field<S: Into<String>>(mut self, path: S) -> Self {
        self.fields.push(path);
        self
    }

    pub fn or_fields<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for path in paths {
            self.fields.push(path);
        }
        self
    }

    /// Combine whitespace-separated clauses with AND instead of OR.
    pub fn with_and_as_default_operator(mut self) -> Self {
        self.default_operator = DefaultOperator::And;
        self
    }

    /// Build the predicate for `query`.
    ///
    /// A missing query string is an error; an empty one matches nothing.
    pub fn matching<'q, Q: Into<Option<&'q str>>>(self, query: Q) -> Result<Predicate<B>> {
        let scope = self.scope;
        let mut factories = Vec::with_capacity(self.fields.0.len());
        for field in &self.fields.0 {
            factories.push((field, scope.text_predicate_factory(&field.path)?));
        }
        let Some(query) = query.into() else {
            let path = self.fields.0.first().map(|f| f.path.clone()).unwrap_or_default();
            return Err(SpathaError::InvalidQueryStringInput { path });
        };

        let targets: Vec<TextField<'_, B::PredicateFactory>> = factories
            .iter()
            .map(|(field, factory)| TextField {
                path: &field.path,
                boost: field.boost,
                factory: *factory,
            })
            .collect();
        let node = scope
            .backend()
            .simple_query_string(&targets, query, self.default_operator)?;
        Ok(self.options.apply(node))
    }
}

/// Entry point of the sort DSL.
#[derive(Debug)]
pub struct SortFactory<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
}

impl<'s, B: SearchBackend> SortFactory<'s, B> {
    /// By descending relevance score.
    pub fn score(&self) -> Sort<B> {
        SortNode::Score(SortOrder::Desc)
    }

    pub fn score_with_order(&self, order: SortOrder) -> Sort<B> {
        SortNode::Score(order)
    }

    pub fn index_order(&self) -> Sort<B> {
        SortNode::IndexOrder
    }

    /// By field value.
    pub fn field<S: Into<String>>(&self, path: S) -> FieldSortStep<'s, B> {
        FieldSortStep {
            scope: self.scope,
            path: path.into(),
            order: SortOrder::Asc,
            missing: MissingValue::Last,
            convert: ValueConvert::Yes,
        }
    }

    /// By distance to `center`.
    pub fn distance<S: Into<String>>(&self, path: S, center: GeoPoint) -> DistanceSortStep<'s, B> {
        DistanceSortStep {
            scope: self.scope,
            path: path.into(),
            center,
            order: SortOrder::Asc,
        }
    }
}

/// Field sort under construction.
#[derive(Debug)]
pub struct FieldSortStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    path: String,
    order: SortOrder,
    missing: MissingValue,
    convert: ValueConvert,
}

impl<B: SearchBackend> FieldSortStep<'_, B> {
    pub fn asc(mut self) -> Self {
        self.order = SortOrder::Asc;
        self
    }

    pub fn desc(mut self) -> Self {
        self.order = SortOrder::Desc;
        self
    }

    pub fn missing_first(mut self) -> Self {
        self.missing = MissingValue::First;
        self
    }

    pub fn missing_last(mut self) -> Self {
        self.missing = MissingValue::Last;
        self
    }

    /// Sort documents without a value as if they had `value`.
    pub fn missing_use<V: Into<FieldValue>>(mut self, value: V) -> Self {
        self.missing = MissingValue::Use(value.into());
        self
    }

    /// Pass the missing value as a raw index value.
    pub fn raw(mut self) -> Self {
        self.convert = ValueConvert::No;
        self
    }

    pub fn build(self) -> Result<Sort<B>> {
        let factory = self.scope.sort_factory(&self.path, self.convert)?;
        let leaf = factory.create_field_sort(&self.path, self.order, &self.missing, self.convert)?;
        Ok(SortNode::Field(leaf))
    }
}

/// Distance sort under construction.
#[derive(Debug)]
pub struct DistanceSortStep<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
    path: String,
    center: GeoPoint,
    order: SortOrder,
}

impl<B: SearchBackend> DistanceSortStep<'_, B> {
    pub fn asc(mut self) -> Self {
        self.order = SortOrder::Asc;
        self
    }

    pub fn desc(mut self) -> Self {
        self.order = SortOrder::Desc;
        self
    }

    pub fn build(self) -> Result<Sort<B>> {
        let factory = self.scope.sort_factory(&self.path, ValueConvert::Yes)?;
        let leaf = factory.create_distance_sort(&self.path, &self.center, self.order)?;
        Ok(SortNode::Field(leaf))
    }
}

/// Entry point of the projection DSL.
#[derive(Debug)]
pub struct ProjectionFactory<'s, B: SearchBackend> {
    scope: &'s SearchScope<B>,
}

impl<B: SearchBackend> ProjectionFactory<'_, B> {
    pub fn document_reference(&self) -> Projection<B> {
        ProjectionNode::DocumentReference
    }

    pub fn score(&self) -> Projection<B> {
        ProjectionNode::Score
    }

    /// Field values, converted with the field projection converters.
    pub fn field(&self, path: &str) -> Result<Projection<B>> {
        self.build_field(path, ValueConvert::Yes)
    }

    /// Raw stored field values, ignoring projection converters.
    pub fn field_raw(&self, path: &str) -> Result<Projection<B>> {
        self.build_field(path, ValueConvert::No)
    }

    fn build_field(&self, path: &str, convert: ValueConvert) -> Result<Projection<B>> {
        let factory = self.scope.projection_factory(path, convert)?;
        Ok(ProjectionNode::Field(factory.create_field_projection(path, convert)?))
    }
}
