//! Field builder factories of the local backend.

use std::ops::Bound;
use std::sync::Arc;

use crate::analysis::analyzer::Analyzer;
use crate::analysis::registry::AnalysisRegistry;
use crate::backend::local::LocalBackend;
use crate::backend::{check_sortable, to_index_value, unsupported_predicate};
use crate::document::field_value::FieldValue;
use crate::error::{Result, SpathaError};
use crate::query::predicate::{BoolNode, PredicateNode, ValueRange};
use crate::query::query_string::{DefaultOperator, TextQuery};
use crate::query::sort::{MissingValue, SortOrder};
use crate::query::spi::{
    FieldBuilderFactories, FieldPredicateBuilderFactory, FieldProjectionBuilderFactory,
    FieldSortBuilderFactory,
};
use crate::schema::converter::{ProjectionConverter, ValueConvert};
use crate::schema::descriptor::FieldCapabilityDescriptor;
use crate::schema::field::{Analysis, FieldType};
use crate::spatial::GeoPoint;

/// A field-level predicate evaluated by the local backend.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalPredicate {
    /// An indexed term (analyzed token or normalized keyword).
    Term { path: String, term: String },
    /// Terms at relative positions, within `slop` moves.
    Phrase {
        path: String,
        terms: Vec<(usize, String)>,
        slop: usize,
    },
    /// Any indexed term starting with `prefix`.
    Prefix { path: String, prefix: String },
    /// Any indexed term within `max_edits` of `term`.
    Fuzzy {
        path: String,
        term: String,
        max_edits: usize,
    },
    /// A stored value equal to `value`.
    Exact { path: String, value: FieldValue },
    /// A stored value within `range`.
    Range { path: String, range: ValueRange },
    /// A geo point within `radius_meters` of `center`.
    WithinCircle {
        path: String,
        center: GeoPoint,
        radius_meters: f64,
    },
}

/// A field-level sort of the local backend.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalSort {
    Field {
        path: String,
        order: SortOrder,
        missing: MissingValue,
    },
    Distance {
        path: String,
        center: GeoPoint,
        order: SortOrder,
    },
}

/// A field-level projection of the local backend.
#[derive(Debug, Clone)]
pub struct LocalProjection {
    pub path: String,
    pub converter: ProjectionConverter,
    pub convert: ValueConvert,
}

/// Predicate factories, one kind per field category.
#[derive(Debug, Clone)]
pub enum LocalPredicateFactory {
    Text {
        descriptor: Arc<FieldCapabilityDescriptor>,
        analyzer: Arc<dyn Analyzer>,
    },
    Keyword {
        descriptor: Arc<FieldCapabilityDescriptor>,
        normalizer: Option<Arc<dyn Analyzer>>,
    },
    /// Integer, double, boolean and date-time fields.
    Value {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
    GeoPoint {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
}

/// Sort factories: geo points only support distance sorts.
#[derive(Debug, Clone)]
pub enum LocalSortFactory {
    Standard {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
    GeoPoint {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
}

/// Projection factory.
#[derive(Debug, Clone)]
pub struct LocalProjectionFactory {
    descriptor: Arc<FieldCapabilityDescriptor>,
}

/// Create the factories of one field.
pub(crate) fn create_factories(
    descriptor: &Arc<FieldCapabilityDescriptor>,
    analysis: &AnalysisRegistry,
) -> Result<FieldBuilderFactories<LocalBackend>> {
    let descriptor = Arc::clone(descriptor);
    let predicate = match (descriptor.field_type(), descriptor.analysis()) {
        (FieldType::Text, Analysis::Analyzer(name)) => LocalPredicateFactory::Text {
            analyzer: analysis.analyzer(name)?,
            descriptor: Arc::clone(&descriptor),
        },
        (FieldType::Text, _) => {
            return Err(SpathaError::schema(format!(
                "Text field '{}' has no analyzer",
                descriptor.path()
            )));
        }
        (FieldType::Keyword, Analysis::Normalizer(name)) => LocalPredicateFactory::Keyword {
            normalizer: Some(analysis.normalizer(name)?),
            descriptor: Arc::clone(&descriptor),
        },
        (FieldType::Keyword, _) => LocalPredicateFactory::Keyword {
            normalizer: None,
            descriptor: Arc::clone(&descriptor),
        },
        (FieldType::GeoPoint, _) => LocalPredicateFactory::GeoPoint {
            descriptor: Arc::clone(&descriptor),
        },
        _ => LocalPredicateFactory::Value {
            descriptor: Arc::clone(&descriptor),
        },
    };
    let sort = match descriptor.field_type() {
        FieldType::GeoPoint => LocalSortFactory::GeoPoint {
            descriptor: Arc::clone(&descriptor),
        },
        _ => LocalSortFactory::Standard {
            descriptor: Arc::clone(&descriptor),
        },
    };
    Ok(FieldBuilderFactories {
        predicate,
        sort,
        projection: LocalProjectionFactory { descriptor },
    })
}

/// Single-token normalization of prefix and fuzzy terms.
fn normalize_term(analyzer: &dyn Analyzer, text: &str) -> Result<String> {
    let mut terms = analyzer.terms(text)?;
    Ok(if terms.len() == 1 {
        terms.remove(0)
    } else {
        text.to_lowercase()
    })
}

fn term_leaf(path: &str, term: String) -> PredicateNode<LocalPredicate> {
    PredicateNode::Leaf(LocalPredicate::Term {
        path: path.to_string(),
        term,
    })
}

/// Combine the terms of an analyzed value.
fn terms_node(
    path: &str,
    mut terms: Vec<String>,
    operator: DefaultOperator,
) -> Option<PredicateNode<LocalPredicate>> {
    match terms.len() {
        0 => None,
        1 => Some(term_leaf(path, terms.remove(0))),
        _ => {
            let clauses = terms.into_iter().map(|t| term_leaf(path, t)).collect();
            Some(PredicateNode::Bool(match operator {
                DefaultOperator::Or => BoolNode {
                    should: clauses,
                    ..BoolNode::default()
                },
                DefaultOperator::And => BoolNode {
                    must: clauses,
                    ..BoolNode::default()
                },
            }))
        }
    }
}

impl LocalPredicateFactory {
    fn normalize_keyword(&self, text: &str) -> Result<String> {
        match self {
            LocalPredicateFactory::Keyword {
                normalizer: Some(normalizer),
                ..
            } => Ok(normalizer.terms(text)?.into_iter().next().unwrap_or_default()),
            _ => Ok(text.to_string()),
        }
    }
}

impl FieldPredicateBuilderFactory for LocalPredicateFactory {
    type Leaf = LocalPredicate;

    fn descriptor(&self) -> &FieldCapabilityDescriptor {
        match self {
            LocalPredicateFactory::Text { descriptor, .. }
            | LocalPredicateFactory::Keyword { descriptor, .. }
            | LocalPredicateFactory::Value { descriptor }
            | LocalPredicateFactory::GeoPoint { descriptor } => descriptor,
        }
    }

    fn create_match_predicate(
        &self,
        path: &str,
        value: &FieldValue,
        convert: ValueConvert,
    ) -> Result<PredicateNode<LocalPredicate>> {
        let value = to_index_value(self.descriptor(), path, value, convert)?;
        match self {
            LocalPredicateFactory::Text { analyzer, .. } => {
                let text = value.as_text().unwrap_or_default();
                let terms = analyzer.terms(text)?;
                Ok(terms_node(path, terms, DefaultOperator::Or).unwrap_or(PredicateNode::MatchNone))
            }
            LocalPredicateFactory::Keyword { .. } => {
                let term = self.normalize_keyword(value.as_text().unwrap_or_default())?;
                Ok(term_leaf(path, term))
            }
            LocalPredicateFactory::Value { .. } => Ok(PredicateNode::Leaf(LocalPredicate::Exact {
                path: path.to_string(),
                value,
            })),
            LocalPredicateFactory::GeoPoint { descriptor } => {
                Err(unsupported_predicate("match", path, descriptor))
            }
        }
    }

    fn create_range_predicate(
        &self,
        path: &str,
        range: &ValueRange,
        convert: ValueConvert,
    ) -> Result<PredicateNode<LocalPredicate>> {
        if let LocalPredicateFactory::GeoPoint { descriptor } = self {
            return Err(unsupported_predicate("range", path, descriptor));
        }
        let descriptor = self.descriptor();
        let convert_bound = |bound: &Bound<FieldValue>| -> Result<Bound<FieldValue>> {
            Ok(match bound {
                Bound::Included(v) => Bound::Included(to_index_value(descriptor, path, v, convert)?),
                Bound::Excluded(v) => Bound::Excluded(to_index_value(descriptor, path, v, convert)?),
                Bound::Unbounded => Bound::Unbounded,
            })
        };
        let range = ValueRange {
            lower: convert_bound(&range.lower)?,
            upper: convert_bound(&range.upper)?,
        };
        Ok(PredicateNode::Leaf(LocalPredicate::Range {
            path: path.to_string(),
            range,
        }))
    }

    fn create_spatial_within_circle_predicate(
        &self,
        path: &str,
        center: &GeoPoint,
        radius_meters: f64,
    ) -> Result<PredicateNode<LocalPredicate>> {
        match self {
            LocalPredicateFactory::GeoPoint { .. } => {
                Ok(PredicateNode::Leaf(LocalPredicate::WithinCircle {
                    path: path.to_string(),
                    center: *center,
                    radius_meters,
                }))
            }
            other => Err(unsupported_predicate("spatial", path, other.descriptor())),
        }
    }

    fn create_text_predicate(
        &self,
        path: &str,
        query: &TextQuery,
    ) -> Result<Option<PredicateNode<LocalPredicate>>> {
        let LocalPredicateFactory::Text { analyzer, .. } = self else {
            return Err(unsupported_predicate(
                "simple query string",
                path,
                self.descriptor(),
            ));
        };
        match query {
            TextQuery::Term { text, operator } => {
                Ok(terms_node(path, analyzer.terms(text)?, *operator))
            }
            TextQuery::Prefix(text) => Ok(Some(PredicateNode::Leaf(LocalPredicate::Prefix {
                path: path.to_string(),
                prefix: normalize_term(analyzer.as_ref(), text)?,
            }))),
            TextQuery::Fuzzy { text, max_edits } => {
                Ok(Some(PredicateNode::Leaf(LocalPredicate::Fuzzy {
                    path: path.to_string(),
                    term: normalize_term(analyzer.as_ref(), text)?,
                    max_edits: *max_edits,
                })))
            }
            TextQuery::Phrase { text, slop } => {
                let tokens: Vec<_> = analyzer.analyze(text)?.collect();
                match tokens.len() {
                    0 => Ok(None),
                    1 => Ok(Some(term_leaf(path, tokens[0].text.clone()))),
                    _ => {
                        let first = tokens[0].position;
                        let terms = tokens
                            .into_iter()
                            .map(|token| (token.position - first, token.text))
                            .collect();
                        Ok(Some(PredicateNode::Leaf(LocalPredicate::Phrase {
                            path: path.to_string(),
                            terms,
                            slop: *slop,
                        })))
                    }
                }
            }
        }
    }
}

impl FieldSortBuilderFactory for LocalSortFactory {
    type Leaf = LocalSort;

    fn descriptor(&self) -> &FieldCapabilityDescriptor {
        match self {
            LocalSortFactory::Standard { descriptor } | LocalSortFactory::GeoPoint { descriptor } => {
                descriptor
            }
        }
    }

    fn create_field_sort(
        &self,
        path: &str,
        order: SortOrder,
        missing: &MissingValue,
        convert: ValueConvert,
    ) -> Result<LocalSort> {
        let descriptor = match self {
            LocalSortFactory::GeoPoint { .. } => {
                return Err(SpathaError::TraditionalSortNotSupportedByGeoPoint {
                    path: path.to_string(),
                });
            }
            LocalSortFactory::Standard { descriptor } => descriptor,
        };
        check_sortable(descriptor, path)?;
        let missing = match missing {
            MissingValue::Use(value) => {
                MissingValue::Use(to_index_value(descriptor, path, value, convert)?)
            }
            other => other.clone(),
        };
        Ok(LocalSort::Field {
            path: path.to_string(),
            order,
            missing,
        })
    }

    fn create_distance_sort(
        &self,
        path: &str,
        center: &GeoPoint,
        order: SortOrder,
    ) -> Result<LocalSort> {
        match self {
            LocalSortFactory::Standard { descriptor } => {
                Err(SpathaError::DistanceSortNotSupported {
                    path: path.to_string(),
                    field_type: descriptor.field_type().to_string(),
                })
            }
            LocalSortFactory::GeoPoint { descriptor } => {
                check_sortable(descriptor, path)?;
                Ok(LocalSort::Distance {
                    path: path.to_string(),
                    center: *center,
                    order,
                })
            }
        }
    }
}

impl FieldProjectionBuilderFactory for LocalProjectionFactory {
    type Leaf = LocalProjection;

    fn descriptor(&self) -> &FieldCapabilityDescriptor {
        &self.descriptor
    }

    fn create_field_projection(&self, path: &str, convert: ValueConvert) -> Result<LocalProjection> {
        if !self.descriptor.is_projectable() {
            return Err(SpathaError::UnprojectableField {
                path: path.to_string(),
            });
        }
        Ok(LocalProjection {
            path: path.to_string(),
            converter: self.descriptor.projection_converter().clone(),
            convert,
        })
    }
}
