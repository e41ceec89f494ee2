//! Field builder factories of the cluster backend.
//!
//! Leaves are fragments of the cluster JSON query DSL.

use std::ops::Bound;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::backend::cluster::ClusterBackend;
use crate::backend::cluster::translate::value_to_json;
use crate::backend::{check_sortable, to_index_value, unsupported_predicate};
use crate::document::field_value::FieldValue;
use crate::error::{Result, SpathaError};
use crate::query::predicate::{PredicateNode, ValueRange};
use crate::query::query_string::{DefaultOperator, TextQuery};
use crate::query::sort::{MissingValue, SortOrder};
use crate::query::spi::{
    FieldBuilderFactories, FieldPredicateBuilderFactory, FieldProjectionBuilderFactory,
    FieldSortBuilderFactory,
};
use crate::schema::converter::{ProjectionConverter, ValueConvert};
use crate::schema::descriptor::FieldCapabilityDescriptor;
use crate::schema::field::FieldType;
use crate::spatial::GeoPoint;

/// A field projection, read back from the hit source.
#[derive(Debug, Clone)]
pub struct ClusterProjection {
    pub path: String,
    pub field_type: FieldType,
    pub converter: ProjectionConverter,
    pub convert: ValueConvert,
}

#[derive(Debug, Clone)]
pub enum ClusterPredicateFactory {
    Text {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
    Keyword {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
    Value {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
    GeoPoint {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
}

#[derive(Debug, Clone)]
pub enum ClusterSortFactory {
    Standard {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
    GeoPoint {
        descriptor: Arc<FieldCapabilityDescriptor>,
    },
}

#[derive(Debug, Clone)]
pub struct ClusterProjectionFactory {
    descriptor: Arc<FieldCapabilityDescriptor>,
}

pub(crate) fn create_factories(
    descriptor: &Arc<FieldCapabilityDescriptor>,
) -> FieldBuilderFactories<ClusterBackend> {
    let descriptor = Arc::clone(descriptor);
    let predicate = match descriptor.field_type() {
        FieldType::Text => ClusterPredicateFactory::Text {
            descriptor: Arc::clone(&descriptor),
        },
        FieldType::Keyword => ClusterPredicateFactory::Keyword {
            descriptor: Arc::clone(&descriptor),
        },
        FieldType::GeoPoint => ClusterPredicateFactory::GeoPoint {
            descriptor: Arc::clone(&descriptor),
        },
        _ => ClusterPredicateFactory::Value {
            descriptor: Arc::clone(&descriptor),
        },
    };
    let sort = match descriptor.field_type() {
        FieldType::GeoPoint => ClusterSortFactory::GeoPoint {
            descriptor: Arc::clone(&descriptor),
        },
        _ => ClusterSortFactory::Standard {
            descriptor: Arc::clone(&descriptor),
        },
    };
    FieldBuilderFactories {
        predicate,
        sort,
        projection: ClusterProjectionFactory { descriptor },
    }
}

fn leaf(query: Value) -> PredicateNode<Value> {
    PredicateNode::Leaf(query)
}

fn single(kind: &str, path: &str, body: Value) -> Value {
    let mut field = Map::new();
    field.insert(path.to_string(), body);
    let mut query = Map::new();
    query.insert(kind.to_string(), Value::Object(field));
    Value::Object(query)
}

fn geo_json(point: &GeoPoint) -> Value {
    json!({ "lat": point.lat, "lon": point.lon })
}

fn order_json(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    }
}

impl FieldPredicateBuilderFactory for ClusterPredicateFactory {
    type Leaf = Value;

    fn descriptor(&self) -> &FieldCapabilityDescriptor {
        match self {
            ClusterPredicateFactory::Text { descriptor }
            | ClusterPredicateFactory::Keyword { descriptor }
            | ClusterPredicateFactory::Value { descriptor }
            | ClusterPredicateFactory::GeoPoint { descriptor } => descriptor,
        }
    }

    fn create_match_predicate(
        &self,
        path: &str,
        value: &FieldValue,
        convert: ValueConvert,
    ) -> Result<PredicateNode<Value>> {
        let value = to_index_value(self.descriptor(), path, value, convert)?;
        match self {
            ClusterPredicateFactory::Text { .. } => Ok(leaf(single(
                "match",
                path,
                json!({ "query": value_to_json(&value) }),
            ))),
            ClusterPredicateFactory::Keyword { .. } | ClusterPredicateFactory::Value { .. } => {
                Ok(leaf(single("term", path, value_to_json(&value))))
            }
            ClusterPredicateFactory::GeoPoint { descriptor } => {
                Err(unsupported_predicate("match", path, descriptor))
            }
        }
    }

    fn create_range_predicate(
        &self,
        path: &str,
        range: &ValueRange,
        convert: ValueConvert,
    ) -> Result<PredicateNode<Value>> {
        if let ClusterPredicateFactory::GeoPoint { descriptor } = self {
            return Err(unsupported_predicate("range", path, descriptor));
        }
        let descriptor = self.descriptor();
        let mut body = Map::new();
        for (bound, inclusive, exclusive) in [(&range.lower, "gte", "gt"), (&range.upper, "lte", "lt")] {
            match bound {
                Bound::Included(v) => {
                    let v = to_index_value(descriptor, path, v, convert)?;
                    body.insert(inclusive.to_string(), value_to_json(&v));
                }
                Bound::Excluded(v) => {
                    let v = to_index_value(descriptor, path, v, convert)?;
                    body.insert(exclusive.to_string(), value_to_json(&v));
                }
                Bound::Unbounded => {}
            }
        }
        Ok(leaf(single("range", path, Value::Object(body))))
    }

    fn create_spatial_within_circle_predicate(
        &self,
        path: &str,
        center: &GeoPoint,
        radius_meters: f64,
    ) -> Result<PredicateNode<Value>> {
        match self {
            ClusterPredicateFactory::GeoPoint { .. } => {
                let mut body = Map::new();
                body.insert("distance".to_string(), json!(format!("{radius_meters}m")));
                body.insert(path.to_string(), geo_json(center));
                Ok(leaf(json!({ "geo_distance": Value::Object(body) })))
            }
            other => Err(unsupported_predicate("spatial", path, other.descriptor())),
        }
    }

    fn create_text_predicate(
        &self,
        path: &str,
        query: &TextQuery,
    ) -> Result<Option<PredicateNode<Value>>> {
        if !matches!(self, ClusterPredicateFactory::Text { .. }) {
            return Err(unsupported_predicate(
                "simple query string",
                path,
                self.descriptor(),
            ));
        }
        let query = match query {
            TextQuery::Term { text, operator } => {
                if text.trim().is_empty() {
                    return Ok(None);
                }
                let operator = match operator {
                    DefaultOperator::Or => "or",
                    DefaultOperator::And => "and",
                };
                single("match", path, json!({ "query": text, "operator": operator }))
            }
            TextQuery::Prefix(text) => single("prefix", path, json!(text.to_lowercase())),
            TextQuery::Fuzzy { text, max_edits } => single(
                "fuzzy",
                path,
                json!({ "value": text.to_lowercase(), "fuzziness": max_edits }),
            ),
            TextQuery::Phrase { text, slop } => {
                single("match_phrase", path, json!({ "query": text, "slop": slop }))
            }
        };
        Ok(Some(leaf(query)))
    }
}

impl FieldSortBuilderFactory for ClusterSortFactory {
    type Leaf = Value;

    fn descriptor(&self) -> &FieldCapabilityDescriptor {
        match self {
            ClusterSortFactory::Standard { descriptor }
            | ClusterSortFactory::GeoPoint { descriptor } => descriptor,
        }
    }

    fn create_field_sort(
        &self,
        path: &str,
        order: SortOrder,
        missing: &MissingValue,
        convert: ValueConvert,
    ) -> Result<Value> {
        let descriptor = match self {
            ClusterSortFactory::GeoPoint { .. } => {
                return Err(SpathaError::TraditionalSortNotSupportedByGeoPoint {
                    path: path.to_string(),
                });
            }
            ClusterSortFactory::Standard { descriptor } => descriptor,
        };
        check_sortable(descriptor, path)?;
        let missing = match missing {
            MissingValue::First => json!("_first"),
            MissingValue::Last => json!("_last"),
            MissingValue::Use(value) => value_to_json(&to_index_value(descriptor, path, value, convert)?),
        };
        let mut sort = Map::new();
        sort.insert(
            path.to_string(),
            json!({ "order": order_json(order), "missing": missing }),
        );
        Ok(Value::Object(sort))
    }

    fn create_distance_sort(&self, path: &str, center: &GeoPoint, order: SortOrder) -> Result<Value> {
        match self {
            ClusterSortFactory::Standard { descriptor } => {
                Err(SpathaError::DistanceSortNotSupported {
                    path: path.to_string(),
                    field_type: descriptor.field_type().to_string(),
                })
            }
            ClusterSortFactory::GeoPoint { descriptor } => {
                check_sortable(descriptor, path)?;
                let mut body = Map::new();
                body.insert(path.to_string(), geo_json(center));
                body.insert("order".to_string(), json!(order_json(order)));
                body.insert("unit".to_string(), json!("m"));
                Ok(json!({ "_geo_distance": Value::Object(body) }))
            }
        }
    }
}

impl FieldProjectionBuilderFactory for ClusterProjectionFactory {
    type Leaf = ClusterProjection;

    fn descriptor(&self) -> &FieldCapabilityDescriptor {
        &self.descriptor
    }

    fn create_field_projection(&self, path: &str, convert: ValueConvert) -> Result<ClusterProjection> {
        if !self.descriptor.is_projectable() {
            return Err(SpathaError::UnprojectableField {
                path: path.to_string(),
            });
        }
        Ok(ClusterProjection {
            path: path.to_string(),
            field_type: self.descriptor.field_type(),
            converter: self.descriptor.projection_converter().clone(),
            convert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::IndexField;

    fn factories(field: IndexField) -> FieldBuilderFactories<ClusterBackend> {
        create_factories(&Arc::new(field.into_descriptor().unwrap()))
    }

    #[test]
    fn test_range_bounds() {
        let f = factories(IndexField::integer("pages"));
        let node = f
            .predicate
            .create_range_predicate(
                "pages",
                &ValueRange {
                    lower: Bound::Excluded(FieldValue::from(10_i64)),
                    upper: Bound::Included(FieldValue::from(20_i64)),
                },
                ValueConvert::Yes,
            )
            .unwrap();
        assert_eq!(
            node,
            PredicateNode::Leaf(json!({ "range": { "pages": { "gt": 10, "lte": 20 } } }))
        );
    }

    #[test]
    fn test_field_sort_missing() {
        let f = factories(IndexField::keyword("code").sortable(true));
        let sort = f
            .sort
            .create_field_sort("code", SortOrder::Desc, &MissingValue::First, ValueConvert::Yes)
            .unwrap();
        assert_eq!(sort, json!({ "code": { "order": "desc", "missing": "_first" } }));
    }

    #[test]
    fn test_geo_point_field_sort_is_rejected() {
        let f = factories(IndexField::geo_point("location").sortable(true));
        assert!(matches!(
            f.sort
                .create_field_sort("location", SortOrder::Asc, &MissingValue::Last, ValueConvert::Yes),
            Err(SpathaError::TraditionalSortNotSupportedByGeoPoint { .. })
        ));
    }

    #[test]
    fn test_phrase_leaf() {
        let f = factories(IndexField::text("title"));
        let node = f
            .predicate
            .create_text_predicate(
                "title",
                &TextQuery::Phrase {
                    text: "quick fox".to_string(),
                    slop: 1,
                },
            )
            .unwrap();
        assert_eq!(
            node,
            Some(PredicateNode::Leaf(
                json!({ "match_phrase": { "title": { "query": "quick fox", "slop": 1 } } })
            ))
        );
    }
}
