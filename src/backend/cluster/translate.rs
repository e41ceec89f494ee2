//! Translation between query trees, documents and the cluster JSON DSL.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use crate::backend::cluster::factory::ClusterProjection;
use crate::backend::work::DocumentWork;
use crate::document::document::Document;
use crate::document::field_value::FieldValue;
use crate::document::reference::DocumentReference;
use crate::error::{Result, SpathaError};
use crate::query::predicate::PredicateNode;
use crate::query::projection::{ProjectionNode, ProjectionValue};
use crate::query::search_query::{SearchHit, SearchResult};
use crate::query::sort::{SortNode, SortOrder};
use crate::schema::field::FieldType;
use crate::spatial::GeoPoint;

/// Largest page the cluster serves in one request.
pub const MAX_RESULT_WINDOW: usize = 10_000;

pub(crate) fn value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => json!(s),
        FieldValue::Integer(i) => json!(i),
        FieldValue::Double(d) => json!(d),
        FieldValue::Boolean(b) => json!(b),
        FieldValue::DateTime(dt) => json!(dt.to_rfc3339()),
        FieldValue::Geo(p) => json!({ "lat": p.lat, "lon": p.lon }),
    }
}

/// Read a source value back as a value of `field_type`.
pub(crate) fn json_to_value(field_type: FieldType, path: &str, value: &Value) -> Result<FieldValue> {
    let invalid = || {
        SpathaError::invalid_value(path, format!("cannot read {value} as a {field_type} value"))
    };
    Ok(match field_type {
        FieldType::Text | FieldType::Keyword => {
            FieldValue::Text(value.as_str().ok_or_else(invalid)?.to_string())
        }
        FieldType::Integer => FieldValue::Integer(value.as_i64().ok_or_else(invalid)?),
        FieldType::Double => FieldValue::Double(value.as_f64().ok_or_else(invalid)?),
        FieldType::Boolean => FieldValue::Boolean(value.as_bool().ok_or_else(invalid)?),
        FieldType::DateTime => {
            let text = value.as_str().ok_or_else(invalid)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|_| invalid())?;
            FieldValue::DateTime(parsed.with_timezone(&Utc))
        }
        FieldType::GeoPoint => {
            let lat = value.get("lat").and_then(Value::as_f64).ok_or_else(invalid)?;
            let lon = value.get("lon").and_then(Value::as_f64).ok_or_else(invalid)?;
            FieldValue::Geo(GeoPoint::new(lat, lon)?)
        }
    })
}

pub fn predicate_to_json(node: &PredicateNode<Value>) -> Value {
    match node {
        PredicateNode::MatchAll => json!({ "match_all": {} }),
        PredicateNode::MatchNone => json!({ "match_none": {} }),
        PredicateNode::Leaf(query) => query.clone(),
        PredicateNode::Bool(node) => {
            let mut body = Map::new();
            for (occur, clauses) in [
                ("must", &node.must),
                ("should", &node.should),
                ("must_not", &node.must_not),
                ("filter", &node.filter),
            ] {
                if !clauses.is_empty() {
                    body.insert(
                        occur.to_string(),
                        Value::Array(clauses.iter().map(predicate_to_json).collect()),
                    );
                }
            }
            if let Some(minimum) = node.minimum_should_match {
                body.insert("minimum_should_match".to_string(), json!(minimum));
            }
            json!({ "bool": Value::Object(body) })
        }
        PredicateNode::Scored {
            inner,
            boost,
            constant_score,
        } => {
            if *constant_score {
                json!({ "constant_score": { "filter": predicate_to_json(inner), "boost": boost } })
            } else {
                json!({ "bool": { "must": [predicate_to_json(inner)], "boost": boost } })
            }
        }
    }
}

pub fn sort_to_json(sort: &SortNode<Value>) -> Value {
    match sort {
        SortNode::Score(order) => {
            let order = match order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            json!({ "_score": { "order": order } })
        }
        SortNode::IndexOrder => json!("_doc"),
        SortNode::Field(sort) => sort.clone(),
    }
}

/// Body of a search request.
pub fn search_body(
    predicate: &PredicateNode<Value>,
    sorts: &[SortNode<Value>],
    projections: &[ProjectionNode<ClusterProjection>],
    limit: usize,
    offset: usize,
) -> Value {
    let mut body = Map::new();
    body.insert("query".to_string(), predicate_to_json(predicate));
    body.insert("from".to_string(), json!(offset));
    body.insert("size".to_string(), json!(limit.min(MAX_RESULT_WINDOW)));
    body.insert("track_total_hits".to_string(), json!(true));
    if !sorts.is_empty() {
        body.insert(
            "sort".to_string(),
            Value::Array(sorts.iter().map(sort_to_json).collect()),
        );
    }
    let fields: Vec<Value> = projections
        .iter()
        .filter_map(|p| match p {
            ProjectionNode::Field(field) => Some(json!(field.path)),
            _ => None,
        })
        .collect();
    if fields.is_empty() {
        body.insert("_source".to_string(), json!(false));
    } else {
        body.insert("_source".to_string(), Value::Array(fields));
    }
    Value::Object(body)
}

fn hit_values(
    source: Option<&Value>,
    projection: &ClusterProjection,
) -> Result<Vec<FieldValue>> {
    let raw = match source.and_then(|s| s.get(&projection.path)) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(values)) => values.iter().collect::<Vec<_>>(),
        Some(value) => vec![value],
    };
    raw.into_iter()
        .map(|v| {
            let value = json_to_value(projection.field_type, &projection.path, v)?;
            projection.converter.convert(&value, projection.convert)
        })
        .collect()
}

/// Parse a search response into hits.
pub fn parse_response(
    response: &Value,
    projections: &[ProjectionNode<ClusterProjection>],
) -> Result<SearchResult> {
    let hits = response
        .get("hits")
        .ok_or_else(|| SpathaError::backend("Search response has no 'hits' section"))?;
    let total = hits.get("total");
    let total_hit_count = total
        .and_then(|t| t.get("value").or(Some(t)))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    let mut parsed = Vec::new();
    for hit in hits.get("hits").and_then(Value::as_array).into_iter().flatten() {
        let index = hit.get("_index").and_then(Value::as_str);
        let id = hit.get("_id").and_then(Value::as_str);
        let (Some(index), Some(id)) = (index, id) else {
            return Err(SpathaError::backend(format!("Malformed search hit: {hit}")));
        };
        let reference = DocumentReference::new(index, id);
        let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let source = hit.get("_source");
        let mut values = Vec::with_capacity(projections.len());
        for projection in projections {
            values.push(match projection {
                ProjectionNode::DocumentReference => ProjectionValue::Reference(reference.clone()),
                ProjectionNode::Score => ProjectionValue::Score(score),
                ProjectionNode::Field(field) => ProjectionValue::Values(hit_values(source, field)?),
            });
        }
        parsed.push(SearchHit {
            reference,
            score,
            projections: values,
        });
    }
    Ok(SearchResult {
        total_hit_count,
        hits: parsed,
    })
}

/// Source of a document: one key per field path, multi-valued fields as arrays.
pub fn document_to_json(document: &Document) -> Value {
    let mut source = Map::new();
    for (path, values) in document.fields() {
        let value = match values {
            [single] => value_to_json(single),
            many => Value::Array(many.iter().map(value_to_json).collect()),
        };
        source.insert(path.to_string(), value);
    }
    Value::Object(source)
}

/// Bulk lines of a batch of writes.
pub fn bulk_operations(index: &str, works: &[DocumentWork]) -> Vec<Value> {
    let mut operations = Vec::with_capacity(works.len() * 2);
    for work in works {
        match work {
            DocumentWork::Add { id, document } => {
                operations.push(json!({ "create": { "_index": index, "_id": id } }));
                operations.push(document_to_json(document));
            }
            DocumentWork::Update { id, document } => {
                operations.push(json!({ "index": { "_index": index, "_id": id } }));
                operations.push(document_to_json(document));
            }
            DocumentWork::Delete { id } => {
                operations.push(json!({ "delete": { "_index": index, "_id": id } }));
            }
        }
    }
    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::{BoolNode, PredicateOptions};
    use crate::schema::converter::{ProjectionConverter, ValueConvert};

    #[test]
    fn test_bool_and_boost() {
        let node = PredicateNode::Bool(BoolNode {
            must: vec![PredicateNode::MatchAll],
            must_not: vec![PredicateNode::Leaf(json!({ "term": { "code": "x" } }))],
            ..BoolNode::default()
        })
        .with_options(PredicateOptions::default().boost(2.0));
        assert_eq!(
            predicate_to_json(&node),
            json!({ "bool": { "must": [{ "bool": {
                "must": [{ "match_all": {} }],
                "must_not": [{ "term": { "code": "x" } }]
            } }], "boost": 2.0 } })
        );
    }

    #[test]
    fn test_constant_score() {
        let node = PredicateNode::MatchAll.with_options(PredicateOptions::default().constant_score());
        assert_eq!(
            predicate_to_json(&node),
            json!({ "constant_score": { "filter": { "match_all": {} }, "boost": 1.0 } })
        );
    }

    #[test]
    fn test_search_body_clamps_size() {
        let body = search_body(
            &PredicateNode::MatchAll,
            &[],
            &[ProjectionNode::DocumentReference],
            usize::MAX,
            5,
        );
        assert_eq!(body["size"], json!(MAX_RESULT_WINDOW));
        assert_eq!(body["from"], json!(5));
        assert_eq!(body["_source"], json!(false));
        assert!(body.get("sort").is_none());
    }

    #[test]
    fn test_parse_response() {
        let response = json!({
            "hits": {
                "total": { "value": 7, "relation": "eq" },
                "hits": [
                    { "_index": "books", "_id": "1", "_score": 1.5, "_source": { "pages": [120, 130] } },
                    { "_index": "books", "_id": "2", "_score": null, "_source": {} }
                ]
            }
        });
        let projections = vec![
            ProjectionNode::DocumentReference,
            ProjectionNode::Field(ClusterProjection {
                path: "pages".to_string(),
                field_type: FieldType::Integer,
                converter: ProjectionConverter::Passthrough,
                convert: ValueConvert::Yes,
            }),
        ];
        let result = parse_response(&response, &projections).unwrap();
        assert_eq!(result.total_hit_count, 7);
        assert_eq!(result.ids(), vec!["1", "2"]);
        assert_eq!(result.hits[0].score, 1.5);
        assert_eq!(
            result.hits[0].projections[1],
            ProjectionValue::Values(vec![FieldValue::Integer(120), FieldValue::Integer(130)])
        );
        assert_eq!(result.hits[1].projections[1], ProjectionValue::Values(Vec::new()));
    }

    #[test]
    fn test_bulk_operations() {
        let mut document = Document::new();
        document.add_value("title", FieldValue::from("Dune"));
        let works = vec![
            DocumentWork::Update {
                id: "1".to_string(),
                document,
            },
            DocumentWork::Delete { id: "2".to_string() },
        ];
        let ops = bulk_operations("books", &works);
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], json!({ "index": { "_index": "books", "_id": "1" } }));
        assert_eq!(ops[1], json!({ "title": "Dune" }));
        assert_eq!(ops[2], json!({ "delete": { "_index": "books", "_id": "2" } }));
    }
}
