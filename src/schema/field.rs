//! Field types and field definitions for schema construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;
use crate::error::{Result, SpathaError};
use crate::schema::converter::{DslConverter, ProjectionConverter};
use crate::schema::descriptor::FieldCapabilityDescriptor;

/// The declared type of an index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Analyzed full-text string.
    Text,
    /// Non-analyzed (optionally normalized) string.
    Keyword,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point.
    Double,
    /// Boolean.
    Boolean,
    /// UTC timestamp.
    DateTime,
    /// Latitude/longitude pair.
    GeoPoint,
}

impl FieldType {
    /// Check whether a value can be stored in a field of this type.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldType::Text, FieldValue::Text(_))
                | (FieldType::Keyword, FieldValue::Text(_))
                | (FieldType::Integer, FieldValue::Integer(_))
                | (FieldType::Double, FieldValue::Double(_))
                | (FieldType::Double, FieldValue::Integer(_))
                | (FieldType::Boolean, FieldValue::Boolean(_))
                | (FieldType::DateTime, FieldValue::DateTime(_))
                | (FieldType::GeoPoint, FieldValue::Geo(_))
        )
    }

    /// Whether values of this type have a natural order usable by range predicates and sorts.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, FieldType::GeoPoint)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Integer => "integer",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::GeoPoint => "geo_point",
        };
        write!(f, "{name}")
    }
}

/// How string values are analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analysis {
    /// Full-text analysis with the named analyzer.
    Analyzer(String),
    /// Single-token normalization with the named normalizer.
    Normalizer(String),
    /// Values are indexed as-is.
    None,
}

/// Definition of a single field, turned into a capability descriptor by the schema builder.
#[derive(Debug, Clone)]
pub struct IndexField {
    path: String,
    field_type: FieldType,
    analysis: Analysis,
    projectable: bool,
    sortable: bool,
    dsl_converter: DslConverter,
    projection_converter: ProjectionConverter,
}

impl IndexField {
    fn new<S: Into<String>>(path: S, field_type: FieldType) -> Self {
        IndexField {
            path: path.into(),
            field_type,
            analysis: Analysis::None,
            projectable: false,
            sortable: false,
            dsl_converter: DslConverter::Passthrough,
            projection_converter: ProjectionConverter::Passthrough,
        }
    }

    /// An analyzed text field; uses the `standard` analyzer unless told otherwise.
    pub fn text<S: Into<String>>(path: S) -> Self {
        let mut field = IndexField::new(path, FieldType::Text);
        field.analysis = Analysis::Analyzer("standard".to_string());
        field
    }

    /// A keyword field.
    pub fn keyword<S: Into<String>>(path: S) -> Self {
        IndexField::new(path, FieldType::Keyword)
    }

    /// An integer field.
    pub fn integer<S: Into<String>>(path: S) -> Self {
        IndexField::new(path, FieldType::Integer)
    }

    /// A double field.
    pub fn double<S: Into<String>>(path: S) -> Self {
        IndexField::new(path, FieldType::Double)
    }

    /// A boolean field.
    pub fn boolean<S: Into<String>>(path: S) -> Self {
        IndexField::new(path, FieldType::Boolean)
    }

    /// A datetime field.
    pub fn datetime<S: Into<String>>(path: S) -> Self {
        IndexField::new(path, FieldType::DateTime)
    }

    /// A geo-point field.
    pub fn geo_point<S: Into<String>>(path: S) -> Self {
        IndexField::new(path, FieldType::GeoPoint)
    }

    /// Set the analyzer of a text field.
    pub fn analyzer<S: Into<String>>(mut self, name: S) -> Self {
        self.analysis = Analysis::Analyzer(name.into());
        self
    }

    /// Set the normalizer of a keyword field.
    pub fn normalizer<S: Into<String>>(mut self, name: S) -> Self {
        self.analysis = Analysis::Normalizer(name.into());
        self
    }

    /// Set whether this field can be projected.
    pub fn projectable(mut self, projectable: bool) -> Self {
        self.projectable = projectable;
        self
    }

    /// Set whether this field can be sorted on.
    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    /// Set the converter applied to values passed to the query DSL.
    pub fn dsl_converter(mut self, converter: DslConverter) -> Self {
        self.dsl_converter = converter;
        self
    }

    /// Set the converter applied to projected values.
    pub fn projection_converter(mut self, converter: ProjectionConverter) -> Self {
        self.projection_converter = converter;
        self
    }

    /// The absolute path of the field.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn into_descriptor(self) -> Result<FieldCapabilityDescriptor> {
        match (&self.field_type, &self.analysis) {
            (FieldType::Text, Analysis::Analyzer(_)) => {}
            (FieldType::Text, _) => {
                return Err(SpathaError::schema(format!(
                    "Text field '{}' requires an analyzer",
                    self.path
                )));
            }
            (FieldType::Keyword, Analysis::Analyzer(_)) => {
                return Err(SpathaError::schema(format!(
                    "Keyword field '{}' cannot have an analyzer, use a normalizer",
                    self.path
                )));
            }
            (FieldType::Keyword, _) => {}
            (_, Analysis::None) => {}
            (other, _) => {
                return Err(SpathaError::schema(format!(
                    "Field '{}' of type {} cannot be analyzed or normalized",
                    self.path, other
                )));
            }
        }
        if self.sortable && self.field_type == FieldType::Text {
            return Err(SpathaError::schema(format!(
                "Text field '{}' cannot be sortable, declare a keyword field instead",
                self.path
            )));
        }

        Ok(FieldCapabilityDescriptor::new(
            self.path,
            self.field_type,
            self.analysis,
            self.projectable,
            self.sortable,
            self.dsl_converter,
            self.projection_converter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_accepts() {
        assert!(FieldType::Text.accepts(&FieldValue::from("x")));
        assert!(FieldType::Double.accepts(&FieldValue::from(1_i64)));
        assert!(!FieldType::Integer.accepts(&FieldValue::from(1.5)));
        assert!(!FieldType::GeoPoint.accepts(&FieldValue::from("48.0,2.0")));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(IndexField::keyword("k").analyzer("standard").into_descriptor().is_err());
        assert!(IndexField::integer("i").normalizer("lowercase").into_descriptor().is_err());
        assert!(IndexField::text("t").sortable(true).into_descriptor().is_err());
        assert!(IndexField::keyword("k").normalizer("lowercase").sortable(true).into_descriptor().is_ok());
    }
}
