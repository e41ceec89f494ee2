//! Sort fragments.

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Where documents without a value for the sorted field end up.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MissingValue {
    First,
    #[default]
    Last,
    /// Use this DSL value in place of the missing one.
    Use(FieldValue),
}

/// A sort whose field-level parts are backend-specific.
#[derive(Debug, Clone, PartialEq)]
pub enum SortNode<S> {
    /// By relevance score.
    Score(SortOrder),
    /// By position in the index.
    IndexOrder,
    /// By field value or distance, built by a backend factory.
    Field(S),
}
