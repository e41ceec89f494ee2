//! Projection fragments and projected values.

use crate::document::field_value::FieldValue;
use crate::document::reference::DocumentReference;

/// A projection whose field-level parts are backend-specific.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionNode<P> {
    /// The reference of the hit.
    DocumentReference,
    /// The relevance score of the hit.
    Score,
    /// Stored values of a field, built by a backend factory.
    Field(P),
}

/// A projected value.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionValue {
    Reference(DocumentReference),
    Score(f32),
    /// All values of a field, converted; empty when the document has none.
    Values(Vec<FieldValue>),
}

impl ProjectionValue {
    /// The first field value, for single-valued fields.
    pub fn first(&self) -> Option<&FieldValue> {
        match self {
            ProjectionValue::Values(values) => values.first(),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&DocumentReference> {
        match self {
            ProjectionValue::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_score(&self) -> Option<f32> {
        match self {
            ProjectionValue::Score(score) => Some(*score),
            _ => None,
        }
    }
}
