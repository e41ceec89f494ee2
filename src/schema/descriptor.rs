//! Field capability descriptors and the cross-index compatibility checker.

use std::fmt;

use crate::error::{Result, SpathaError};
use crate::schema::converter::{DslConverter, ProjectionConverter, ValueConvert};
use crate::schema::field::{Analysis, FieldType};

/// The kind of query fragment a field is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Value-based predicates (match, range, spatial).
    Predicate,
    /// Full-text predicates (simple query string); DSL converters do not apply.
    TextPredicate,
    /// Sorts.
    Sort,
    /// Projections.
    Projection,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Predicate | OperationKind::TextPredicate => "predicate",
            OperationKind::Sort => "sort",
            OperationKind::Projection => "projection",
        };
        write!(f, "{name}")
    }
}

/// Immutable capability metadata of one index field.
#[derive(Debug, Clone)]
pub struct FieldCapabilityDescriptor {
    path: String,
    field_type: FieldType,
    analysis: Analysis,
    projectable: bool,
    sortable: bool,
    dsl_converter: DslConverter,
    projection_converter: ProjectionConverter,
}

impl FieldCapabilityDescriptor {
    pub(crate) fn new(
        path: String,
        field_type: FieldType,
        analysis: Analysis,
        projectable: bool,
        sortable: bool,
        dsl_converter: DslConverter,
        projection_converter: ProjectionConverter,
    ) -> Self {
        FieldCapabilityDescriptor {
            path,
            field_type,
            analysis,
            projectable,
            sortable,
            dsl_converter,
            projection_converter,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn is_projectable(&self) -> bool {
        self.projectable
    }

    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    pub fn dsl_converter(&self) -> &DslConverter {
        &self.dsl_converter
    }

    pub fn projection_converter(&self) -> &ProjectionConverter {
        &self.projection_converter
    }

    /// Whether both descriptors permit `kind` and agree on everything it depends on.
    ///
    /// The declared type must match exactly. Predicates also require the same
    /// analysis and DSL converter; text predicates ignore the DSL converter;
    /// sorts require both fields sortable and the same DSL converter;
    /// projections require both fields projectable and the same projection
    /// converter.
    pub fn is_compatible(&self, other: &FieldCapabilityDescriptor, kind: OperationKind) -> bool {
        let flags = match kind {
            OperationKind::Predicate | OperationKind::TextPredicate => true,
            OperationKind::Sort => self.sortable && other.sortable,
            OperationKind::Projection => self.projectable && other.projectable,
        };
        flags && self.has_same_shape(other, kind, ValueConvert::Yes)
    }

    /// Type, analysis and converter agreement for `kind`, ignoring capability flags.
    pub fn has_same_shape(
        &self,
        other: &FieldCapabilityDescriptor,
        kind: OperationKind,
        convert: ValueConvert,
    ) -> bool {
        if self.field_type != other.field_type {
            return false;
        }
        let converters = convert == ValueConvert::No
            || match kind {
                OperationKind::Predicate | OperationKind::Sort => {
                    self.dsl_converter.is_compatible_with(&other.dsl_converter)
                }
                OperationKind::TextPredicate => true,
                OperationKind::Projection => self
                    .projection_converter
                    .is_compatible_with(&other.projection_converter),
            };
        let analysis = match kind {
            OperationKind::Predicate | OperationKind::TextPredicate => {
                self.analysis == other.analysis
            }
            OperationKind::Sort | OperationKind::Projection => true,
        };
        converters && analysis
    }
}

/// Reduce the per-index candidates for one field path to a single one.
///
/// Candidates are `(index name, candidate)` pairs for every targeted index that
/// declares the field. The first candidate is kept when every other one is
/// compatible with it; otherwise the conflict names every index in
/// `candidates`, not just the first disagreeing pair.
pub fn reduce_compatible<T, F>(
    path: &str,
    kind: OperationKind,
    candidates: Vec<(String, T)>,
    is_compatible: F,
) -> Result<T>
where
    F: Fn(&T, &T) -> bool,
{
    let index_names: Vec<String> = candidates.iter().map(|(name, _)| name.clone()).collect();
    let mut iter = candidates.into_iter();
    let (_, first) = iter.next().ok_or_else(|| SpathaError::UnknownField {
        path: path.to_string(),
        indexes: Vec::new(),
    })?;
    for (_, other) in iter {
        if !is_compatible(&first, &other) {
            return Err(SpathaError::ConflictingFieldCapabilities {
                path: path.to_string(),
                kind,
                indexes: index_names,
            });
        }
    }
    Ok(first)
}

/// Check that the descriptors declared by several indexes for the same path are compatible.
pub fn check_compatibility(
    path: &str,
    kind: OperationKind,
    descriptors: &[(String, &FieldCapabilityDescriptor)],
) -> Result<()> {
    let candidates = descriptors
        .iter()
        .map(|(name, descriptor)| (name.clone(), *descriptor))
        .collect();
    reduce_compatible(path, kind, candidates, |a, b| a.is_compatible(b, kind)).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::IndexField;

    fn descriptor(field: IndexField) -> FieldCapabilityDescriptor {
        field.into_descriptor().unwrap()
    }

    #[test]
    fn test_type_mismatch_is_incompatible_for_every_kind() {
        let a = descriptor(IndexField::keyword("code").sortable(true).projectable(true));
        let b = descriptor(IndexField::integer("code").sortable(true).projectable(true));
        for kind in [
            OperationKind::Predicate,
            OperationKind::TextPredicate,
            OperationKind::Sort,
            OperationKind::Projection,
        ] {
            assert!(!a.is_compatible(&b, kind));
        }
    }

    #[test]
    fn test_flags_required() {
        let sortable = descriptor(IndexField::integer("n").sortable(true));
        let unsortable = descriptor(IndexField::integer("n"));
        assert!(sortable.is_compatible(&sortable.clone(), OperationKind::Sort));
        assert!(!sortable.is_compatible(&unsortable, OperationKind::Sort));
        assert!(!sortable.is_compatible(&sortable.clone(), OperationKind::Projection));
        assert!(sortable.is_compatible(&unsortable, OperationKind::Predicate));
    }

    #[test]
    fn test_converters_by_identity() {
        let converter = DslConverter::from_fn("wrap", |v| Ok(v.clone()));
        let a = descriptor(IndexField::text("t").dsl_converter(converter.clone()));
        let b = descriptor(IndexField::text("t").dsl_converter(converter));
        let c = descriptor(IndexField::text("t").dsl_converter(DslConverter::from_fn(
            "wrap",
            |v| Ok(v.clone()),
        )));

        assert!(a.is_compatible(&b, OperationKind::Predicate));
        assert!(!a.is_compatible(&c, OperationKind::Predicate));
        assert!(a.is_compatible(&c, OperationKind::TextPredicate));
        assert!(a.has_same_shape(&c, OperationKind::Predicate, ValueConvert::No));
    }

    #[test]
    fn test_analysis_matters_for_predicates_only() {
        let a = descriptor(IndexField::keyword("k").projectable(true));
        let b = descriptor(IndexField::keyword("k").normalizer("lowercase").projectable(true));
        assert!(!a.is_compatible(&b, OperationKind::TextPredicate));
        assert!(a.is_compatible(&b, OperationKind::Projection));
    }

    #[test]
    fn test_check_compatibility_names_all_indexes() {
        let a = descriptor(IndexField::text("title"));
        let b = descriptor(IndexField::text("title"));
        let c = descriptor(IndexField::keyword("title"));
        let err = check_compatibility(
            "title",
            OperationKind::Predicate,
            &[
                ("first".to_string(), &a),
                ("second".to_string(), &b),
                ("third".to_string(), &c),
            ],
        )
        .unwrap_err();

        match err {
            SpathaError::ConflictingFieldCapabilities { path, indexes, .. } => {
                assert_eq!(path, "title");
                assert_eq!(indexes, vec!["first", "second", "third"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
