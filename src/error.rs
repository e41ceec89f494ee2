//! Error types for the Spatha library.
//!
//! All failures are represented by the [`SpathaError`] enum. Variants raised
//! while building a query (unknown fields, capability mismatches, conflicts
//! between indexes) are reported before any backend round-trip; document build
//! failures are collected per entity and reported together once a batch has
//! been processed; backend write failures are passed through unmodified.
//!
//! # Examples
//!
//! ```
//! use spatha::error::{Result, SpathaError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(SpathaError::UnsortableField {
//!         path: "title".to_string(),
//!     })
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::fmt;
use std::io;

use thiserror::Error;

use crate::schema::descriptor::OperationKind;

/// The main error type for Spatha operations.
#[derive(Error, Debug)]
pub enum SpathaError {
    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The entity type is neither mapped to an index nor embedded in an indexed type.
    #[error("Entity type '{entity_type}' is not indexed, neither directly nor through an embedding type")]
    NotIndexed { entity_type: String },

    /// The field path is not declared by any of the targeted indexes.
    #[error("Unknown field '{path}' in indexes {}", IndexNames(.indexes))]
    UnknownField { path: String, indexes: Vec<String> },

    /// Sorting was requested on a field that is not sortable.
    #[error("Sorting is not enabled for field '{path}'. Make sure the field is marked as sortable")]
    UnsortableField { path: String },

    /// A projection was requested on a field that is not projectable.
    #[error("Projections are not enabled for field '{path}'. Make sure the field is marked as projectable")]
    UnprojectableField { path: String },

    /// Geo-point fields only support distance sorts.
    #[error("Traditional sorting is not supported by geo-point field '{path}', use a distance sort instead")]
    TraditionalSortNotSupportedByGeoPoint { path: String },

    /// Distance sorts are only supported by geo-point fields.
    #[error("Distance sorting is not supported by field '{path}' of type {field_type}")]
    DistanceSortNotSupported { path: String, field_type: String },

    /// The predicate is not supported by the field type.
    #[error("{predicate} predicates are not supported by field '{path}' of type {field_type}")]
    UnsupportedPredicate {
        predicate: &'static str,
        path: String,
        field_type: String,
    },

    /// Targeted indexes declare the same field with incompatible capabilities.
    #[error("Multiple conflicting types to build a {kind} for field '{path}' in indexes {}", IndexNames(.indexes))]
    ConflictingFieldCapabilities {
        path: String,
        kind: OperationKind,
        indexes: Vec<String>,
    },

    /// A simple query string predicate was given no input.
    #[error("Invalid simple query string on field '{path}': the string to match must be non-null")]
    InvalidQueryStringInput { path: String },

    /// A value does not fit the declared type of a field.
    #[error("Invalid value for field '{path}': {message}")]
    InvalidFieldValue { path: String, message: String },

    /// Documents could not be built for one or more entities.
    #[error("Failed to build {} document(s): {}", .0.len(), FailureList(.0))]
    DocumentBuildFailures(Vec<DocumentBuildFailure>),

    /// Failure reported by a search backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Mapping-related errors.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Schema-related errors.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Analysis-related errors (unknown analyzers, tokenization).
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Query-related errors.
    #[error("Query error: {0}")]
    Query(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SpathaError.
pub type Result<T> = std::result::Result<T, SpathaError>;

/// The failure to build the document of a single entity.
#[derive(Debug)]
pub struct DocumentBuildFailure {
    /// The entity type whose document could not be built.
    pub entity_type: String,
    /// The identifier of the entity.
    pub entity_id: String,
    /// The index the document was meant for.
    pub index: String,
    /// The underlying cause.
    pub cause: Box<SpathaError>,
}

impl fmt::Display for DocumentBuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} (index '{}'): {}",
            self.entity_type, self.entity_id, self.index, self.cause
        )
    }
}

struct IndexNames<'a>(&'a [String]);

impl fmt::Display for IndexNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}'")?;
        }
        write!(f, "]")
    }
}

struct FailureList<'a>(&'a [DocumentBuildFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl SpathaError {
    /// Create a new backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        SpathaError::Backend(msg.into())
    }

    /// Create a new mapping error.
    pub fn mapping<S: Into<String>>(msg: S) -> Self {
        SpathaError::Mapping(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        SpathaError::Schema(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        SpathaError::Analysis(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        SpathaError::Query(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SpathaError::Other(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        SpathaError::Other(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new invalid field value error.
    pub fn invalid_value<P: Into<String>, S: Into<String>>(path: P, msg: S) -> Self {
        SpathaError::InvalidFieldValue {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// The index names carried by this error, if any.
    pub fn index_names(&self) -> &[String] {
        match self {
            SpathaError::UnknownField { indexes, .. }
            | SpathaError::ConflictingFieldCapabilities { indexes, .. } => indexes,
            _ => &[],
        }
    }
}
