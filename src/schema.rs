//! Index schemas and per-field capability metadata.
//!
//! A schema is built once per index when the mapping is bootstrapped. Every
//! field is described by an immutable
//! [`descriptor::FieldCapabilityDescriptor`], which both the document
//! validation on the write side and the builder factories on the query side
//! consume.

pub mod converter;
pub mod descriptor;
pub mod field;
#[allow(clippy::module_inception)]
pub mod schema;

pub use self::converter::{DslConverter, ProjectionConverter, ValueConvert};
pub use self::descriptor::{FieldCapabilityDescriptor, OperationKind};
pub use self::field::{Analysis, FieldType, IndexField};
pub use self::schema::{IndexSchema, IndexSchemaBuilder};
