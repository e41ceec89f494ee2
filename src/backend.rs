//! Search backends.
//!
//! - [`local`]: an in-process backend with BM25 scoring, one writer thread per index
//! - [`cluster`]: a backend translating queries and writes into the JSON
//!   requests of a remote search cluster, through a [`cluster::ClusterClient`]
//!
//! Both implement the query SPI ([`crate::query::spi::SearchBackend`]) and the
//! write SPI ([`work::IndexManager`]).

pub mod cluster;
pub mod local;
pub mod work;

use crate::document::field_value::FieldValue;
use crate::error::{Result, SpathaError};
use crate::schema::converter::ValueConvert;
use crate::schema::descriptor::FieldCapabilityDescriptor;

/// Convert a DSL value with the field converter and check it fits the field type.
pub(crate) fn to_index_value(
    descriptor: &FieldCapabilityDescriptor,
    path: &str,
    value: &FieldValue,
    convert: ValueConvert,
) -> Result<FieldValue> {
    let converted = descriptor.dsl_converter().convert(value, convert)?;
    if descriptor.field_type().accepts(&converted) {
        Ok(converted)
    } else {
        Err(SpathaError::invalid_value(
            path,
            format!(
                "expected a {} value, got {}",
                descriptor.field_type(),
                converted.type_name()
            ),
        ))
    }
}

/// Error for a predicate the field type cannot support.
pub(crate) fn unsupported_predicate(
    predicate: &'static str,
    path: &str,
    descriptor: &FieldCapabilityDescriptor,
) -> SpathaError {
    SpathaError::UnsupportedPredicate {
        predicate,
        path: path.to_string(),
        field_type: descriptor.field_type().to_string(),
    }
}

/// Error unless the field is sortable.
pub(crate) fn check_sortable(descriptor: &FieldCapabilityDescriptor, path: &str) -> Result<()> {
    if descriptor.is_sortable() {
        Ok(())
    } else {
        Err(SpathaError::UnsortableField {
            path: path.to_string(),
        })
    }
}
