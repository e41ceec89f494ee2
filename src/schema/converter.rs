//! User-supplied conversions between domain values and index field values.
//!
//! Converters are compared by identity (the same `Arc`) or by the equality
//! they declare through `is_compatible_with`, never structurally. Two indexes
//! that register the same converter instance for a field can therefore be
//! queried together, while two separately created closures cannot.

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::document::field_value::FieldValue;
use crate::error::Result;

/// Whether values passed to the DSL (or read back as projections) go through the field converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueConvert {
    /// Apply the field's converter.
    #[default]
    Yes,
    /// Pass raw index values; converter differences between indexes are ignored.
    No,
}

/// Converts a value passed to the query DSL into an index field value.
pub trait ToIndexValueConverter: Send + Sync + Debug {
    /// Convert a DSL value.
    fn convert(&self, value: &FieldValue) -> Result<FieldValue>;

    /// Declared equality with another converter.
    fn is_compatible_with(&self, _other: &dyn ToIndexValueConverter) -> bool {
        false
    }

    /// Get this converter as Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Converts an index field value into the value returned by a projection.
pub trait FromIndexValueConverter: Send + Sync + Debug {
    /// Convert a stored value.
    fn convert(&self, value: &FieldValue) -> Result<FieldValue>;

    /// Declared equality with another converter.
    fn is_compatible_with(&self, _other: &dyn FromIndexValueConverter) -> bool {
        false
    }

    /// Get this converter as Any for downcasting.
    fn as_any(&self) -> &dyn Any;
}

type ConvertFn = dyn Fn(&FieldValue) -> Result<FieldValue> + Send + Sync;

/// A converter backed by a closure.
pub struct FnConverter {
    name: String,
    function: Box<ConvertFn>,
}

impl FnConverter {
    /// Wrap a closure.
    pub fn new<S, F>(name: S, function: F) -> Self
    where
        S: Into<String>,
        F: Fn(&FieldValue) -> Result<FieldValue> + Send + Sync + 'static,
    {
        FnConverter {
            name: name.into(),
            function: Box::new(function),
        }
    }
}

impl Debug for FnConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter").field("name", &self.name).finish()
    }
}

impl ToIndexValueConverter for FnConverter {
    fn convert(&self, value: &FieldValue) -> Result<FieldValue> {
        (self.function)(value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FromIndexValueConverter for FnConverter {
    fn convert(&self, value: &FieldValue) -> Result<FieldValue> {
        (self.function)(value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The DSL converter of a field.
#[derive(Debug, Clone, Default)]
pub enum DslConverter {
    /// Values are used as-is.
    #[default]
    Passthrough,
    /// Values go through a user converter.
    Custom(Arc<dyn ToIndexValueConverter>),
}

impl DslConverter {
    /// Create a custom converter from a closure.
    pub fn from_fn<S, F>(name: S, function: F) -> Self
    where
        S: Into<String>,
        F: Fn(&FieldValue) -> Result<FieldValue> + Send + Sync + 'static,
    {
        DslConverter::Custom(Arc::new(FnConverter::new(name, function)))
    }

    /// Convert a DSL value, unless conversion is disabled.
    pub fn convert(&self, value: &FieldValue, convert: ValueConvert) -> Result<FieldValue> {
        match (self, convert) {
            (DslConverter::Custom(converter), ValueConvert::Yes) => converter.convert(value),
            _ => Ok(value.clone()),
        }
    }

    /// Identity or declared equality.
    pub fn is_compatible_with(&self, other: &DslConverter) -> bool {
        match (self, other) {
            (DslConverter::Passthrough, DslConverter::Passthrough) => true,
            (DslConverter::Custom(a), DslConverter::Custom(b)) => {
                Arc::ptr_eq(a, b) || a.is_compatible_with(b.as_ref())
            }
            _ => false,
        }
    }
}

/// The projection converter of a field.
#[derive(Debug, Clone, Default)]
pub enum ProjectionConverter {
    /// Stored values are returned as-is.
    #[default]
    Passthrough,
    /// Stored values go through a user converter.
    Custom(Arc<dyn FromIndexValueConverter>),
}

impl ProjectionConverter {
    /// Create a custom converter from a closure.
    pub fn from_fn<S, F>(name: S, function: F) -> Self
    where
        S: Into<String>,
        F: Fn(&FieldValue) -> Result<FieldValue> + Send + Sync + 'static,
    {
        ProjectionConverter::Custom(Arc::new(FnConverter::new(name, function)))
    }

    /// Convert a stored value, unless conversion is disabled.
    pub fn convert(&self, value: &FieldValue, convert: ValueConvert) -> Result<FieldValue> {
        match (self, convert) {
            (ProjectionConverter::Custom(converter), ValueConvert::Yes) => {
                converter.convert(value)
            }
            _ => Ok(value.clone()),
        }
    }

    /// Identity or declared equality.
    pub fn is_compatible_with(&self, other: &ProjectionConverter) -> bool {
        match (self, other) {
            (ProjectionConverter::Passthrough, ProjectionConverter::Passthrough) => true,
            (ProjectionConverter::Custom(a), ProjectionConverter::Custom(b)) => {
                Arc::ptr_eq(a, b) || a.is_compatible_with(b.as_ref())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Uppercase;

    impl ToIndexValueConverter for Uppercase {
        fn convert(&self, value: &FieldValue) -> Result<FieldValue> {
            Ok(FieldValue::from(value.to_string().to_uppercase()))
        }

        fn is_compatible_with(&self, other: &dyn ToIndexValueConverter) -> bool {
            other.as_any().is::<Uppercase>()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_identity_comparison() {
        let a = DslConverter::from_fn("wrap", |v| Ok(v.clone()));
        let b = DslConverter::from_fn("wrap", |v| Ok(v.clone()));

        assert!(a.is_compatible_with(&a.clone()));
        assert!(!a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&DslConverter::Passthrough));
        assert!(DslConverter::Passthrough.is_compatible_with(&DslConverter::Passthrough));
    }

    #[test]
    fn test_declared_equality() {
        let a = DslConverter::Custom(Arc::new(Uppercase));
        let b = DslConverter::Custom(Arc::new(Uppercase));
        assert!(a.is_compatible_with(&b));
    }

    #[test]
    fn test_raw_conversion_skips_converter() {
        let converter = DslConverter::Custom(Arc::new(Uppercase));
        let value = FieldValue::from("abc");
        assert_eq!(
            converter.convert(&value, ValueConvert::Yes).unwrap(),
            FieldValue::from("ABC")
        );
        assert_eq!(converter.convert(&value, ValueConvert::No).unwrap(), value);
    }
}
