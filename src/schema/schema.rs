//! Index schema: the set of fields an index declares.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::document::document::Document;
use crate::error::{Result, SpathaError};
use crate::schema::descriptor::FieldCapabilityDescriptor;
use crate::schema::field::IndexField;

/// The fields declared by one index, keyed by absolute path.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    index_name: String,
    fields: BTreeMap<String, Arc<FieldCapabilityDescriptor>>,
}

impl IndexSchema {
    /// Start building the schema of an index.
    pub fn builder<S: Into<String>>(index_name: S) -> IndexSchemaBuilder {
        IndexSchemaBuilder {
            index_name: index_name.into(),
            fields: Vec::new(),
        }
    }

    /// The name of the index this schema belongs to.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Look up a field by absolute path.
    pub fn field(&self, path: &str) -> Option<&Arc<FieldCapabilityDescriptor>> {
        self.fields.get(path)
    }

    /// Iterate over all fields in path order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldCapabilityDescriptor>> + '_ {
        self.fields.values()
    }

    /// Check that every field of the document is declared and holds values of the declared type.
    pub fn validate_document(&self, document: &Document) -> Result<()> {
        for (path, values) in document.fields() {
            let descriptor = self.field(path).ok_or_else(|| SpathaError::UnknownField {
                path: path.to_string(),
                indexes: vec![self.index_name.clone()],
            })?;
            if let Some(value) = values.iter().find(|v| !descriptor.field_type().accepts(v)) {
                return Err(SpathaError::invalid_value(
                    path,
                    format!(
                        "expected a {} value, got {}",
                        descriptor.field_type(),
                        value.type_name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`IndexSchema`].
#[derive(Debug)]
pub struct IndexSchemaBuilder {
    index_name: String,
    fields: Vec<IndexField>,
}

impl IndexSchemaBuilder {
    /// Declare a field.
    pub fn field(mut self, field: IndexField) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate the field definitions and build the schema.
    pub fn build(self) -> Result<IndexSchema> {
        let mut fields = BTreeMap::new();
        for field in self.fields {
            let path = field.path().to_string();
            if fields.contains_key(&path) {
                return Err(SpathaError::schema(format!(
                    "Field '{path}' is declared twice in index '{}'",
                    self.index_name
                )));
            }
            fields.insert(path, Arc::new(field.into_descriptor()?));
        }
        Ok(IndexSchema {
            index_name: self.index_name,
            fields,
        })
    }
}
