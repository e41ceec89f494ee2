//! Document structure built by document contributors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;

/// A document is the indexed representation of one entity.
///
/// Fields are multi-valued and addressed by their absolute, dot-separated path.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Document {
    fields: HashMap<String, Vec<FieldValue>>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document {
            fields: HashMap::new(),
        }
    }

    /// Append a value to a field.
    pub fn add_value<S: Into<String>>(&mut self, path: S, value: FieldValue) {
        self.fields.entry(path.into()).or_default().push(value);
    }

    /// All values of a field, in insertion order.
    pub fn values(&self, path: &str) -> &[FieldValue] {
        self.fields.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first value of a field.
    pub fn first(&self, path: &str) -> Option<&FieldValue> {
        self.values(path).first()
    }

    /// Check if the document has a field.
    pub fn has_field(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    /// Iterate over field paths and their values.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[FieldValue])> + '_ {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Mutable handle on a document, scoped to an object path.
///
/// Document contributors write relative field names; children created with
/// [`DocumentElement::child`] prefix every path they write, which is how
/// embedded entities end up under `authors.name` and the like.
#[derive(Debug)]
pub struct DocumentElement<'a> {
    document: &'a mut Document,
    prefix: String,
}

impl<'a> DocumentElement<'a> {
    /// Create a root element writing to the given document.
    pub fn new(document: &'a mut Document) -> Self {
        DocumentElement {
            document,
            prefix: String::new(),
        }
    }

    /// Append a value to the field at `name`, relative to this element.
    pub fn add_value(&mut self, name: &str, value: FieldValue) {
        let path = self.absolute_path(name);
        self.document.add_value(path, value);
    }

    /// Create a child element for an object field.
    pub fn child(&mut self, name: &str) -> DocumentElement<'_> {
        let prefix = self.absolute_path(name);
        DocumentElement {
            document: &mut *self.document,
            prefix,
        }
    }

    /// The absolute path prefix of this element; empty for the root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn absolute_path(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }
}
