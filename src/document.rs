//! Index documents and the references that identify them.
//!
//! # Core Components
//!
//! - [`document::Document`] - Multi-valued field-value pairs built for one entity
//! - [`document::DocumentElement`] - Mutable handle handed to document contributors
//! - [`field_value::FieldValue`] - The values a field can hold
//! - [`reference::DocumentReference`] - `(index name, document id)` pair returned by queries
//!
//! # Examples
//!
//! ```
//! use spatha::document::document::{Document, DocumentElement};
//! use spatha::document::field_value::FieldValue;
//!
//! let mut document = Document::new();
//! let mut element = DocumentElement::new(&mut document);
//! element.add_value("title", FieldValue::from("Dune"));
//! element.child("author").add_value("name", FieldValue::from("Herbert"));
//!
//! assert_eq!(document.first("author.name"), Some(&FieldValue::from("Herbert")));
//! ```

#[allow(clippy::module_inception)]
pub mod document;
pub mod field_value;
pub mod reference;

pub use self::document::{Document, DocumentElement};
pub use self::field_value::FieldValue;
pub use self::reference::DocumentReference;
