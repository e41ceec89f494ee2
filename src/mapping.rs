//! Entity-to-index mapping.
//!
//! The mapping is declared once, at startup, as a static table: every entity
//! type lists its [`contribution::MappingContribution`]s (indexed, document id,
//! fields, embedded associations, containing associations). Supertype
//! mappings are merged into their subtypes when the table is built, so no
//! type hierarchy is walked afterwards.
//!
//! ```
//! use std::sync::Arc;
//!
//! use spatha::backend::local::LocalBackend;
//! use spatha::config::LocalBackendConfig;
//! use spatha::document::FieldValue;
//! use spatha::mapping::MappingRegistry;
//! use spatha::schema::{IndexField, IndexSchema};
//!
//! struct Book {
//!     id: i64,
//!     title: String,
//! }
//!
//! let backend = LocalBackend::new(LocalBackendConfig::default());
//! let index = backend
//!     .create_index(IndexSchema::builder("books").field(IndexField::text("title")).build().unwrap())
//!     .unwrap();
//!
//! let registry = MappingRegistry::builder()
//!     .entity::<Book, _>("Book", |m| {
//!         m.indexed("books")
//!             .document_id(|b: &Book| b.id)
//!             .field("title", |b: &Book| Some(FieldValue::from(b.title.as_str())))
//!     })
//!     .index_manager(index)
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.is_indexed_or_embedded("Book"));
//! ```

pub mod contribution;
pub mod entity;
pub mod registry;

pub use self::contribution::MappingContribution;
pub use self::entity::{EntityId, EntityKey, EntityRef, IdKind};
pub use self::registry::{EntityMapping, MappingRegistry, MappingRegistryBuilder, TypeMapping};
