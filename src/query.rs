//! Backend-agnostic query DSL.
//!
//! Queries are assembled from fragments (predicates, sorts, projections)
//! whose field-level leaves are produced by backend builder factories. A
//! [`scope::SearchScope`] targets one or more indexes of a backend: for every
//! field path a fragment references it resolves the builder factory of each
//! targeted index, checks that they are compatible and uses a single merged
//! factory to build the leaf. Capability and compatibility errors are
//! therefore raised while the query is built, before the backend is called.
//!
//! ```
//! use std::sync::Arc;
//!
//! use spatha::backend::local::LocalBackend;
//! use spatha::config::LocalBackendConfig;
//! use spatha::query::scope::SearchScope;
//! use spatha::schema::{IndexField, IndexSchema};
//!
//! let backend = Arc::new(LocalBackend::new(LocalBackendConfig::default()));
//! let schema = IndexSchema::builder("books")
//!     .field(IndexField::text("title"))
//!     .build()
//!     .unwrap();
//! backend.create_index(schema).unwrap();
//!
//! let scope = SearchScope::new(backend, &["books"]).unwrap();
//! let predicate = scope
//!     .predicate()
//!     .simple_query_string()
//!     .on_field("title")
//!     .matching("dune | arrakis")
//!     .unwrap();
//! let result = scope.query().predicate(predicate).build().fetch(10, 0).unwrap();
//! assert_eq!(result.total_hit_count, 0);
//! ```

pub mod predicate;
pub mod projection;
pub mod query_string;
pub mod scope;
pub mod search_query;
pub mod sort;
pub mod spi;
