//! # Spatha
//!
//! A full-text search integration layer: maps application entities to index
//! documents, keeps indexes in sync with entity changes and runs typed
//! queries against pluggable search backends.
//!
//! ## Features
//!
//! - Static entity-to-index mapping with embedded associations and supertype inheritance
//! - Session write plans with change cascading and two-phase flushing
//! - Query DSL checked against field capabilities, across several indexes
//! - In-process backend with BM25 scoring
//! - Cluster backend speaking a JSON query DSL
//! - Entity loading from search hits

pub mod analysis;
pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod mapping;
pub mod query;
pub mod schema;
pub mod session;
pub mod spatial;
pub mod util;

pub mod prelude {
    pub use crate::backend::cluster::{ClusterBackend, ClusterClient};
    pub use crate::backend::local::LocalBackend;
    pub use crate::backend::work::{DocumentWork, IndexManager, IndexWorkPlan};
    pub use crate::config::{AutomaticIndexingStrategy, SpathaConfig};
    pub use crate::document::{Document, DocumentElement, DocumentReference, FieldValue};
    pub use crate::error::{Result, SpathaError};
    pub use crate::mapping::{EntityId, MappingRegistry};
    pub use crate::query::scope::SearchScope;
    pub use crate::query::spi::SearchBackend;
    pub use crate::schema::{IndexField, IndexSchema};
    pub use crate::session::{EntityStore, SearchSession, SearchWritePlan};
    pub use crate::spatial::GeoPoint;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
