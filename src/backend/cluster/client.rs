//! Transport of the cluster backend.

use std::fmt::Debug;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;

/// Sends requests to a remote search cluster.
///
/// Implementations own the wire protocol (HTTP, authentication, retries).
/// Request and response bodies follow the cluster JSON query DSL.
pub trait ClusterClient: Send + Sync + Debug {
    /// Run a search request against `indexes` and return the raw response body.
    fn search(&self, indexes: &[String], body: Value) -> Result<Value>;

    /// Send bulk operations for one index.
    ///
    /// `operations` alternates action lines and document sources, as in the
    /// cluster bulk API. The future completes once the cluster acknowledged
    /// every operation.
    fn bulk(&self, index: &str, operations: Vec<Value>) -> BoxFuture<'static, Result<()>>;
}
