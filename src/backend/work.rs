//! Write SPI: per-index work plans.

use std::fmt::Debug;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::document::document::Document;
use crate::error::Result;
use crate::schema::schema::IndexSchema;

/// One document-level write.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentWork {
    /// Add a document that is not in the index yet.
    Add { id: String, document: Document },
    /// Replace the document with the same id, adding it if absent.
    Update { id: String, document: Document },
    /// Remove the document with this id, if present.
    Delete { id: String },
}

impl DocumentWork {
    pub fn id(&self) -> &str {
        match self {
            DocumentWork::Add { id, .. }
            | DocumentWork::Update { id, .. }
            | DocumentWork::Delete { id } => id,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentWork::Add { .. } => "add",
            DocumentWork::Update { .. } => "update",
            DocumentWork::Delete { .. } => "delete",
        }
    }
}

/// Writes accumulated for one index, executed together.
pub trait IndexWorkPlan: Send {
    /// Queue a write.
    fn push(&mut self, work: DocumentWork);

    /// Number of queued writes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add(&mut self, id: String, document: Document) {
        self.push(DocumentWork::Add { id, document });
    }

    fn update(&mut self, id: String, document: Document) {
        self.push(DocumentWork::Update { id, document });
    }

    fn delete(&mut self, id: String) {
        self.push(DocumentWork::Delete { id });
    }

    /// Send the queued writes; the future completes when the backend has applied them.
    fn execute(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// A backend index, as seen by write plans.
pub trait IndexManager: Send + Sync + Debug {
    fn index_name(&self) -> &str;

    fn schema(&self) -> &Arc<IndexSchema>;

    /// Start a new, empty work plan.
    fn create_work_plan(&self) -> Box<dyn IndexWorkPlan>;
}
