//! References to indexed documents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a single indexed document: the index it lives in and its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentReference {
    index_name: String,
    id: String,
}

impl DocumentReference {
    /// Create a new document reference.
    pub fn new<I: Into<String>, D: Into<String>>(index_name: I, id: D) -> Self {
        DocumentReference {
            index_name: index_name.into(),
            id: id.into(),
        }
    }

    /// The name of the index holding the document.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// The document id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index_name, self.id)
    }
}
