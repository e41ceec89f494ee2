//! Entity identity.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpathaError};

/// A shared handle on a domain entity.
pub type EntityRef = Arc<dyn Any + Send + Sync>;

/// Kind of the identifier of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Long,
    Text,
}

/// The identifier of an entity, also the source of its document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityId {
    Long(i64),
    Text(String),
}

impl EntityId {
    pub fn kind(&self) -> IdKind {
        match self {
            EntityId::Long(_) => IdKind::Long,
            EntityId::Text(_) => IdKind::Text,
        }
    }

    /// Parse a document id back into an entity id of the given kind.
    pub fn parse(kind: IdKind, document_id: &str) -> Result<Self> {
        match kind {
            IdKind::Long => document_id.parse().map(EntityId::Long).map_err(|_| {
                SpathaError::mapping(format!(
                    "Document id '{document_id}' is not a valid long identifier"
                ))
            }),
            IdKind::Text => Ok(EntityId::Text(document_id.to_string())),
        }
    }

    /// The document id derived from this identifier.
    pub fn to_document_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Long(id) => write!(f, "{id}"),
            EntityId::Text(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Long(id)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        EntityId::Long(i64::from(id))
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        EntityId::Long(i64::from(id))
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

/// Identifier types usable as document id sources.
pub trait EntityIdValue: Into<EntityId> {
    const KIND: IdKind;
}

impl EntityIdValue for i64 {
    const KIND: IdKind = IdKind::Long;
}

impl EntityIdValue for i32 {
    const KIND: IdKind = IdKind::Long;
}

impl EntityIdValue for u32 {
    const KIND: IdKind = IdKind::Long;
}

impl EntityIdValue for String {
    const KIND: IdKind = IdKind::Text;
}

/// Identity of an entity within a write plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub entity_type: String,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new<S: Into<String>>(entity_type: S, id: EntityId) -> Self {
        EntityKey {
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_id() {
        assert_eq!(EntityId::parse(IdKind::Long, "42").unwrap(), EntityId::Long(42));
        assert_eq!(
            EntityId::parse(IdKind::Text, "42").unwrap(),
            EntityId::Text("42".to_string())
        );
        assert!(EntityId::parse(IdKind::Long, "abc").is_err());
    }

    #[test]
    fn test_document_id_round_trip() {
        let id = EntityId::from(7_i64);
        assert_eq!(EntityId::parse(id.kind(), &id.to_document_id()).unwrap(), id);
    }
}
