//! Mapping contributions.
//!
//! Each recognized mapping element of an entity type is one
//! [`MappingContribution`]. Contributions operate on type-erased entities
//! (`&dyn Any`); the typed builder wraps user closures so that they downcast
//! to the declared entity type.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::document::document::DocumentElement;
use crate::document::field_value::FieldValue;
use crate::error::Result;
use crate::mapping::entity::{EntityId, EntityRef, IdKind};

pub type IdFn = Arc<dyn Fn(&dyn Any) -> Option<EntityId> + Send + Sync>;
pub type FieldFn = Arc<dyn Fn(&dyn Any) -> Result<Vec<FieldValue>> + Send + Sync>;
pub type ContributorFn =
    Arc<dyn Fn(&dyn Any, &mut DocumentElement<'_>) -> Result<()> + Send + Sync>;
pub type EmbeddedFn = Arc<dyn for<'a> Fn(&'a dyn Any) -> Vec<&'a dyn Any> + Send + Sync>;
pub type ContainingFn = Arc<dyn Fn(&dyn Any) -> Vec<EntityRef> + Send + Sync>;
/// Access to the supertype part of an entity.
pub type UpcastFn = Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

pub(crate) fn embedded_fn<F>(f: F) -> EmbeddedFn
where
    F: for<'a> Fn(&'a dyn Any) -> Vec<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn upcast_fn<F>(f: F) -> UpcastFn
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One mapping element of an entity type.
#[derive(Clone)]
pub enum MappingContribution {
    /// The type is indexed in `index`. Not inherited by subtypes.
    Indexed { index: String },
    /// The source of the document id.
    DocumentId { kind: IdKind, extract: IdFn },
    /// A field filled from a property of the entity.
    Field { name: String, extract: FieldFn },
    /// Free-form document contributor.
    Contributor(ContributorFn),
    /// Fields of associated entities copied under the `name` prefix.
    IndexedEmbedded {
        name: String,
        target: TypeId,
        max_depth: usize,
        extract: EmbeddedFn,
    },
    /// Entities that embed this one and must be reindexed when it changes.
    ContainedIn { target: TypeId, extract: ContainingFn },
}

impl fmt::Debug for MappingContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingContribution::Indexed { index } => {
                f.debug_struct("Indexed").field("index", index).finish()
            }
            MappingContribution::DocumentId { kind, .. } => {
                f.debug_struct("DocumentId").field("kind", kind).finish()
            }
            MappingContribution::Field { name, .. } => {
                f.debug_struct("Field").field("name", name).finish()
            }
            MappingContribution::Contributor(_) => f.write_str("Contributor"),
            MappingContribution::IndexedEmbedded {
                name, max_depth, ..
            } => f
                .debug_struct("IndexedEmbedded")
                .field("name", name)
                .field("max_depth", max_depth)
                .finish(),
            MappingContribution::ContainedIn { target, .. } => {
                f.debug_struct("ContainedIn").field("target", target).finish()
            }
        }
    }
}

impl MappingContribution {
    /// Whether subtypes inherit this contribution.
    pub fn is_inherited(&self) -> bool {
        !matches!(self, MappingContribution::Indexed { .. })
    }

    /// The same contribution, applied to the supertype part of a subtype entity.
    pub(crate) fn upcast(&self, upcast: &UpcastFn) -> MappingContribution {
        match self {
            MappingContribution::Indexed { index } => MappingContribution::Indexed {
                index: index.clone(),
            },
            MappingContribution::DocumentId { kind, extract } => {
                let (up, extract) = (Arc::clone(upcast), Arc::clone(extract));
                MappingContribution::DocumentId {
                    kind: *kind,
                    extract: Arc::new(move |entity: &dyn Any| up(entity).and_then(|p| extract(p))),
                }
            }
            MappingContribution::Field { name, extract } => {
                let (up, extract) = (Arc::clone(upcast), Arc::clone(extract));
                MappingContribution::Field {
                    name: name.clone(),
                    extract: Arc::new(move |entity: &dyn Any| match up(entity) {
                        Some(p) => extract(p),
                        None => Ok(Vec::new()),
                    }),
                }
            }
            MappingContribution::Contributor(contribute) => {
                let (up, contribute) = (Arc::clone(upcast), Arc::clone(contribute));
                MappingContribution::Contributor(Arc::new(
                    move |entity: &dyn Any, element: &mut DocumentElement<'_>| {
                        match up(entity) {
                            Some(p) => contribute(p, element),
                            None => Ok(()),
                        }
                    },
                ))
            }
            MappingContribution::IndexedEmbedded {
                name,
                target,
                max_depth,
                extract,
            } => {
                let (up, extract) = (Arc::clone(upcast), Arc::clone(extract));
                MappingContribution::IndexedEmbedded {
                    name: name.clone(),
                    target: *target,
                    max_depth: *max_depth,
                    extract: embedded_fn(move |entity| match up(entity) {
                        Some(p) => extract(p),
                        None => Vec::new(),
                    }),
                }
            }
            MappingContribution::ContainedIn { target, extract } => {
                let (up, extract) = (Arc::clone(upcast), Arc::clone(extract));
                MappingContribution::ContainedIn {
                    target: *target,
                    extract: Arc::new(move |entity: &dyn Any| match up(entity) {
                        Some(p) => extract(p),
                        None => Vec::new(),
                    }),
                }
            }
        }
    }
}
