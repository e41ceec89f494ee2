//! Session-scoped indexing and loading.
//!
//! A [`session::SearchSession`] owns one [`write_plan::SearchWritePlan`] that
//! turns entity changes into index writes, and loads entities back from
//! search hits through an [`loader::EntityLoader`].

pub mod loader;
pub mod session;
pub mod write_plan;

pub use self::loader::{EntityLoader, EntityLoadingResult, EntityStore};
pub use self::session::{SearchSession, SearchSessionFactory};
pub use self::write_plan::{PendingWork, SearchWritePlan, WritePlanState};
