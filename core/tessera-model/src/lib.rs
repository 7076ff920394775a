//! Record model for Tessera.
//!
//! Defines everything about a record that does not need the store:
//! - [`EntityType`]: declares a type's attributes and relationships
//! - [`Record`]: one entity instance with its attribute layers and relationships
//! - [`RecordState`]: the lifecycle state machine records move through
//! - [`Snapshot`]: immutable view of a record handed to adapters
//! - [`Errors`]: per-attribute validation messages
//! - [`ResourceData`]: a payload normalized against an entity type
//!
//! Nothing here performs I/O. The store crate drives records through their
//! lifecycle in response to adapter results.

mod error;
mod errors;
mod record;
mod resource;
mod schema;
mod snapshot;
mod state;

pub use error::{ModelError, ModelResult};
pub use errors::{Errors, ValidationMessage};
pub use record::{AttributeChange, Record, RelationshipState};
pub use resource::ResourceData;
pub use schema::{AttributeDef, AttributeKind, EntityType, RelationshipDef, RelationshipKind};
pub use snapshot::{RelationshipData, Snapshot};
pub use state::{DeletedPhase, DirtyPhase, RecordEvent, RecordState};
