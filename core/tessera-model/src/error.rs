//! Error types for the record model.

use crate::state::{RecordEvent, RecordState};
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by records, schemas and payload normalization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The event is not accepted in the record's current state.
    #[error("attempted to handle event `{event:?}` while in state {state}")]
    InvalidTransition {
        state: RecordState,
        event: RecordEvent,
    },

    /// The attribute is not declared on the entity type.
    #[error("'{type_name}' has no attribute named '{name}'")]
    UnknownAttribute { type_name: String, name: String },

    /// The relationship is not declared on the entity type.
    #[error("'{type_name}' has no relationship named '{name}'")]
    UnknownRelationship { type_name: String, name: String },

    /// A payload could not be turned into record data.
    #[error("cannot normalize '{type_name}' payload: {reason}")]
    Normalization { type_name: String, reason: String },

    /// Invalid identifier.
    #[error(transparent)]
    Id(#[from] tessera_types::Error),
}
