//! Error types for the store layer.

use crate::adapter::{AdapterError, AdapterOp};
use tessera_model::{Errors, ModelError};
use tessera_types::RecordKey;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Errors are `Clone` so a single failed fetch can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A record rejected the operation, or a payload could not be normalized.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// No entity type of that name has been defined.
    #[error("no entity type named '{0}'")]
    UnknownType(String),

    /// The adapter rejected a save with validation errors.
    #[error("The backend rejected the commit because it was invalid: {0}")]
    Invalid(Errors),

    /// The adapter failed for a reason other than validation.
    #[error("adapter error: {0}")]
    Adapter(AdapterError),

    /// The adapter has no record for the requested id.
    #[error("record not found: {0}")]
    NotFound(RecordKey),

    /// A live record already exists under the id given to `create_record`.
    #[error("a record already exists for {0}")]
    DuplicateId(RecordKey),

    /// A pushed or fetched payload carried no id.
    #[error("'{type_name}' payload has no id")]
    MissingId { type_name: String },

    /// The adapter answered a fetch for one id with data for another.
    #[error("requested {requested} but the adapter returned id '{returned}'")]
    IdMismatch { requested: RecordKey, returned: String },

    /// A batched fetch did not return every requested record.
    #[error("find_many for '{type_name}' did not return ids {ids:?}")]
    RecordsMissing { type_name: String, ids: Vec<String> },

    /// A synchronous relationship references records that are not loaded.
    #[error("relationship '{name}' on '{type_name}' references records that are not loaded: {ids:?}")]
    RelationshipNotLoaded {
        type_name: String,
        name: String,
        ids: Vec<String>,
    },

    /// The adapter did not settle within the configured timeout.
    #[error("adapter {op} timed out after {timeout_ms}ms")]
    Timeout { op: AdapterOp, timeout_ms: u64 },
}

impl From<AdapterError> for StoreError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Invalid(errors) => StoreError::Invalid(errors),
            other => StoreError::Adapter(other),
        }
    }
}

impl StoreError {
    /// Whether this is a validation rejection.
    pub fn is_invalid(&self) -> bool {
        matches!(self, StoreError::Invalid(_))
    }

    /// Validation errors carried by an [`StoreError::Invalid`] rejection.
    pub fn validation_errors(&self) -> Option<&Errors> {
        match self {
            StoreError::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}
