//! Core type definitions for Tessera.
//!
//! This crate defines the identifier types shared by the model and the store:
//! - [`ClientId`]: store-local identity of a record, assigned at creation (UUID v7)
//! - [`RecordKey`]: the `(type, id)` pair under which a persisted record is known
//! - [`coerce_id`]: turns a payload id (string or integer) into its canonical string

mod ids;

pub use ids::{coerce_id, ClientId, RecordKey};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid record id: {0}")]
    InvalidId(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
