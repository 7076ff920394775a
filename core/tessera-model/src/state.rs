//! Record lifecycle state machine.
//!
//! The machine is pure: [`RecordState::apply`] maps a state and an event to
//! the next state, or rejects the event. [`crate::Record`] drives it and
//! keeps the attribute layers in step.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Known by id only; no data yet.
    Empty,
    /// A fetch for the record's data is outstanding.
    Loading,
    /// Loaded and matching the last known server state.
    Saved,
    /// Created locally and not yet acknowledged by the server.
    Created(DirtyPhase),
    /// Loaded, then edited locally.
    Updated(DirtyPhase),
    /// Marked for deletion.
    Deleted(DeletedPhase),
}

/// Sub-state of a created or updated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyPhase {
    Uncommitted,
    InFlight,
    /// The server rejected the last save with validation errors.
    Invalid,
    /// The last save failed for any other reason.
    Error,
}

/// Sub-state of a deleted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedPhase {
    Uncommitted,
    InFlight,
    Error,
    /// Deletion is final.
    Saved,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordEvent {
    LoadingData,
    LoadFailed,
    PushedData,
    BecomeDirty,
    PropertyWasReset,
    BecameValid,
    DeleteRecord,
    WillCommit,
    DidCommit,
    BecameInvalid,
    BecameError,
    Rollback,
    Unload,
}

impl RecordState {
    /// Computes the state that follows `event`.
    pub fn apply(self, event: RecordEvent) -> ModelResult<RecordState> {
        use DeletedPhase as Del;
        use DirtyPhase::*;
        use RecordEvent::*;
        use RecordState::*;

        let next = match (self, event) {
            (Empty, LoadingData) => Loading,
            (Loading, LoadFailed) => Empty,
            (Empty | Loading | Saved, PushedData) => Saved,
            (Created(_) | Updated(_) | Deleted(Del::Uncommitted | Del::InFlight | Del::Error), PushedData) => self,

            (Saved, BecomeDirty) => Updated(Uncommitted),
            (Created(_) | Updated(_), BecomeDirty) => self,
            (Updated(Uncommitted), PropertyWasReset) => Saved,
            (Saved | Created(_) | Updated(_) | Deleted(_), PropertyWasReset) => self,
            (Created(Invalid), BecameValid) => Created(Uncommitted),
            (Updated(Invalid), BecameValid) => Updated(Uncommitted),

            (Saved | Updated(Uncommitted | Invalid | Error), DeleteRecord) => Deleted(Del::Uncommitted),
            // Never persisted, so there is nothing to tell the server.
            (Created(Uncommitted | Invalid | Error), DeleteRecord) => Deleted(Del::Saved),
            (Deleted(_), DeleteRecord) => self,

            (Saved, WillCommit) => Updated(InFlight),
            (Created(Uncommitted | Invalid | Error), WillCommit) => Created(InFlight),
            (Updated(Uncommitted | Invalid | Error), WillCommit) => Updated(InFlight),
            (Deleted(Del::Uncommitted | Del::Error), WillCommit) => Deleted(Del::InFlight),

            (Created(InFlight) | Updated(InFlight), DidCommit) => Saved,
            (Deleted(Del::InFlight), DidCommit) => Deleted(Del::Saved),

            (Created(InFlight), BecameInvalid) => Created(Invalid),
            (Updated(InFlight), BecameInvalid) => Updated(Invalid),
            (Deleted(Del::InFlight), BecameInvalid) => Deleted(Del::Error),

            (Created(InFlight), BecameError) => Created(Error),
            (Updated(InFlight), BecameError) => Updated(Error),
            (Deleted(Del::InFlight), BecameError) => Deleted(Del::Error),

            (Saved, Rollback) => Saved,
            (Created(Uncommitted | Invalid | Error), Rollback) => Deleted(Del::Saved),
            (Updated(Uncommitted | Invalid | Error), Rollback) => Saved,
            (Deleted(Del::Uncommitted | Del::Error), Rollback) => Saved,

            (Empty | Saved | Deleted(Del::Saved), Unload) => Empty,

            _ => return Err(ModelError::InvalidTransition { state: self, event }),
        };
        Ok(next)
    }

    pub fn is_empty(self) -> bool {
        self == RecordState::Empty
    }

    pub fn is_loading(self) -> bool {
        self == RecordState::Loading
    }

    /// Data is present (the record may also be dirty or deleted).
    pub fn is_loaded(self) -> bool {
        !matches!(self, RecordState::Empty | RecordState::Loading)
    }

    pub fn is_dirty(self) -> bool {
        match self {
            RecordState::Created(_) | RecordState::Updated(_) => true,
            RecordState::Deleted(phase) => phase != DeletedPhase::Saved,
            _ => false,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, RecordState::Created(_))
    }

    pub fn is_saving(self) -> bool {
        matches!(
            self,
            RecordState::Created(DirtyPhase::InFlight)
                | RecordState::Updated(DirtyPhase::InFlight)
                | RecordState::Deleted(DeletedPhase::InFlight)
        )
    }

    pub fn is_deleted(self) -> bool {
        matches!(self, RecordState::Deleted(_))
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            RecordState::Created(DirtyPhase::Error)
                | RecordState::Updated(DirtyPhase::Error)
                | RecordState::Deleted(DeletedPhase::Error)
        )
    }

    pub fn is_invalid(self) -> bool {
        matches!(
            self,
            RecordState::Created(DirtyPhase::Invalid) | RecordState::Updated(DirtyPhase::Invalid)
        )
    }

    /// Dotted path naming the state, e.g. `loaded.updated.in_flight`.
    pub fn path(self) -> &'static str {
        use DeletedPhase as Del;
        use DirtyPhase::*;
        match self {
            RecordState::Empty => "empty",
            RecordState::Loading => "loading",
            RecordState::Saved => "loaded.saved",
            RecordState::Created(Uncommitted) => "loaded.created.uncommitted",
            RecordState::Created(InFlight) => "loaded.created.in_flight",
            RecordState::Created(Invalid) => "loaded.created.invalid",
            RecordState::Created(Error) => "loaded.created.error",
            RecordState::Updated(Uncommitted) => "loaded.updated.uncommitted",
            RecordState::Updated(InFlight) => "loaded.updated.in_flight",
            RecordState::Updated(Invalid) => "loaded.updated.invalid",
            RecordState::Updated(Error) => "loaded.updated.error",
            RecordState::Deleted(Del::Uncommitted) => "deleted.uncommitted",
            RecordState::Deleted(Del::InFlight) => "deleted.in_flight",
            RecordState::Deleted(Del::Error) => "deleted.error",
            RecordState::Deleted(Del::Saved) => "deleted.saved",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
