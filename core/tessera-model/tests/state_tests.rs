use tessera_model::{DeletedPhase, DirtyPhase, ModelError, RecordEvent, RecordState};

use DirtyPhase::{InFlight, Invalid, Uncommitted};

fn run(start: RecordState, events: &[RecordEvent]) -> RecordState {
    events
        .iter()
        .try_fold(start, |state, event| state.apply(*event))
        .unwrap()
}

// ── Happy paths ──────────────────────────────────────────────────

#[test]
fn load_then_push() {
    let state = run(
        RecordState::Empty,
        &[RecordEvent::LoadingData, RecordEvent::PushedData],
    );
    assert_eq!(state, RecordState::Saved);
}

#[test]
fn failed_load_returns_to_empty() {
    let state = run(
        RecordState::Empty,
        &[RecordEvent::LoadingData, RecordEvent::LoadFailed],
    );
    assert_eq!(state, RecordState::Empty);
}

#[test]
fn create_and_commit() {
    let state = run(
        RecordState::Created(Uncommitted),
        &[RecordEvent::WillCommit, RecordEvent::DidCommit],
    );
    assert_eq!(state, RecordState::Saved);
}

#[test]
fn edit_and_commit() {
    let state = run(
        RecordState::Saved,
        &[RecordEvent::BecomeDirty, RecordEvent::WillCommit],
    );
    assert_eq!(state, RecordState::Updated(InFlight));
    assert_eq!(state.apply(RecordEvent::DidCommit).unwrap(), RecordState::Saved);
}

#[test]
fn saving_clean_record_goes_in_flight_as_update() {
    assert_eq!(
        RecordState::Saved.apply(RecordEvent::WillCommit).unwrap(),
        RecordState::Updated(InFlight)
    );
}

#[test]
fn edit_delete_commit() {
    let state = run(
        RecordState::Saved,
        &[
            RecordEvent::BecomeDirty,
            RecordEvent::DeleteRecord,
            RecordEvent::WillCommit,
            RecordEvent::DidCommit,
        ],
    );
    assert_eq!(state, RecordState::Deleted(DeletedPhase::Saved));
    assert!(!state.is_dirty());
    assert!(state.is_deleted());
}

#[test]
fn deleting_new_record_needs_no_commit() {
    let state = RecordState::Created(Uncommitted)
        .apply(RecordEvent::DeleteRecord)
        .unwrap();
    assert_eq!(state, RecordState::Deleted(DeletedPhase::Saved));
}

// ── Failures ─────────────────────────────────────────────────────

#[test]
fn invalid_then_valid_then_commit() {
    let state = run(
        RecordState::Updated(InFlight),
        &[RecordEvent::BecameInvalid],
    );
    assert_eq!(state, RecordState::Updated(Invalid));
    assert!(state.is_dirty());
    assert!(!state.is_error());

    let state = run(state, &[RecordEvent::BecameValid]);
    assert_eq!(state, RecordState::Updated(Uncommitted));
}

#[test]
fn invalid_record_can_be_saved_again() {
    let state = RecordState::Created(Invalid)
        .apply(RecordEvent::WillCommit)
        .unwrap();
    assert_eq!(state, RecordState::Created(InFlight));
}

#[test]
fn errors_route_to_error_phase() {
    let created = RecordState::Created(InFlight).apply(RecordEvent::BecameError).unwrap();
    assert!(created.is_error());
    assert!(created.is_new());

    let deleted = RecordState::Deleted(DeletedPhase::InFlight)
        .apply(RecordEvent::BecameError)
        .unwrap();
    assert!(deleted.is_error());
    assert!(deleted.is_deleted());
    assert!(deleted.is_dirty());
}

#[test]
fn errored_deletion_can_be_retried() {
    let state = run(
        RecordState::Deleted(DeletedPhase::Error),
        &[RecordEvent::WillCommit, RecordEvent::DidCommit],
    );
    assert_eq!(state, RecordState::Deleted(DeletedPhase::Saved));
    assert!(!state.is_error());
}

// ── Rejections ───────────────────────────────────────────────────

#[test]
fn second_commit_while_in_flight_is_rejected() {
    let err = RecordState::Updated(InFlight)
        .apply(RecordEvent::WillCommit)
        .unwrap_err();
    assert_eq!(
        err,
        ModelError::InvalidTransition {
            state: RecordState::Updated(InFlight),
            event: RecordEvent::WillCommit,
        }
    );
}

#[test]
fn deleting_in_flight_record_is_rejected() {
    assert!(RecordState::Created(InFlight).apply(RecordEvent::DeleteRecord).is_err());
    assert!(RecordState::Updated(InFlight).apply(RecordEvent::DeleteRecord).is_err());
}

#[test]
fn editing_deleted_record_is_rejected() {
    assert!(RecordState::Deleted(DeletedPhase::Uncommitted)
        .apply(RecordEvent::BecomeDirty)
        .is_err());
}

#[test]
fn unloading_dirty_record_is_rejected() {
    assert!(RecordState::Updated(Uncommitted).apply(RecordEvent::Unload).is_err());
    assert!(RecordState::Created(Uncommitted).apply(RecordEvent::Unload).is_err());
    assert_eq!(RecordState::Saved.apply(RecordEvent::Unload).unwrap(), RecordState::Empty);
}

#[test]
fn invalid_transition_message_names_state() {
    let err = RecordState::Empty.apply(RecordEvent::WillCommit).unwrap_err();
    assert_eq!(
        err.to_string(),
        "attempted to handle event `WillCommit` while in state empty"
    );
}

// ── Rollback ─────────────────────────────────────────────────────

#[test]
fn rollback_paths() {
    assert_eq!(
        RecordState::Updated(Invalid).apply(RecordEvent::Rollback).unwrap(),
        RecordState::Saved
    );
    assert_eq!(
        RecordState::Created(Uncommitted).apply(RecordEvent::Rollback).unwrap(),
        RecordState::Deleted(DeletedPhase::Saved)
    );
    assert_eq!(
        RecordState::Deleted(DeletedPhase::Uncommitted)
            .apply(RecordEvent::Rollback)
            .unwrap(),
        RecordState::Saved
    );
    assert!(RecordState::Updated(InFlight).apply(RecordEvent::Rollback).is_err());
}

#[test]
fn state_paths() {
    assert_eq!(RecordState::Saved.to_string(), "loaded.saved");
    assert_eq!(RecordState::Updated(InFlight).path(), "loaded.updated.in_flight");
    assert_eq!(RecordState::Deleted(DeletedPhase::Saved).path(), "deleted.saved");
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn event_strategy() -> impl Strategy<Value = RecordEvent> {
        prop::sample::select(vec![
            RecordEvent::LoadingData,
            RecordEvent::LoadFailed,
            RecordEvent::PushedData,
            RecordEvent::BecomeDirty,
            RecordEvent::PropertyWasReset,
            RecordEvent::BecameValid,
            RecordEvent::DeleteRecord,
            RecordEvent::WillCommit,
            RecordEvent::DidCommit,
            RecordEvent::BecameInvalid,
            RecordEvent::BecameError,
            RecordEvent::Rollback,
            RecordEvent::Unload,
        ])
    }

    proptest! {
        /// Whatever sequence of events is thrown at a record, the flags
        /// derived from its state never contradict each other.
        #[test]
        fn flags_stay_consistent(events in prop::collection::vec(event_strategy(), 0..40)) {
            let mut state = RecordState::Empty;
            for event in events {
                if let Ok(next) = state.apply(event) {
                    state = next;
                }
                prop_assert!(!(state.is_saving() && state.is_error()));
                prop_assert!(!(state.is_saving() && state.is_invalid()));
                prop_assert!(!(state.is_new() && state.is_deleted()));
                prop_assert!(!state.is_saving() || state.is_dirty());
                prop_assert!(!state.is_error() || state.is_dirty());
                prop_assert!(state.is_loaded() || !state.is_dirty());
            }
        }

        /// A rejected event leaves the state exactly as it was.
        #[test]
        fn rejected_events_do_not_move(events in prop::collection::vec(event_strategy(), 0..40)) {
            let mut state = RecordState::Empty;
            for event in events {
                match state.apply(event) {
                    Ok(next) => state = next,
                    Err(ModelError::InvalidTransition { state: reported, event: rejected }) => {
                        prop_assert_eq!(reported, state);
                        prop_assert_eq!(rejected, event);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            }
        }
    }
}
