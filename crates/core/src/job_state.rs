//! Job lifecycle state machine.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the repository layer and the worker. The typed `JobStatus` enum in
//! the `db` crate delegates to these functions through its string
//! representation.

/// Initial state: the record is editable and has not been confirmed yet.
pub const READY: &str = "ready";

/// Confirmed and waiting for a worker to claim it.
pub const QUEUED: &str = "queued";

/// Claimed by a worker; execution is in flight.
pub const PROCESSING: &str = "processing";

/// Terminal: execution finished without error.
pub const COMPLETED: &str = "completed";

/// Terminal: execution raised a failure.
pub const FAILED: &str = "failed";

/// All statuses, in lifecycle order.
pub const ALL_STATUSES: [&str; 5] = [READY, QUEUED, PROCESSING, COMPLETED, FAILED];

/// Returns the set of valid target statuses reachable from `from`.
///
/// Terminal states return an empty slice because no further transitions
/// are allowed; the only way out of a terminal record is deletion.
pub fn valid_transitions(from: &str) -> &'static [&'static str] {
    match from {
        READY => &[QUEUED],
        QUEUED => &[PROCESSING],
        PROCESSING => &[COMPLETED, FAILED],
        // Terminal states: completed, failed.
        COMPLETED | FAILED => &[],
        // Unknown status: no transitions allowed.
        _ => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: &str, to: &str) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a state transition, returning an error message for invalid ones.
pub fn validate_transition(from: &str, to: &str) -> Result<(), String> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(format!("Invalid transition: {from} -> {to}"))
    }
}

/// A record is modifiable only before it has been confirmed.
pub fn can_be_modified(status: &str) -> bool {
    status == READY
}

/// A record is deletable unless a worker may still touch it.
pub fn can_be_deleted(status: &str) -> bool {
    matches!(status, READY | COMPLETED | FAILED)
}

/// Execution must be refused for records that are already running or done.
/// Only queued records should run; this is the authoritative re-entry guard.
pub fn should_not_run(status: &str) -> bool {
    matches!(status, PROCESSING | COMPLETED | FAILED)
}

/// Whether the record has reached the end of its run, successful or not.
pub fn has_completed(status: &str) -> bool {
    matches!(status, COMPLETED | FAILED)
}

/// Terminal states admit no further transitions.
pub fn is_terminal(status: &str) -> bool {
    matches!(status, COMPLETED | FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn ready_to_queued() {
        assert!(can_transition(READY, QUEUED));
    }

    #[test]
    fn queued_to_processing() {
        assert!(can_transition(QUEUED, PROCESSING));
    }

    #[test]
    fn processing_to_completed() {
        assert!(can_transition(PROCESSING, COMPLETED));
    }

    #[test]
    fn processing_to_failed() {
        assert!(can_transition(PROCESSING, FAILED));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn no_backward_transitions() {
        assert!(!can_transition(QUEUED, READY));
        assert!(!can_transition(PROCESSING, QUEUED));
        assert!(!can_transition(COMPLETED, PROCESSING));
        assert!(!can_transition(FAILED, READY));
    }

    #[test]
    fn ready_cannot_skip_queue() {
        assert!(!can_transition(READY, PROCESSING));
        assert!(!can_transition(READY, COMPLETED));
        assert!(!can_transition(READY, FAILED));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL_STATUSES {
            assert!(!can_transition(COMPLETED, to));
            assert!(!can_transition(FAILED, to));
        }
    }

    #[test]
    fn unknown_status_has_no_transitions() {
        assert!(valid_transitions("paused").is_empty());
    }

    #[test]
    fn validate_transition_reports_both_states() {
        let err = validate_transition(COMPLETED, QUEUED).unwrap_err();
        assert!(err.contains("completed"));
        assert!(err.contains("queued"));
    }

    // -----------------------------------------------------------------------
    // Predicates, exhaustively over all five statuses
    // -----------------------------------------------------------------------

    #[test]
    fn modifiable_only_when_ready() {
        for status in ALL_STATUSES {
            assert_eq!(can_be_modified(status), status == READY);
        }
    }

    #[test]
    fn deletable_when_ready_or_terminal() {
        for status in ALL_STATUSES {
            let expected = matches!(status, READY | COMPLETED | FAILED);
            assert_eq!(can_be_deleted(status), expected);
        }
    }

    #[test]
    fn should_not_run_guards_processing_and_terminal() {
        for status in ALL_STATUSES {
            let expected = matches!(status, PROCESSING | COMPLETED | FAILED);
            assert_eq!(should_not_run(status), expected);
        }
    }

    #[test]
    fn has_completed_only_for_terminal() {
        for status in ALL_STATUSES {
            assert_eq!(has_completed(status), is_terminal(status));
        }
    }
}
