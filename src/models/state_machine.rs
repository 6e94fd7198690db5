// Session status state machine with validation

use super::SessionStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session already in terminal state: {0:?}")]
    AlreadyTerminal(SessionStatus),
}

/// Validates if a session can transition from one status to another
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    match (from, to) {
        // From Active
        (SessionStatus::Active, SessionStatus::Completed) => true,
        (SessionStatus::Active, SessionStatus::Failed) => true,
        (SessionStatus::Active, SessionStatus::Abandoned) => true,
        (SessionStatus::Active, SessionStatus::Resuming) => true, // Recovery claim

        // From Resuming
        (SessionStatus::Resuming, SessionStatus::Active) => true, // Resume succeeded
        (SessionStatus::Resuming, SessionStatus::Failed) => true, // Resume failed or timed out

        // Terminal states have no outgoing transitions; Active -> Active
        // and Resuming -> Resuming are not transitions either (heartbeats
        // go through touch, never through a status write).
        _ => false,
    }
}

/// Validates and performs a state transition
pub fn transition_state(
    current: SessionStatus,
    target: SessionStatus,
) -> Result<SessionStatus, StateTransitionError> {
    if is_terminal_state(current) {
        return Err(StateTransitionError::AlreadyTerminal(current));
    }

    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

/// Check if a status is a terminal state
pub fn is_terminal_state(status: SessionStatus) -> bool {
    matches!(
        status,
        SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Abandoned
    )
}

/// Check if a status indicates a running session
pub fn is_active_state(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Active)
}

/// Check if a status is the transient reconciliation state
pub fn is_resuming_state(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Resuming)
}

/// Get all valid next states from current state
pub fn valid_next_states(current: SessionStatus) -> Vec<SessionStatus> {
    SessionStatus::all()
        .iter()
        .copied()
        .filter(|&state| can_transition(current, state))
        .collect()
}
