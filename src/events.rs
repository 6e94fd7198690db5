// Event types and payload structures for session transitions
// These are forwarded to the WebSocket broadcaster and any metrics pipeline

use crate::models::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// Event name constants
pub const EVENT_SESSION_CREATED: &str = "session:created";
pub const EVENT_SESSION_HEARTBEAT: &str = "session:heartbeat";
pub const EVENT_SESSION_RESUMED: &str = "session:resumed";
pub const EVENT_SESSION_RESUME_FAILED: &str = "session:resume_failed";
pub const EVENT_SESSION_ABANDONED: &str = "session:abandoned";
pub const EVENT_SESSION_COMPLETED: &str = "session:completed";
pub const EVENT_SESSION_FAILED: &str = "session:failed";

/// Kind of session transition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Created,
    Heartbeat,
    Resumed,
    ResumeFailed,
    Abandoned,
    Completed,
    Failed,
}

impl TransitionKind {
    /// The wire event name for this transition
    pub fn event_name(&self) -> &'static str {
        match self {
            TransitionKind::Created => EVENT_SESSION_CREATED,
            TransitionKind::Heartbeat => EVENT_SESSION_HEARTBEAT,
            TransitionKind::Resumed => EVENT_SESSION_RESUMED,
            TransitionKind::ResumeFailed => EVENT_SESSION_RESUME_FAILED,
            TransitionKind::Abandoned => EVENT_SESSION_ABANDONED,
            TransitionKind::Completed => EVENT_SESSION_COMPLETED,
            TransitionKind::Failed => EVENT_SESSION_FAILED,
        }
    }
}

/// Payload for session transition events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTransitionPayload {
    pub session_id: String,
    /// Absent for `created` (the record had no prior status)
    pub from_status: Option<SessionStatus>,
    pub to_status: SessionStatus,
    pub timestamp: DateTime<Utc>,
}

/// One discrete transition event, as produced by the engine
#[derive(Debug, Clone)]
pub struct SessionTransitionEvent {
    pub kind: TransitionKind,
    pub payload: SessionTransitionPayload,
}

/// Hands transition events from the engine to whoever is listening.
///
/// Cloneable and cheap; with no sender attached every emit is a no-op, so
/// the engine never depends on a consumer being wired up.
#[derive(Clone, Default)]
pub struct TransitionNotifier {
    tx: Option<mpsc::UnboundedSender<SessionTransitionEvent>>,
}

impl TransitionNotifier {
    /// A notifier that drops every event (tests, embedded use)
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: mpsc::UnboundedSender<SessionTransitionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Emit a transition event stamped with the current time
    pub fn emit(
        &self,
        kind: TransitionKind,
        session_id: &str,
        from_status: Option<SessionStatus>,
        to_status: SessionStatus,
    ) {
        let Some(tx) = &self.tx else {
            return;
        };

        let event = SessionTransitionEvent {
            kind,
            payload: SessionTransitionPayload {
                session_id: session_id.to_string(),
                from_status,
                to_status,
                timestamp: Utc::now(),
            },
        };

        // Ignore send errors (receiver shut down)
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constants() {
        assert_eq!(EVENT_SESSION_CREATED, "session:created");
        assert_eq!(EVENT_SESSION_HEARTBEAT, "session:heartbeat");
        assert_eq!(EVENT_SESSION_RESUMED, "session:resumed");
        assert_eq!(EVENT_SESSION_RESUME_FAILED, "session:resume_failed");
        assert_eq!(EVENT_SESSION_ABANDONED, "session:abandoned");
        assert_eq!(EVENT_SESSION_COMPLETED, "session:completed");
        assert_eq!(EVENT_SESSION_FAILED, "session:failed");
    }

    #[test]
    fn test_event_names_match_kinds() {
        assert_eq!(TransitionKind::Created.event_name(), EVENT_SESSION_CREATED);
        assert_eq!(
            TransitionKind::ResumeFailed.event_name(),
            EVENT_SESSION_RESUME_FAILED
        );
        assert_eq!(
            TransitionKind::Abandoned.event_name(),
            EVENT_SESSION_ABANDONED
        );
    }

    #[test]
    fn test_payload_serialization() {
        let payload = SessionTransitionPayload {
            session_id: "s-123".to_string(),
            from_status: Some(SessionStatus::Active),
            to_status: SessionStatus::Abandoned,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"sessionId\":\"s-123\""));
        assert!(json.contains("\"fromStatus\":\"active\""));
        assert!(json.contains("\"toStatus\":\"abandoned\""));
    }

    #[test]
    fn test_created_payload_has_no_from_status() {
        let payload = SessionTransitionPayload {
            session_id: "s-123".to_string(),
            from_status: None,
            to_status: SessionStatus::Active,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"fromStatus\":null"));
    }

    #[tokio::test]
    async fn test_notifier_delivers_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = TransitionNotifier::new(tx);

        notifier.emit(
            TransitionKind::Completed,
            "s-1",
            Some(SessionStatus::Active),
            SessionStatus::Completed,
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, TransitionKind::Completed);
        assert_eq!(event.payload.session_id, "s-1");
        assert_eq!(event.payload.to_status, SessionStatus::Completed);
    }

    #[test]
    fn test_disabled_notifier_is_silent() {
        let notifier = TransitionNotifier::disabled();
        // Must not panic or error with no receiver attached
        notifier.emit(
            TransitionKind::Created,
            "s-1",
            None,
            SessionStatus::Active,
        );
    }
}
