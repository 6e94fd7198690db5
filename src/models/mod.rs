// Data models for session records and their lifecycle

pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Resuming,
    Completed,
    Failed,
    Abandoned,
}

impl SessionStatus {
    /// Returns all session statuses
    pub fn all() -> &'static [SessionStatus] {
        &[
            SessionStatus::Active,
            SessionStatus::Resuming,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Abandoned,
        ]
    }

    /// Returns the string representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Resuming => "resuming",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SessionStatus::Active),
            "resuming" => Ok(SessionStatus::Resuming),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            _ => Err(format!(
                "Unknown session status: '{}'. Expected one of: active, resuming, completed, failed, abandoned",
                s
            )),
        }
    }
}

/// Outcome a client may terminate a session with
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Completed,
    Failed,
}

impl From<TerminalOutcome> for SessionStatus {
    fn from(outcome: TerminalOutcome) -> Self {
        match outcome {
            TerminalOutcome::Completed => SessionStatus::Completed,
            TerminalOutcome::Failed => SessionStatus::Failed,
        }
    }
}

/// Durable metadata for one automation session.
///
/// This is everything that survives a process restart. The live driver
/// handle is held only in the in-memory registry and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub owner: String,
    pub target_url: String,
    pub resume_token: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a fresh Active record with no resume checkpoint yet
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            target_url: target_url.into(),
            resume_token: None,
            status: SessionStatus::Active,
            created_at: now,
            last_active_at: now,
        }
    }
}
