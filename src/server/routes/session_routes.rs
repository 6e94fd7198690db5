//! Session-related command routing
//!
//! Handles: start_session, heartbeat, get_status, get_session,
//! update_resume_token, terminate, list_sessions, run_recovery

use crate::models::{SessionStatus, TerminalOutcome};
use serde_json::{json, Value};
use std::str::FromStr;

use super::{get_arg, get_opt_arg, ServerAppState};

/// Route session-related commands
pub async fn route_session_command(
    cmd: &str,
    args: Value,
    state: &ServerAppState,
) -> Result<Value, String> {
    match cmd {
        "start_session" => {
            let owner: String = get_arg(&args, "owner")?;
            let target_url: String = get_arg(&args, "targetUrl")?;

            let id = state
                .manager
                .start_session(&owner, &target_url)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "sessionId": id }))
        }

        "heartbeat" => {
            let id: String = get_arg(&args, "sessionId")?;
            state
                .manager
                .heartbeat(&id)
                .await
                .map_err(|e| e.to_string())?;
            Ok(Value::Null)
        }

        "get_status" => {
            let id: String = get_arg(&args, "sessionId")?;
            let status = state.manager.get_status(&id).map_err(|e| e.to_string())?;
            Ok(json!({ "status": status }))
        }

        "get_session" => {
            let id: String = get_arg(&args, "sessionId")?;
            let record = state.store.get(&id).map_err(|e| e.to_string())?;
            serde_json::to_value(record).map_err(|e| e.to_string())
        }

        "update_resume_token" => {
            let id: String = get_arg(&args, "sessionId")?;
            let token: String = get_arg(&args, "resumeToken")?;
            state
                .manager
                .update_resume_token(&id, &token)
                .await
                .map_err(|e| e.to_string())?;
            Ok(Value::Null)
        }

        "terminate" => {
            let id: String = get_arg(&args, "sessionId")?;
            let outcome: TerminalOutcome = get_arg(&args, "outcome")?;
            let ack = state
                .manager
                .terminate(&id, outcome)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(ack).map_err(|e| e.to_string())
        }

        "list_sessions" => {
            let status: Option<String> = get_opt_arg(&args, "status")?;
            let status = match status {
                Some(s) => SessionStatus::from_str(&s)?,
                None => SessionStatus::Active,
            };
            let records = state
                .store
                .query_by_status(status)
                .map_err(|e| e.to_string())?;
            serde_json::to_value(records).map_err(|e| e.to_string())
        }

        "live_sessions" => {
            let ids = state.registry.ids();
            Ok(json!({ "count": ids.len(), "sessionIds": ids }))
        }

        "run_recovery" => {
            let report = state.recovery.run().await.map_err(|e| e.to_string())?;
            serde_json::to_value(report).map_err(|e| e.to_string())
        }

        _ => Err(format!("Unknown session command: {}", cmd)),
    }
}

/// Check if a command is a session command
pub fn is_session_command(cmd: &str) -> bool {
    matches!(
        cmd,
        "start_session"
            | "heartbeat"
            | "get_status"
            | "get_session"
            | "update_resume_token"
            | "terminate"
            | "list_sessions"
            | "live_sessions"
            | "run_recovery"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_session_command() {
        assert!(is_session_command("start_session"));
        assert!(is_session_command("terminate"));
        assert!(is_session_command("run_recovery"));
        assert!(!is_session_command("create_widget"));
    }
}
