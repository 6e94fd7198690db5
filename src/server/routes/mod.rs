//! Command routing modules
//!
//! The API surface is a single command proxy endpoint; routing is
//! organized into focused sub-modules by domain:
//! - session_routes: Session lifecycle commands

pub mod session_routes;

use serde_json::Value;

use super::ServerAppState;

// =============================================================================
// Helper functions for use by route modules
// =============================================================================

/// Extract a required argument from JSON args
pub fn get_arg<T: serde::de::DeserializeOwned>(args: &Value, name: &str) -> Result<T, String> {
    serde_json::from_value(
        args.get(name)
            .ok_or_else(|| format!("Missing argument: {}", name))?
            .clone(),
    )
    .map_err(|e| format!("Invalid argument {}: {}", name, e))
}

/// Extract an optional argument from JSON args
pub fn get_opt_arg<T: serde::de::DeserializeOwned>(
    args: &Value,
    name: &str,
) -> Result<Option<T>, String> {
    match args.get(name) {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| format!("Invalid argument {}: {}", name, e)),
        _ => Ok(None),
    }
}

// =============================================================================
// Main Command Dispatcher
// =============================================================================

/// Route a command to its implementation by dispatching to the appropriate
/// sub-router
pub async fn route_command(
    cmd: &str,
    args: Value,
    state: &ServerAppState,
) -> Result<Value, String> {
    if session_routes::is_session_command(cmd) {
        return session_routes::route_session_command(cmd, args, state).await;
    }

    Err(format!("Unknown command: {}", cmd))
}
