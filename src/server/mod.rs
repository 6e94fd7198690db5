//! HTTP/WebSocket server exposing the session engine
//!
//! Clients start, heartbeat, and terminate sessions through a command
//! proxy endpoint and watch transition events over a WebSocket.

mod auth;
pub mod events;
pub mod routes;
pub mod state;

pub use auth::{generate_auth_token, AuthLayer};
pub use events::{spawn_transition_forwarder, EventBroadcaster, ServerEvent};
pub use state::ServerAppState;

use axum::{
    extract::State,
    http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Request body for the command proxy endpoint
#[derive(Debug, Deserialize)]
struct InvokeRequest {
    cmd: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// Run the HTTP/WebSocket server
pub async fn run_server(port: u16, bind: &str, state: ServerAppState) -> Result<(), String> {
    // CORS must be the outermost layer so preflight OPTIONS requests are
    // handled before the auth check
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    let app = Router::new()
        .route("/api/invoke", post(invoke_handler))
        .route("/ws/events", get(events::ws_handler))
        .route("/health", get(health_handler))
        .layer(AuthLayer::new(state.auth_token.clone()))
        .layer(cors)
        .with_state(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    log::info!("Server listening on http://{}", addr);
    log::info!("Auth token: {}", state.auth_token);

    // Create shutdown signal that waits for the shutdown state flag
    let shutdown_state = state.shutdown_state.clone();
    let shutdown_signal = async move {
        loop {
            if shutdown_state.is_shutdown_requested() {
                log::info!("Shutdown signal received, stopping server...");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))
}

/// Command proxy handler: `{cmd, args}` in, `{ok, result | error}` out
async fn invoke_handler(
    State(state): State<ServerAppState>,
    Json(request): Json<InvokeRequest>,
) -> Json<serde_json::Value> {
    match routes::route_command(&request.cmd, request.args, &state).await {
        Ok(result) => Json(serde_json::json!({ "ok": true, "result": result })),
        Err(error) => {
            log::debug!("Command {} failed: {}", request.cmd, error);
            Json(serde_json::json!({ "ok": false, "error": error }))
        }
    }
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}
