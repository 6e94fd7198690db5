//! WebSocket event broadcaster for real-time updates
//!
//! Bridges the engine's transition event channel to WebSocket clients.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use super::ServerAppState;
use crate::events::SessionTransitionEvent;

/// A server event that can be broadcast to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    /// Event type (e.g., "session:resumed", "session:abandoned")
    pub event: String,
    /// Event payload as JSON value
    pub payload: serde_json::Value,
}

/// Broadcasts events to all connected WebSocket clients
pub struct EventBroadcaster {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster with a channel capacity of 1000 events
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event_type: &str, payload: impl Serialize) {
        let event = ServerEvent {
            event: event_type.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        };

        // Ignore send errors (no receivers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward engine transition events into the WebSocket broadcaster until
/// the engine side closes the channel
pub fn spawn_transition_forwarder(
    mut rx: mpsc::UnboundedReceiver<SessionTransitionEvent>,
    broadcaster: Arc<EventBroadcaster>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            broadcaster.broadcast(event.kind.event_name(), &event.payload);
        }
    })
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerAppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ServerAppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe to broadcast events
    let mut event_rx = state.broadcaster.subscribe();

    log::info!("WebSocket client connected");

    // Spawn a task to forward broadcast events to this client
    let send_task = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Failed to serialize event: {}", e);
                }
            }
        }
    });

    // Handle incoming messages (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(msg) => match msg {
                Message::Ping(data) => {
                    // Pong is handled automatically by axum
                    log::trace!("Received ping: {:?}", data);
                }
                Message::Pong(_) => {
                    log::trace!("Received pong");
                }
                Message::Text(text) => {
                    log::debug!("Received text message: {}", text);
                }
                Message::Close(_) => {
                    log::info!("WebSocket client disconnected");
                    break;
                }
                _ => {}
            },
            Err(e) => {
                log::warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    // Clean up
    send_task.abort();
    log::info!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SessionTransitionPayload, TransitionKind};
    use crate::models::SessionStatus;

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent {
            event: "session:resumed".to_string(),
            payload: serde_json::json!({
                "sessionId": "s-123",
                "toStatus": "active"
            }),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session:resumed"));
        assert!(json.contains("s-123"));
    }

    #[tokio::test]
    async fn test_transition_forwarder_bridges_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcaster = Arc::new(EventBroadcaster::new());
        let mut ws_rx = broadcaster.subscribe();

        let task = spawn_transition_forwarder(rx, broadcaster);

        tx.send(SessionTransitionEvent {
            kind: TransitionKind::Abandoned,
            payload: SessionTransitionPayload {
                session_id: "s-1".to_string(),
                from_status: Some(SessionStatus::Active),
                to_status: SessionStatus::Abandoned,
                timestamp: chrono::Utc::now(),
            },
        })
        .unwrap();

        let event = ws_rx.recv().await.unwrap();
        assert_eq!(event.event, "session:abandoned");
        assert_eq!(event.payload["sessionId"], "s-1");

        drop(tx);
        task.await.unwrap();
    }
}
