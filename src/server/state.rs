//! Server application state shared across handlers

use super::events::EventBroadcaster;
use crate::session::{LiveRegistry, RecoveryCoordinator, SessionManager};
use crate::shutdown::ShutdownState;
use crate::store::SessionStore;
use std::sync::Arc;

/// Shared state for the server, containing the engine components every
/// handler needs.
#[derive(Clone)]
pub struct ServerAppState {
    /// Authentication token for this server instance
    pub auth_token: String,

    /// Session lifecycle manager
    pub manager: Arc<SessionManager>,

    /// Recovery coordinator (exposed for operator-triggered runs)
    pub recovery: Arc<RecoveryCoordinator>,

    /// Durable record store (read paths for listing endpoints)
    pub store: Arc<dyn SessionStore>,

    /// In-memory registry of live sessions
    pub registry: Arc<LiveRegistry>,

    /// Event broadcaster for WebSocket clients
    pub broadcaster: Arc<EventBroadcaster>,

    /// Shutdown state
    pub shutdown_state: ShutdownState,
}

impl ServerAppState {
    pub fn new(
        auth_token: String,
        manager: Arc<SessionManager>,
        recovery: Arc<RecoveryCoordinator>,
        store: Arc<dyn SessionStore>,
        registry: Arc<LiveRegistry>,
        shutdown_state: ShutdownState,
    ) -> Self {
        Self {
            auth_token,
            manager,
            recovery,
            store,
            registry,
            broadcaster: Arc::new(EventBroadcaster::new()),
            shutdown_state,
        }
    }
}
