//! Session lifecycle engine
//!
//! `SessionManager` mediates all client-visible operations over live
//! sessions; `HeartbeatMonitor` reclaims sessions whose owner went away;
//! `RecoveryCoordinator` reconciles durable records against reality after
//! a restart. All three share one `LiveRegistry` and coordinate across
//! process instances exclusively through the store's compare-and-set.

pub mod heartbeat;
pub mod manager;
pub mod recovery;
pub mod registry;

pub use heartbeat::HeartbeatMonitor;
pub use manager::{SessionManager, TerminateAck};
pub use recovery::{RecoveryCoordinator, RecoveryReport};
pub use registry::{LiveRegistry, LiveSession};

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("driver failed to start job for {url}: {reason}")]
    DriverSpinFailure { url: String, reason: String },

    #[error("resume failed for session {id}: {reason}")]
    ResumeFailure { id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
