//! Client-facing session lifecycle operations
//!
//! The manager is the only component that mutates in-memory sessions and
//! the only normal-path writer to the durable store. Background drivers
//! (recovery, heartbeat monitor) go through the same per-id locks and the
//! store's compare-and-set, never through the manager.

use crate::config::EngineConfig;
use crate::driver::BrowserDriver;
use crate::events::{TransitionKind, TransitionNotifier};
use crate::models::{state_machine, SessionRecord, SessionStatus, TerminalOutcome};
use crate::session::{LiveRegistry, SessionError};
use crate::store::{SessionStore, StoreError};
use crate::utils::retry_store;
use chrono::Utc;
use std::sync::Arc;

/// Result of a terminate call
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateAck {
    /// This call performed the terminal transition
    Terminated,
    /// The session was already terminal (or a racing transition won);
    /// nothing was changed by this call
    AlreadyTerminated,
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    driver: Arc<dyn BrowserDriver>,
    registry: Arc<LiveRegistry>,
    config: EngineConfig,
    notifier: TransitionNotifier,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        driver: Arc<dyn BrowserDriver>,
        registry: Arc<LiveRegistry>,
        config: EngineConfig,
        notifier: TransitionNotifier,
    ) -> Self {
        Self {
            store,
            driver,
            registry,
            config,
            notifier,
        }
    }

    /// Start a new session: spin up a driver job for the target URL,
    /// persist an Active record, and register the live handle.
    ///
    /// On driver failure no record is created. On store failure the fresh
    /// handle is released again so nothing leaks.
    pub async fn start_session(
        &self,
        owner: &str,
        target_url: &str,
    ) -> Result<String, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();

        let lock = self.registry.op_lock(&id);
        let _guard = lock.lock().await;

        let handle = match tokio::time::timeout(
            self.config.spin_deadline(),
            self.driver.spin(target_url),
        )
        .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(SessionError::DriverSpinFailure {
                    url: target_url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SessionError::DriverSpinFailure {
                    url: target_url.to_string(),
                    reason: format!(
                        "spin deadline of {:?} exceeded",
                        self.config.spin_deadline()
                    ),
                })
            }
        };

        let record = SessionRecord::new(id.clone(), owner, target_url);
        if let Err(e) = self.store.create(&record) {
            log::error!("Failed to persist new session {}: {}", id, e);
            self.driver.release(handle).await;
            return Err(e.into());
        }

        self.registry.insert(&id, handle);
        self.notifier
            .emit(TransitionKind::Created, &id, None, SessionStatus::Active);
        log::info!("Session {} started for {} at {}", id, owner, target_url);

        Ok(id)
    }

    /// Record client liveness for a session owned by this process.
    ///
    /// Store unavailability is retried with backoff and never causes a
    /// status transition.
    pub async fn heartbeat(&self, id: &str) -> Result<(), SessionError> {
        let lock = self.registry.op_lock(id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        if !self.registry.touch(id, now) {
            return Err(SessionError::NotFound(id.to_string()));
        }

        retry_store(
            || self.store.touch(id, now),
            self.config.store_retry_attempts,
            self.config.store_retry_initial(),
        )
        .await?;

        self.notifier.emit(
            TransitionKind::Heartbeat,
            id,
            Some(SessionStatus::Active),
            SessionStatus::Active,
        );
        Ok(())
    }

    /// Persist the job's latest checkpoint pointer, best-effort.
    ///
    /// The token only improves recovery; losing a write is logged and
    /// swallowed rather than failing the job.
    pub async fn update_resume_token(&self, id: &str, token: &str) -> Result<(), SessionError> {
        let lock = self.registry.op_lock(id);
        let _guard = lock.lock().await;

        if !self.registry.contains(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }

        if let Err(e) = self.store.set_resume_token(id, token) {
            log::warn!("Failed to persist resume token for session {}: {}", id, e);
        }
        Ok(())
    }

    /// Current status: the in-memory registry wins (live means Active),
    /// the durable record answers for everything else.
    pub fn get_status(&self, id: &str) -> Result<SessionStatus, SessionError> {
        if self.registry.contains(id) {
            return Ok(SessionStatus::Active);
        }

        match self.store.get(id) {
            Ok(record) => Ok(record.status),
            Err(StoreError::NotFound(_)) => Err(SessionError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Terminate a session with the given outcome.
    ///
    /// Idempotent: an already-terminal session acknowledges with
    /// `AlreadyTerminated` instead of erroring. A terminate that loses the
    /// compare-and-set to a concurrent recovery claim is discarded
    /// silently and acknowledged the same way; the engine never re-derives
    /// intent against a new precondition.
    pub async fn terminate(
        &self,
        id: &str,
        outcome: TerminalOutcome,
    ) -> Result<TerminateAck, SessionError> {
        let lock = self.registry.op_lock(id);
        let _guard = lock.lock().await;

        let to = SessionStatus::from(outcome);

        if let Some(live) = self.registry.remove(id) {
            self.driver.release(live.handle).await;

            let won = self
                .store
                .update_status(id, SessionStatus::Active, to)?;
            if won {
                self.emit_terminal(id, to);
                log::info!("Session {} terminated as {}", id, to);
                return Ok(TerminateAck::Terminated);
            }
            // Another instance already resolved the record
            return Ok(TerminateAck::AlreadyTerminated);
        }

        // Not owned by this process: resolve against the durable record
        let record = match self.store.get(id) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(SessionError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if state_machine::is_terminal_state(record.status) {
            return Ok(TerminateAck::AlreadyTerminated);
        }

        if record.status == SessionStatus::Active {
            if self.store.update_status(id, SessionStatus::Active, to)? {
                self.emit_terminal(id, to);
                log::info!("Orphaned session {} terminated as {}", id, to);
                return Ok(TerminateAck::Terminated);
            }
        }

        // Resuming, or the compare-and-set lost a race: the claim winner
        // owns the record now and this call's effect is dropped
        Ok(TerminateAck::AlreadyTerminated)
    }

    fn emit_terminal(&self, id: &str, to: SessionStatus) {
        let kind = match to {
            SessionStatus::Completed => TransitionKind::Completed,
            _ => TransitionKind::Failed,
        };
        self.notifier
            .emit(kind, id, Some(SessionStatus::Active), to);
    }
}
