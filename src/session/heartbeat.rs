//! Background liveness sweep
//!
//! Walks the in-memory registry (never the durable store) and abandons
//! sessions whose owner stopped heartbeating, releasing the driver handle
//! so a vanished client cannot leak a browser.

use crate::config::EngineConfig;
use crate::driver::BrowserDriver;
use crate::events::{TransitionKind, TransitionNotifier};
use crate::models::SessionStatus;
use crate::session::LiveRegistry;
use crate::shutdown::{sleep_unless_shutdown, ShutdownState};
use crate::store::SessionStore;
use chrono::Utc;
use std::sync::Arc;

pub struct HeartbeatMonitor {
    store: Arc<dyn SessionStore>,
    driver: Arc<dyn BrowserDriver>,
    registry: Arc<LiveRegistry>,
    config: EngineConfig,
    notifier: TransitionNotifier,
}

impl HeartbeatMonitor {
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

    /// One sweep over the registry. Returns the number of sessions
    /// abandoned.
    pub async fn sweep_once(&self) -> usize {
        let cutoff = Utc::now() - self.config.heartbeat_timeout_age();
        let stale = self.registry.ids_idle_since(cutoff);
        let mut abandoned = 0;

        for id in stale {
            let lock = self.registry.op_lock(&id);
            let _guard = lock.lock().await;

            // Re-check under the lock: a heartbeat or terminate may have
            // landed while this sweep waited
            match self.registry.last_active_at(&id) {
                Some(ts) if ts < cutoff => {}
                _ => continue,
            }

            if let Some(live) = self.registry.remove(&id) {
                self.driver.release(live.handle).await;
            }

            match self
                .store
                .update_status(&id, SessionStatus::Active, SessionStatus::Abandoned)
            {
                Ok(true) => {
                    self.notifier.emit(
                        TransitionKind::Abandoned,
                        &id,
                        Some(SessionStatus::Active),
                        SessionStatus::Abandoned,
                    );
                    log::info!(
                        "Session {} abandoned: no heartbeat within {:?}",
                        id,
                        self.config.heartbeat_timeout()
                    );
                    abandoned += 1;
                }
                Ok(false) => {
                    log::debug!("Session {} already resolved elsewhere, not abandoning", id);
                }
                Err(e) => {
                    log::warn!("Failed to mark session {} abandoned: {}", id, e);
                }
            }
        }

        abandoned
    }

    /// Run the sweep on its configured interval until shutdown
    pub fn spawn(self: Arc<Self>, shutdown: ShutdownState) -> tokio::task::JoinHandle<()> {
        let interval = self.config.sweep_interval();
        tokio::spawn(async move {
            log::info!(
                "Heartbeat monitor started (sweep every {:?}, timeout {:?})",
                interval,
                self.config.heartbeat_timeout()
            );
            loop {
                if sleep_unless_shutdown(interval, &shutdown).await {
                    break;
                }
                let abandoned = self.sweep_once().await;
                if abandoned > 0 {
                    log::info!("Heartbeat sweep abandoned {} session(s)", abandoned);
                }
            }
            log::info!("Heartbeat monitor stopped");
        })
    }
}
