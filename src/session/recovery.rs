//! Startup reconciliation of durable records against reality
//!
//! In-memory state never survives a restart, so any Active record found
//! durable at startup is orphaned with respect to this process. Each one
//! is driven through a resume-or-fail transition exactly once: the
//! compare-and-set claim (`Active -> Resuming`) gives a single coordinator
//! exclusive rights, and a final claim check before the outcome write
//! turns every lost race into a silent no-op. Repeated runs are
//! convergent: terminal records change nothing, claimed records make one
//! forward transition per claim win.

use crate::config::EngineConfig;
use crate::driver::BrowserDriver;
use crate::events::{TransitionKind, TransitionNotifier};
use crate::models::{SessionRecord, SessionStatus};
use crate::session::LiveRegistry;
use crate::shutdown::{sleep_unless_shutdown, ShutdownState};
use crate::store::{SessionStore, StoreError};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// What happened to one recovery candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryOutcome {
    /// Claim won and the job resumed with a fresh handle
    Resumed,
    /// Claim won but the resume attempt resolved to Failed
    Failed,
    /// Claim lost, session already live here, or result discarded
    Skipped,
}

/// Summary of one recovery run
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub resumed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Records stuck in Resuming past the staleness threshold that were
    /// reclassified as Failed
    pub reclaimed: usize,
}

pub struct RecoveryCoordinator {
    store: Arc<dyn SessionStore>,
    driver: Arc<dyn BrowserDriver>,
    registry: Arc<LiveRegistry>,
    config: EngineConfig,
    notifier: TransitionNotifier,
}

impl RecoveryCoordinator {
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

    /// One full reconciliation pass. Resume attempts run concurrently,
    /// capped by the configured parallelism so a fleet-wide restart does
    /// not saturate the automation backend.
    pub async fn run(self: &Arc<Self>) -> Result<RecoveryReport, StoreError> {
        let mut report = RecoveryReport {
            reclaimed: self.reclaim_stale_resuming()?,
            ..Default::default()
        };

        let candidates = self.store.query_by_status(SessionStatus::Active)?;
        if candidates.is_empty() {
            return Ok(report);
        }
        log::info!("Recovery found {} active record(s) to reconcile", candidates.len());

        let semaphore = Arc::new(Semaphore::new(self.config.recovery_parallelism));
        let mut tasks = Vec::with_capacity(candidates.len());

        for record in candidates {
            let coordinator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return RecoveryOutcome::Skipped;
                };
                coordinator.recover_one(record).await
            }));
        }

        for task in tasks {
            match task.await {
                Ok(RecoveryOutcome::Resumed) => report.resumed += 1,
                Ok(RecoveryOutcome::Failed) => report.failed += 1,
                Ok(RecoveryOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    log::error!("Recovery task panicked: {}", e);
                    report.skipped += 1;
                }
            }
        }

        log::info!(
            "Recovery run complete: {} resumed, {} failed, {} skipped, {} reclaimed",
            report.resumed,
            report.failed,
            report.skipped,
            report.reclaimed
        );
        Ok(report)
    }

    /// Drive a single claimed candidate through resume-or-fail
    async fn recover_one(&self, record: SessionRecord) -> RecoveryOutcome {
        let id = record.id.clone();

        let lock = self.registry.op_lock(&id);
        let _guard = lock.lock().await;

        // A periodic run sees sessions this process already owns; they
        // are not orphans
        if self.registry.contains(&id) {
            return RecoveryOutcome::Skipped;
        }

        // The claim: exactly one coordinator instance wins this
        match self
            .store
            .update_status(&id, SessionStatus::Active, SessionStatus::Resuming)
        {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Claim for session {} lost, skipping", id);
                return RecoveryOutcome::Skipped;
            }
            Err(e) => {
                log::warn!("Claim for session {} errored, skipping: {}", id, e);
                return RecoveryOutcome::Skipped;
            }
        }

        let Some(token) = record.resume_token.as_deref() else {
            return self.fail_resume(&id, "record has no resume checkpoint");
        };

        let resumed = tokio::time::timeout(
            self.config.resume_deadline(),
            self.driver.resume(token),
        )
        .await;

        match resumed {
            Ok(Ok(handle)) => {
                // Final claim check: only the holder of the Resuming claim
                // may publish the outcome. Losing here means an operator
                // repair reclassified the record mid-resume; the fresh
                // handle is discarded.
                match self
                    .store
                    .update_status(&id, SessionStatus::Resuming, SessionStatus::Active)
                {
                    Ok(true) => {
                        self.registry.insert(&id, handle);
                        if let Err(e) = self.store.touch(&id, Utc::now()) {
                            log::warn!("Failed to touch recovered session {}: {}", id, e);
                        }
                        self.notifier.emit(
                            TransitionKind::Resumed,
                            &id,
                            Some(SessionStatus::Resuming),
                            SessionStatus::Active,
                        );
                        log::info!("Session {} resumed with a fresh handle", id);
                        RecoveryOutcome::Resumed
                    }
                    Ok(false) => {
                        log::warn!(
                            "Session {} was resolved while resuming; discarding fresh handle",
                            id
                        );
                        self.driver.release(handle).await;
                        RecoveryOutcome::Skipped
                    }
                    Err(e) => {
                        log::warn!(
                            "Could not publish resume outcome for session {}: {}",
                            id,
                            e
                        );
                        self.driver.release(handle).await;
                        RecoveryOutcome::Skipped
                    }
                }
            }
            Ok(Err(e)) => self.fail_resume(&id, &e.to_string()),
            Err(_) => self.fail_resume(
                &id,
                &format!(
                    "resume deadline of {:?} exceeded",
                    self.config.resume_deadline()
                ),
            ),
        }
    }

    /// Resolve a claimed record to Failed. Every failure mode (driver
    /// error, missing token, deadline) lands here so no record is ever
    /// left stuck in Resuming by a completed attempt.
    fn fail_resume(&self, id: &str, reason: &str) -> RecoveryOutcome {
        log::warn!("Resume for session {} failed: {}", id, reason);

        match self
            .store
            .update_status(id, SessionStatus::Resuming, SessionStatus::Failed)
        {
            Ok(true) => {
                self.notifier.emit(
                    TransitionKind::ResumeFailed,
                    id,
                    Some(SessionStatus::Resuming),
                    SessionStatus::Failed,
                );
                RecoveryOutcome::Failed
            }
            Ok(false) => RecoveryOutcome::Skipped,
            Err(e) => {
                // The record stays Resuming; the staleness reclassifier
                // will resolve it on a later run
                log::warn!("Failed to mark session {} failed: {}", id, e);
                RecoveryOutcome::Skipped
            }
        }
    }

    /// Reclassify records stuck in Resuming longer than the configured
    /// staleness threshold. Covers a coordinator that died between the
    /// claim and the outcome write. A healthy in-flight resume that gets
    /// reclassified by mistake is harmless: its final claim check fails
    /// and the fresh handle is released.
    fn reclaim_stale_resuming(&self) -> Result<usize, StoreError> {
        let stuck = self.store.query_by_status(SessionStatus::Resuming)?;
        if stuck.is_empty() {
            return Ok(0);
        }

        let cutoff = Utc::now() - self.config.resuming_stale_age();
        let mut reclaimed = 0;

        for record in stuck {
            if record.last_active_at >= cutoff {
                continue;
            }
            match self
                .store
                .update_status(&record.id, SessionStatus::Resuming, SessionStatus::Failed)
            {
                Ok(true) => {
                    log::warn!(
                        "Session {} was stuck in resuming since {}; marked failed",
                        record.id,
                        record.last_active_at
                    );
                    self.notifier.emit(
                        TransitionKind::ResumeFailed,
                        &record.id,
                        Some(SessionStatus::Resuming),
                        SessionStatus::Failed,
                    );
                    reclaimed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to reclaim stuck session {}: {}", record.id, e);
                }
            }
        }

        Ok(reclaimed)
    }

    /// Re-run reconciliation on a fixed interval until shutdown, catching
    /// records orphaned by peer instances that died mid-resume
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: std::time::Duration,
        shutdown: ShutdownState,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            log::info!("Periodic recovery started (every {:?})", interval);
            loop {
                if sleep_unless_shutdown(interval, &shutdown).await {
                    break;
                }
                if let Err(e) = self.run().await {
                    log::warn!("Periodic recovery run failed: {}", e);
                }
            }
            log::info!("Periodic recovery stopped");
        })
    }
}
