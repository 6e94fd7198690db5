//! End-to-end session lifecycle tests over the in-memory store and a mock
//! driver: start, heartbeat, abandonment, and terminate semantics.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use warden_lib::config::EngineConfig;
use warden_lib::driver::{BrowserDriver, DriverError, DriverHandle};
use warden_lib::events::TransitionNotifier;
use warden_lib::models::{SessionStatus, TerminalOutcome};
use warden_lib::session::{HeartbeatMonitor, LiveRegistry, SessionManager, TerminateAck};
use warden_lib::store::{MemorySessionStore, SessionStore};

#[derive(Default)]
struct MockDriver {
    spin_calls: AtomicUsize,
    release_calls: AtomicUsize,
    fail_spin: AtomicBool,
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn spin(&self, _target_url: &str) -> Result<DriverHandle, DriverError> {
        self.spin_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_spin.load(Ordering::SeqCst) {
            return Err(DriverError::Spin("backend refused".to_string()));
        }
        Ok(DriverHandle::new(uuid::Uuid::new_v4().to_string()))
    }

    async fn resume(&self, _resume_token: &str) -> Result<DriverHandle, DriverError> {
        Ok(DriverHandle::new(uuid::Uuid::new_v4().to_string()))
    }

    async fn release(&self, _handle: DriverHandle) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        // Zero timeout makes every registered session immediately stale
        // for sweep tests; sweeps only run when a test invokes them
        heartbeat_timeout_secs: 0,
        sweep_interval_secs: 1,
        spin_deadline_secs: 5,
        resume_deadline_secs: 5,
        recovery_parallelism: 2,
        recovery_interval_secs: 0,
        resuming_stale_secs: 900,
        store_retry_attempts: 2,
        store_retry_initial_ms: 10,
        driver_program: "test-runner".to_string(),
        driver_args: Vec::new(),
    }
}

struct Harness {
    store: Arc<MemorySessionStore>,
    driver: Arc<MockDriver>,
    registry: Arc<LiveRegistry>,
    manager: SessionManager,
    monitor: HeartbeatMonitor,
}

fn setup() -> Harness {
    let store = Arc::new(MemorySessionStore::new());
    let driver = Arc::new(MockDriver::default());
    let registry = Arc::new(LiveRegistry::new());
    let config = test_config();

    let manager = SessionManager::new(
        store.clone() as Arc<dyn SessionStore>,
        driver.clone(),
        registry.clone(),
        config.clone(),
        TransitionNotifier::disabled(),
    );
    let monitor = HeartbeatMonitor::new(
        store.clone() as Arc<dyn SessionStore>,
        driver.clone(),
        registry.clone(),
        config,
        TransitionNotifier::disabled(),
    );

    Harness {
        store,
        driver,
        registry,
        manager,
        monitor,
    }
}

#[tokio::test]
async fn test_start_session_returns_active_session() {
    // Scenario A
    let h = setup();

    let id = h.manager.start_session("u1", "https://x").await.unwrap();
    assert_eq!(h.manager.get_status(&id).unwrap(), SessionStatus::Active);

    let record = h.store.get(&id).unwrap();
    assert_eq!(record.owner, "u1");
    assert_eq!(record.target_url, "https://x");
    assert_eq!(record.status, SessionStatus::Active);
    assert!(record.resume_token.is_none());

    assert!(h.registry.contains(&id));
    assert_eq!(h.driver.spin_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_session_driver_failure_creates_no_record() {
    let h = setup();
    h.driver.fail_spin.store(true, Ordering::SeqCst);

    let result = h.manager.start_session("u1", "https://x").await;
    assert!(result.is_err());
    assert!(h.store.is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_missed_heartbeats_abandon_session() {
    // Scenario B: no heartbeat within the timeout
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();

    let abandoned = h.monitor.sweep_once().await;
    assert_eq!(abandoned, 1);

    assert_eq!(
        h.manager.get_status(&id).unwrap(),
        SessionStatus::Abandoned
    );
    assert!(!h.registry.contains(&id));
    // The driver handle was released exactly once
    assert_eq!(h.driver.release_calls.load(Ordering::SeqCst), 1);

    // A second sweep finds nothing left to do
    assert_eq!(h.monitor.sweep_once().await, 0);
    assert_eq!(h.driver.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_heartbeat_advances_last_active_monotonically() {
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();

    let mut previous = h.store.get(&id).unwrap().last_active_at;
    for _ in 0..3 {
        h.manager.heartbeat(&id).await.unwrap();
        let current = h.store.get(&id).unwrap().last_active_at;
        assert!(current >= previous);
        previous = current;
    }
    assert!(previous >= h.store.get(&id).unwrap().created_at);
}

#[tokio::test]
async fn test_heartbeat_unknown_session_is_not_found() {
    let h = setup();
    assert!(h.manager.heartbeat("ghost").await.is_err());
}

#[tokio::test]
async fn test_heartbeat_after_abandonment_is_not_found() {
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();
    h.monitor.sweep_once().await;

    assert!(h.manager.heartbeat(&id).await.is_err());
    // The failed heartbeat never resurrects the record
    assert_eq!(
        h.store.get(&id).unwrap().status,
        SessionStatus::Abandoned
    );
}

#[tokio::test]
async fn test_update_resume_token_persists() {
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();

    h.manager.update_resume_token(&id, "ckpt-7").await.unwrap();
    assert_eq!(
        h.store.get(&id).unwrap().resume_token.as_deref(),
        Some("ckpt-7")
    );

    assert!(h
        .manager
        .update_resume_token("ghost", "ckpt-8")
        .await
        .is_err());
}

#[tokio::test]
async fn test_terminate_completed() {
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();

    let ack = h
        .manager
        .terminate(&id, TerminalOutcome::Completed)
        .await
        .unwrap();
    assert_eq!(ack, TerminateAck::Terminated);
    assert_eq!(
        h.manager.get_status(&id).unwrap(),
        SessionStatus::Completed
    );
    assert!(!h.registry.contains(&id));
    assert_eq!(h.driver.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_terminate_is_idempotent() {
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();

    h.manager
        .terminate(&id, TerminalOutcome::Failed)
        .await
        .unwrap();
    let ack = h
        .manager
        .terminate(&id, TerminalOutcome::Completed)
        .await
        .unwrap();

    // The second call is a no-op acknowledgement; the first outcome stands
    assert_eq!(ack, TerminateAck::AlreadyTerminated);
    assert_eq!(h.manager.get_status(&id).unwrap(), SessionStatus::Failed);
    assert_eq!(h.driver.release_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_terminate_unknown_session_is_not_found() {
    let h = setup();
    assert!(h
        .manager
        .terminate("ghost", TerminalOutcome::Completed)
        .await
        .is_err());
}

#[tokio::test]
async fn test_get_status_falls_back_to_durable_record() {
    let h = setup();
    let id = h.manager.start_session("u1", "https://x").await.unwrap();

    // Simulate losing the in-memory entry without touching the record
    h.registry.remove(&id);
    assert_eq!(h.manager.get_status(&id).unwrap(), SessionStatus::Active);

    assert!(h.manager.get_status("ghost").is_err());
}

#[tokio::test]
async fn test_concurrent_operations_on_distinct_sessions() {
    let h = setup();
    let manager = Arc::new(h.manager);

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .start_session(&format!("u{}", i), "https://x")
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(h.registry.len(), 8);

    for id in &ids {
        assert_eq!(manager.get_status(id).unwrap(), SessionStatus::Active);
    }
}
