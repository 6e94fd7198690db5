//! In-memory registry of live sessions
//!
//! Holds the driver handle and freshest activity timestamp for every
//! session this process instance owns, plus the per-id operation locks
//! that serialize manager, monitor, and recovery work on the same id.
//! The registry is never persisted; a restart empties it by definition.

use crate::driver::DriverHandle;
use crate::utils::lock_mutex_recover;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A session currently owned by this process instance
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub handle: DriverHandle,
    pub last_active_at: DateTime<Utc>,
}

/// Registry shared by SessionManager, HeartbeatMonitor, and
/// RecoveryCoordinator via dependency injection
#[derive(Default)]
pub struct LiveRegistry {
    sessions: Mutex<HashMap<String, LiveSession>>,
    op_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            op_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get (or create) the per-id operation lock. Every operation that
    /// mutates a session takes this first; operations on distinct ids
    /// never contend.
    pub fn op_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = lock_mutex_recover(&self.op_locks);

        // Drop lock entries nobody holds anymore once the table has grown
        // past the live session count
        if locks.len() > 64 && locks.len() > lock_mutex_recover(&self.sessions).len() * 2 {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Register a live handle for a session, stamping it active now
    pub fn insert(&self, id: &str, handle: DriverHandle) {
        let mut sessions = lock_mutex_recover(&self.sessions);
        sessions.insert(
            id.to_string(),
            LiveSession {
                handle,
                last_active_at: Utc::now(),
            },
        );
    }

    /// Remove a session, returning its live state if it was present
    pub fn remove(&self, id: &str) -> Option<LiveSession> {
        let mut sessions = lock_mutex_recover(&self.sessions);
        sessions.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        let sessions = lock_mutex_recover(&self.sessions);
        sessions.contains_key(id)
    }

    /// Advance a session's activity timestamp to `max(current, timestamp)`.
    /// Returns false if the session is not registered.
    pub fn touch(&self, id: &str, timestamp: DateTime<Utc>) -> bool {
        let mut sessions = lock_mutex_recover(&self.sessions);
        match sessions.get_mut(id) {
            Some(live) => {
                if timestamp > live.last_active_at {
                    live.last_active_at = timestamp;
                }
                true
            }
            None => false,
        }
    }

    pub fn last_active_at(&self, id: &str) -> Option<DateTime<Utc>> {
        let sessions = lock_mutex_recover(&self.sessions);
        sessions.get(id).map(|live| live.last_active_at)
    }

    /// Ids of sessions whose last activity is older than the cutoff
    pub fn ids_idle_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let sessions = lock_mutex_recover(&self.sessions);
        sessions
            .iter()
            .filter(|(_, live)| live.last_active_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of every live session owned by this process
    pub fn ids(&self) -> Vec<String> {
        let sessions = lock_mutex_recover(&self.sessions);
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove and return every live session. Used for shutdown cleanup.
    pub fn drain(&self) -> Vec<(String, LiveSession)> {
        let mut sessions = lock_mutex_recover(&self.sessions);
        sessions.drain().collect()
    }

    pub fn len(&self) -> usize {
        let sessions = lock_mutex_recover(&self.sessions);
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let registry = LiveRegistry::new();
        assert!(!registry.contains("s-1"));

        registry.insert("s-1", DriverHandle::new("h-1"));
        assert!(registry.contains("s-1"));
        assert_eq!(registry.len(), 1);

        let live = registry.remove("s-1").unwrap();
        assert_eq!(live.handle.id, "h-1");
        assert!(registry.is_empty());
        assert!(registry.remove("s-1").is_none());
    }

    #[test]
    fn test_touch_is_monotone() {
        let registry = LiveRegistry::new();
        registry.insert("s-1", DriverHandle::new("h-1"));
        let base = registry.last_active_at("s-1").unwrap();

        let later = base + chrono::Duration::seconds(10);
        assert!(registry.touch("s-1", later));
        assert_eq!(registry.last_active_at("s-1").unwrap(), later);

        // Stale timestamps never move the clock backwards
        assert!(registry.touch("s-1", base - chrono::Duration::seconds(10)));
        assert_eq!(registry.last_active_at("s-1").unwrap(), later);
    }

    #[test]
    fn test_touch_unknown_session_returns_false() {
        let registry = LiveRegistry::new();
        assert!(!registry.touch("ghost", Utc::now()));
    }

    #[test]
    fn test_ids_idle_since() {
        let registry = LiveRegistry::new();
        registry.insert("fresh", DriverHandle::new("h-1"));
        registry.insert("stale", DriverHandle::new("h-2"));

        let future = Utc::now() + chrono::Duration::seconds(60);
        registry.touch("fresh", future);

        let idle = registry.ids_idle_since(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(idle, vec!["stale".to_string()]);
    }

    #[test]
    fn test_ids_sorted() {
        let registry = LiveRegistry::new();
        registry.insert("s-b", DriverHandle::new("h-1"));
        registry.insert("s-a", DriverHandle::new("h-2"));

        assert_eq!(registry.ids(), vec!["s-a".to_string(), "s-b".to_string()]);
    }

    #[test]
    fn test_drain_empties_registry() {
        let registry = LiveRegistry::new();
        registry.insert("s-1", DriverHandle::new("h-1"));
        registry.insert("s-2", DriverHandle::new("h-2"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_op_lock_serializes_same_id() {
        let registry = Arc::new(LiveRegistry::new());

        let lock = registry.op_lock("s-1");
        let guard = lock.lock().await;

        // Same id yields the same lock instance
        let lock_again = registry.op_lock("s-1");
        assert!(lock_again.try_lock().is_err());

        // A different id never contends
        let other = registry.op_lock("s-2");
        assert!(other.try_lock().is_ok());

        drop(guard);
        assert!(lock_again.try_lock().is_ok());
    }
}
