//! In-memory session store
//!
//! Backs tests and embedded use with the same contract as the file store.
//! The whole map sits behind one mutex, so compare-and-set is atomic by
//! construction.

use super::{SessionStore, StoreError, StoreResult};
use crate::models::{state_machine, SessionRecord, SessionStatus};
use crate::utils::lock_mutex_recover;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Number of records held, regardless of status
    pub fn len(&self) -> usize {
        lock_mutex_recover(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, record: &SessionRecord) -> StoreResult<()> {
        let mut records = lock_mutex_recover(&self.records);
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<SessionRecord> {
        let records = lock_mutex_recover(&self.records);
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_status(
        &self,
        id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> StoreResult<bool> {
        if !state_machine::can_transition(from, to) {
            return Err(StoreError::InvalidTransition { from, to });
        }

        let mut records = lock_mutex_recover(&self.records);
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.status != from {
            return Ok(false);
        }
        record.status = to;
        Ok(true)
    }

    fn touch(&self, id: &str, timestamp: DateTime<Utc>) -> StoreResult<()> {
        let mut records = lock_mutex_recover(&self.records);
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if timestamp > record.last_active_at {
            record.last_active_at = timestamp;
        }
        Ok(())
    }

    fn set_resume_token(&self, id: &str, token: &str) -> StoreResult<()> {
        let mut records = lock_mutex_recover(&self.records);
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.resume_token = Some(token.to_string());
        Ok(())
    }

    fn query_by_status(&self, status: SessionStatus) -> StoreResult<Vec<SessionRecord>> {
        let records = lock_mutex_recover(&self.records);
        let mut matching: Vec<SessionRecord> = records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_get_round_trip() {
        let store = MemorySessionStore::new();
        store
            .create(&SessionRecord::new("s-1", "u", "https://x"))
            .unwrap();

        let record = store.get("s-1").unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert!(store.get("s-2").is_err());
    }

    #[test]
    fn test_compare_and_set_single_winner() {
        let store = MemorySessionStore::new();
        store
            .create(&SessionRecord::new("s-1", "u", "https://x"))
            .unwrap();

        let first = store
            .update_status("s-1", SessionStatus::Active, SessionStatus::Resuming)
            .unwrap();
        let second = store
            .update_status("s-1", SessionStatus::Active, SessionStatus::Resuming)
            .unwrap();

        assert!(first);
        assert!(!second);
    }

    #[test]
    fn test_touch_is_monotone() {
        let store = MemorySessionStore::new();
        let record = SessionRecord::new("s-1", "u", "https://x");
        let base = record.last_active_at;
        store.create(&record).unwrap();

        store.touch("s-1", base + chrono::Duration::seconds(5)).unwrap();
        store.touch("s-1", base - chrono::Duration::seconds(5)).unwrap();

        assert_eq!(
            store.get("s-1").unwrap().last_active_at,
            base + chrono::Duration::seconds(5)
        );
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let store = MemorySessionStore::new();
        store
            .create(&SessionRecord::new("s-1", "u", "https://x"))
            .unwrap();

        assert!(store
            .update_status("s-1", SessionStatus::Failed, SessionStatus::Active)
            .is_err());
    }

    #[test]
    fn test_query_by_status_sorted_oldest_first() {
        let store = MemorySessionStore::new();

        let mut first = SessionRecord::new("s-1", "u", "https://a");
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let second = SessionRecord::new("s-2", "u", "https://b");
        store.create(&second).unwrap();
        store.create(&first).unwrap();

        let active = store.query_by_status(SessionStatus::Active).unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, "s-1");
        assert_eq!(active[1].id, "s-2");
    }
}
