//! Durable session record storage
//!
//! The store is the single source of truth that survives process restarts.
//! `update_status` is a compare-and-set and is the only concurrency-control
//! primitive the rest of the engine relies on; no distributed lock service
//! is assumed.

pub mod file;
pub mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use crate::models::{SessionRecord, SessionStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session record {0} not found")]
    NotFound(String),

    #[error("session record {0} already exists")]
    AlreadyExists(String),

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Retryable: the durable store is unreachable or an operation could
    /// not be applied atomically. No record is ever left partially written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value-like storage over session records, keyed by id.
///
/// Operations are single-record and either fully apply or not at all.
/// Implementations are called from async contexts but are synchronous
/// themselves; every call is short and bounded.
pub trait SessionStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on a duplicate id.
    fn create(&self, record: &SessionRecord) -> StoreResult<()>;

    /// Fetch a record by id.
    fn get(&self, id: &str) -> StoreResult<SessionRecord>;

    /// Compare-and-set status transition. Applies `from -> to` only when
    /// the record's current status equals `from`; returns `false` without
    /// modifying the record otherwise. Transitions outside the state graph
    /// are rejected with `InvalidTransition`.
    fn update_status(&self, id: &str, from: SessionStatus, to: SessionStatus)
        -> StoreResult<bool>;

    /// Advance `last_active_at` to `max(current, timestamp)`. Never
    /// decreases it and never changes status.
    fn touch(&self, id: &str, timestamp: DateTime<Utc>) -> StoreResult<()>;

    /// Persist the latest resume checkpoint pointer for a record.
    fn set_resume_token(&self, id: &str, token: &str) -> StoreResult<()>;

    /// All records currently in the given status.
    fn query_by_status(&self, status: SessionStatus) -> StoreResult<Vec<SessionRecord>>;
}
