//! File-backed session store
//!
//! Stores one JSON file per record under `<root>/sessions/{id}.json`.
//! Mutations happen under a per-record advisory file lock (fs2) so the
//! compare-and-set holds across process instances sharing the same data
//! directory, and every write is a temp-file-plus-rename so a crash never
//! leaves a half-written record behind.

use super::{SessionStore, StoreError, StoreResult};
use crate::models::{state_machine, SessionRecord, SessionStatus};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Version of the record file format
const RECORD_FILE_VERSION: u32 = 1;

/// On-disk wrapper around a session record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordFile {
    /// File format version
    version: u32,
    /// When this file was last updated
    updated_at: DateTime<Utc>,
    /// The session record
    record: SessionRecord,
}

pub struct FileSessionStore {
    sessions_dir: PathBuf,
    locks_dir: PathBuf,
}

impl FileSessionStore {
    /// Open (and initialize) a store rooted at the given data directory
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let sessions_dir = root.as_ref().join("sessions");
        let locks_dir = sessions_dir.join(".locks");
        ensure_dir(&sessions_dir)?;
        ensure_dir(&locks_dir)?;
        Ok(Self {
            sessions_dir,
            locks_dir,
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", id))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", id))
    }

    /// Take the per-record exclusive lock. The lock is released when the
    /// returned file handle is dropped.
    fn lock_record(&self, id: &str) -> StoreResult<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(id))
            .map_err(|e| StoreError::Unavailable(format!("failed to open lock file: {}", e)))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| StoreError::Unavailable(format!("failed to lock record {}: {}", id, e)))?;
        Ok(lock_file)
    }

    fn read_record(&self, id: &str) -> StoreResult<SessionRecord> {
        validate_id(id)?;
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let file: RecordFile = read_json(&path)?;
        Ok(file.record)
    }

    fn write_record(&self, record: &SessionRecord) -> StoreResult<()> {
        let file = RecordFile {
            version: RECORD_FILE_VERSION,
            updated_at: Utc::now(),
            record: record.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Unavailable(format!("failed to serialize record: {}", e)))?;
        atomic_write(&self.record_path(&record.id), &content)
    }
}

impl SessionStore for FileSessionStore {
    fn create(&self, record: &SessionRecord) -> StoreResult<()> {
        validate_id(&record.id)?;
        let _lock = self.lock_record(&record.id)?;
        if self.record_path(&record.id).exists() {
            return Err(StoreError::AlreadyExists(record.id.clone()));
        }
        self.write_record(record)?;
        log::debug!("Created session record {}", record.id);
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<SessionRecord> {
        self.read_record(id)
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

        let _lock = self.lock_record(id)?;
        let mut record = self.read_record(id)?;
        if record.status != from {
            return Ok(false);
        }
        record.status = to;
        self.write_record(&record)?;
        log::debug!("Session {} transitioned {} -> {}", id, from, to);
        Ok(true)
    }

    fn touch(&self, id: &str, timestamp: DateTime<Utc>) -> StoreResult<()> {
        let _lock = self.lock_record(id)?;
        let mut record = self.read_record(id)?;
        if timestamp > record.last_active_at {
            record.last_active_at = timestamp;
            self.write_record(&record)?;
        }
        Ok(())
    }

    fn set_resume_token(&self, id: &str, token: &str) -> StoreResult<()> {
        let _lock = self.lock_record(id)?;
        let mut record = self.read_record(id)?;
        record.resume_token = Some(token.to_string());
        self.write_record(&record)
    }

    fn query_by_status(&self, status: SessionStatus) -> StoreResult<Vec<SessionRecord>> {
        let entries = fs::read_dir(&self.sessions_dir)
            .map_err(|e| StoreError::Unavailable(format!("failed to read sessions dir: {}", e)))?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| StoreError::Unavailable(format!("failed to read dir entry: {}", e)))?;
            let path = entry.path();

            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            match read_json::<RecordFile>(&path) {
                Ok(file) => {
                    if file.record.status == status {
                        records.push(file.record);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to read record file {:?}: {}", path, e);
                }
            }
        }

        // Oldest first so recovery drains the longest-orphaned jobs first
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

/// Record ids become file names; reject anything that could escape the
/// sessions directory.
fn validate_id(id: &str) -> StoreResult<()> {
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

fn ensure_dir(dir: &Path) -> StoreResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| StoreError::Unavailable(format!("failed to create {:?}: {}", dir, e)))
}

/// Write content to a temp file in the same directory, then rename over
/// the target so readers only ever see a complete file.
fn atomic_write(path: &Path, content: &str) -> StoreResult<()> {
    let tmp_path = path.with_extension("json.tmp");

    let mut tmp = File::create(&tmp_path)
        .map_err(|e| StoreError::Unavailable(format!("failed to create {:?}: {}", tmp_path, e)))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| StoreError::Unavailable(format!("failed to write {:?}: {}", tmp_path, e)))?;
    tmp.sync_all()
        .map_err(|e| StoreError::Unavailable(format!("failed to sync {:?}: {}", tmp_path, e)))?;
    drop(tmp);

    fs::rename(&tmp_path, path)
        .map_err(|e| StoreError::Unavailable(format!("failed to rename into {:?}: {}", path, e)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| StoreError::Unavailable(format!("failed to read {:?}: {}", path, e)))?;
    serde_json::from_str(&content)
        .map_err(|e| StoreError::Unavailable(format!("failed to parse {:?}: {}", path, e)))
}
