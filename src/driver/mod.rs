//! Browser automation driver boundary
//!
//! The engine treats the automation backend as an opaque capability with
//! three operations: spin up a fresh job, resume one from a checkpoint,
//! release a handle. Everything behind the handle (browser memory, DOM,
//! live view plumbing) belongs to the driver.

pub mod process;

pub use process::{CommandDriver, CommandDriverConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver spin failed: {0}")]
    Spin(String),

    #[error("driver resume failed: {0}")]
    Resume(String),
}

/// Opaque reference to a live automation job held by the driver.
///
/// Exists only in process memory; a restart invalidates every handle and
/// recovery mints fresh ones from resume tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriverHandle {
    pub id: String,
}

impl DriverHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// External automation backend.
///
/// `release` is best-effort: it must not raise on a handle that is already
/// gone, so callers can always fire it during cleanup paths.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn spin(&self, target_url: &str) -> Result<DriverHandle, DriverError>;

    async fn resume(&self, resume_token: &str) -> Result<DriverHandle, DriverError>;

    async fn release(&self, handle: DriverHandle);
}
