//! Child-process driver implementation
//!
//! Runs one external automation runner process per session. The runner
//! program is configurable; it receives the target URL (or a resume
//! checkpoint) on its command line and owns the actual browser from there.

use super::{BrowserDriver, DriverError, DriverHandle};
use crate::utils::lock_mutex_recover;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

/// Configuration for the runner command
#[derive(Debug, Clone)]
pub struct CommandDriverConfig {
    /// Program to execute for each session
    pub program: String,
    /// Arguments prepended before the per-session flags
    pub base_args: Vec<String>,
}

/// Driver that spawns one runner child process per live session
pub struct CommandDriver {
    config: CommandDriverConfig,
    /// Map of handle ID to running process
    children: Arc<Mutex<HashMap<String, Child>>>,
}

impl CommandDriver {
    pub fn new(config: CommandDriverConfig) -> Self {
        Self {
            config,
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of runner processes currently tracked
    pub fn running(&self) -> usize {
        lock_mutex_recover(&self.children).len()
    }

    fn spawn_runner(&self, extra_args: &[&str]) -> Result<DriverHandle, String> {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.base_args);
        command.args(extra_args);

        let program = self.config.program.clone();
        let child = command
            .stdin(Stdio::null()) // Prevent stdin issues causing early exit
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("Failed to spawn runner '{}': {}", program, e))?;

        let pid = child.id();
        let handle = DriverHandle::new(uuid::Uuid::new_v4().to_string());

        {
            let mut children = lock_mutex_recover(&self.children);
            children.insert(handle.id.clone(), child);
            log::info!(
                "Runner spawned with PID {} as handle {}. Total running: {}",
                pid,
                handle.id,
                children.len()
            );
        }

        Ok(handle)
    }

    /// Kill every tracked runner process. Used during shutdown cleanup.
    pub fn release_all(&self) -> usize {
        let mut children = lock_mutex_recover(&self.children);
        let count = children.len();
        for (handle_id, child) in children.iter_mut() {
            log::info!("Killing runner for handle {}", handle_id);
            let _ = child.kill(); // Best effort
            let _ = child.wait();
        }
        children.clear();
        count
    }
}

#[async_trait]
impl BrowserDriver for CommandDriver {
    async fn spin(&self, target_url: &str) -> Result<DriverHandle, DriverError> {
        self.spawn_runner(&["--target-url", target_url])
            .map_err(DriverError::Spin)
    }

    async fn resume(&self, resume_token: &str) -> Result<DriverHandle, DriverError> {
        self.spawn_runner(&["--resume-token", resume_token])
            .map_err(DriverError::Resume)
    }

    async fn release(&self, handle: DriverHandle) {
        let child = {
            let mut children = lock_mutex_recover(&self.children);
            children.remove(&handle.id)
        };

        match child {
            Some(mut child) => {
                let _ = child.kill(); // Best effort
                let _ = child.wait();
                log::info!("Released runner for handle {}", handle.id);
            }
            None => {
                // Already released; release must never raise
                log::debug!("Release for unknown handle {} ignored", handle.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_driver() -> CommandDriver {
        CommandDriver::new(CommandDriverConfig {
            program: "sleep".to_string(),
            base_args: vec!["30".to_string()],
        })
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_spin_and_release() {
        let driver = sleep_driver();

        let handle = driver.spin("https://example.com").await.unwrap();
        assert_eq!(driver.running(), 1);

        driver.release(handle).await;
        assert_eq!(driver.running(), 0);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_release_unknown_handle_is_noop() {
        let driver = sleep_driver();
        driver.release(DriverHandle::new("ghost")).await;
        assert_eq!(driver.running(), 0);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_release_all() {
        let driver = sleep_driver();
        driver.spin("https://a").await.unwrap();
        driver.spin("https://b").await.unwrap();

        assert_eq!(driver.release_all(), 2);
        assert_eq!(driver.running(), 0);
    }

    #[tokio::test]
    async fn test_spin_missing_program_fails() {
        let driver = CommandDriver::new(CommandDriverConfig {
            program: "definitely-not-a-real-binary-3f9a".to_string(),
            base_args: vec![],
        });

        let result = driver.spin("https://example.com").await;
        assert!(matches!(result, Err(DriverError::Spin(_))));
    }
}
