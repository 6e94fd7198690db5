//! Engine configuration
//!
//! Loaded from a YAML file when present, otherwise defaults apply. Every
//! timeout, deadline, and concurrency limit the engine uses lives here so
//! operators can tune them without a rebuild.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Seconds without a heartbeat before a session counts as abandoned
    pub heartbeat_timeout_secs: u64,
    /// Seconds between heartbeat monitor sweeps; must be materially
    /// shorter than the heartbeat timeout to bound the leak window
    pub sweep_interval_secs: u64,
    /// Deadline for a driver spin call
    pub spin_deadline_secs: u64,
    /// Deadline for a driver resume call during recovery
    pub resume_deadline_secs: u64,
    /// Maximum concurrent resume attempts during a recovery run
    pub recovery_parallelism: usize,
    /// Seconds between periodic recovery runs; 0 disables periodic runs
    /// (recovery still always runs once at startup)
    pub recovery_interval_secs: u64,
    /// Age in seconds after which a record stuck in resuming is
    /// reclassified as failed (a coordinator died mid-step)
    pub resuming_stale_secs: u64,
    /// Retry attempts for heartbeat-path store writes
    pub store_retry_attempts: u32,
    /// Initial backoff for heartbeat-path store retries, in milliseconds
    pub store_retry_initial_ms: u64,
    /// Runner program for the child-process driver
    pub driver_program: String,
    /// Arguments always passed to the runner program
    pub driver_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            heartbeat_timeout_secs: 120,
            sweep_interval_secs: 15,
            spin_deadline_secs: 60,
            resume_deadline_secs: 60,
            recovery_parallelism: 4,
            recovery_interval_secs: 0,
            resuming_stale_secs: 900,
            store_retry_attempts: 3,
            store_retry_initial_ms: 200,
            driver_program: "browser-runner".to_string(),
            driver_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration values
    /// Returns Ok(()) if valid, or Err with a descriptive error message
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_timeout_secs == 0 {
            return Err("heartbeat_timeout_secs must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be greater than 0".to_string());
        }
        if self.sweep_interval_secs * 2 > self.heartbeat_timeout_secs {
            return Err(
                "sweep_interval_secs must be at most half of heartbeat_timeout_secs".to_string(),
            );
        }
        if self.spin_deadline_secs == 0 || self.resume_deadline_secs == 0 {
            return Err("driver deadlines must be greater than 0".to_string());
        }
        if self.recovery_parallelism == 0 {
            return Err("recovery_parallelism must be greater than 0".to_string());
        }
        if self.resuming_stale_secs == 0 {
            return Err("resuming_stale_secs must be greater than 0".to_string());
        }
        if self.store_retry_attempts == 0 {
            return Err("store_retry_attempts must be greater than 0".to_string());
        }
        if self.driver_program.is_empty() {
            return Err("driver_program must not be empty".to_string());
        }
        Ok(())
    }

    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            log::info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;
        let config: EngineConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn heartbeat_timeout_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }

    pub fn spin_deadline(&self) -> Duration {
        Duration::from_secs(self.spin_deadline_secs)
    }

    pub fn resume_deadline(&self) -> Duration {
        Duration::from_secs(self.resume_deadline_secs)
    }

    pub fn recovery_interval(&self) -> Option<Duration> {
        if self.recovery_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.recovery_interval_secs))
        }
    }

    pub fn resuming_stale_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.resuming_stale_secs as i64)
    }

    pub fn store_retry_initial(&self) -> Duration {
        Duration::from_millis(self.store_retry_initial_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sweep_must_be_materially_shorter_than_timeout() {
        let config = EngineConfig {
            heartbeat_timeout_secs: 20,
            sweep_interval_secs: 15,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = EngineConfig {
            recovery_parallelism: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config =
            EngineConfig::load_or_default(Path::new("/nonexistent/warden/config.yaml")).unwrap();
        assert_eq!(
            config.heartbeat_timeout_secs,
            EngineConfig::default().heartbeat_timeout_secs
        );
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "heartbeatTimeoutSecs: 45\nrecoveryParallelism: 2\n").unwrap();

        let config = EngineConfig::load_or_default(&path).unwrap();
        assert_eq!(config.heartbeat_timeout_secs, 45);
        assert_eq!(config.recovery_parallelism, 2);
        // Unspecified fields keep their defaults
        assert_eq!(
            config.sweep_interval_secs,
            EngineConfig::default().sweep_interval_secs
        );
    }

    #[test]
    fn test_recovery_interval_zero_disables_periodic_runs() {
        let config = EngineConfig::default();
        assert!(config.recovery_interval().is_none());

        let config = EngineConfig {
            recovery_interval_secs: 300,
            ..Default::default()
        };
        assert_eq!(
            config.recovery_interval(),
            Some(Duration::from_secs(300))
        );
    }
}
