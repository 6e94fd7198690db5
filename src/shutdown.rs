// Graceful shutdown handling for signal trapping

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared shutdown state across the application
#[derive(Clone, Default)]
pub struct ShutdownState {
    /// Flag indicating shutdown has been requested
    shutdown_requested: Arc<AtomicBool>,
    /// Flag indicating cleanup has completed
    cleanup_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    /// Create a new shutdown state
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            cleanup_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request a shutdown
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        log::info!("Shutdown requested");
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Mark cleanup as complete
    pub fn mark_cleanup_complete(&self) {
        self.cleanup_complete.store(true, Ordering::SeqCst);
        log::info!("Cleanup complete");
    }

    /// Check if cleanup is complete
    pub fn is_cleanup_complete(&self) -> bool {
        self.cleanup_complete.load(Ordering::SeqCst)
    }

    /// Reset shutdown state (for testing)
    pub fn reset(&self) {
        self.shutdown_requested.store(false, Ordering::SeqCst);
        self.cleanup_complete.store(false, Ordering::SeqCst);
    }
}

/// Sleep for the given duration, waking early if shutdown is requested.
/// Returns true when shutdown was requested.
pub async fn sleep_unless_shutdown(duration: Duration, shutdown: &ShutdownState) -> bool {
    let poll = Duration::from_millis(100);
    let mut remaining = duration;

    while remaining > Duration::ZERO {
        if shutdown.is_shutdown_requested() {
            return true;
        }
        let step = remaining.min(poll);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }

    shutdown.is_shutdown_requested()
}

/// Register signal handlers for graceful shutdown
/// This sets up handlers for SIGINT (Ctrl+C), SIGTERM, and SIGHUP
#[cfg(unix)]
pub fn register_signal_handlers(state: ShutdownState) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .map_err(|e| anyhow::anyhow!("Failed to register signal handlers: {}", e))?;

    thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGINT => {
                    log::info!("Received SIGINT (Ctrl+C)");
                    state.request_shutdown();
                }
                SIGTERM => {
                    log::info!("Received SIGTERM");
                    state.request_shutdown();
                }
                SIGHUP => {
                    log::info!("Received SIGHUP");
                    state.request_shutdown();
                }
                _ => {}
            }
        }
    });

    log::info!("Signal handlers registered (SIGINT, SIGTERM, SIGHUP)");
    Ok(())
}

/// Register signal handlers for Windows
#[cfg(windows)]
pub fn register_signal_handlers(state: ShutdownState) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C");
        state.request_shutdown();
    })
    .map_err(|e| anyhow::anyhow!("Failed to register Ctrl+C handler: {}", e))?;

    log::info!("Signal handler registered (Ctrl+C)");
    Ok(())
}
