//! Warden server binary
//!
//! Wires the persistence engine together, runs startup recovery, and
//! serves the HTTP/WebSocket API until a shutdown signal arrives.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use warden_lib::config::EngineConfig;
use warden_lib::driver::{BrowserDriver, CommandDriver, CommandDriverConfig};
use warden_lib::events::TransitionNotifier;
use warden_lib::server::{
    generate_auth_token, run_server, spawn_transition_forwarder, ServerAppState,
};
use warden_lib::session::{
    HeartbeatMonitor, LiveRegistry, RecoveryCoordinator, SessionManager,
};
use warden_lib::shutdown::{register_signal_handlers, ShutdownState};
use warden_lib::store::{FileSessionStore, SessionStore};

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Session persistence and recovery server for remote browser automation jobs"
)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 7710, env = "WARDEN_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1", env = "WARDEN_BIND")]
    bind: String,

    /// Data directory for durable session records
    #[arg(long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to the YAML config file (defaults to <data-dir>/config.yaml)
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Auth token for API access; generated when not provided
    #[arg(long, env = "WARDEN_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Skip the recovery run at startup (diagnostics only)
    #[arg(long)]
    no_recovery: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warden")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {:?}", data_dir))?;

    let config_path = cli.config.unwrap_or_else(|| data_dir.join("config.yaml"));
    let config = EngineConfig::load_or_default(&config_path).map_err(|e| anyhow!(e))?;
    config.validate().map_err(|e| anyhow!("Invalid config: {}", e))?;

    log::info!("Data dir: {:?}", data_dir);

    // Engine components, dependency-injected around one shared registry
    let store: Arc<dyn SessionStore> =
        Arc::new(FileSessionStore::new(&data_dir).map_err(|e| anyhow!(e.to_string()))?);
    let command_driver = Arc::new(CommandDriver::new(CommandDriverConfig {
        program: config.driver_program.clone(),
        base_args: config.driver_args.clone(),
    }));
    let driver: Arc<dyn BrowserDriver> = command_driver.clone();
    let registry = Arc::new(LiveRegistry::new());

    let (transition_tx, transition_rx) = mpsc::unbounded_channel();
    let notifier = TransitionNotifier::new(transition_tx);

    let manager = Arc::new(SessionManager::new(
        store.clone(),
        driver.clone(),
        registry.clone(),
        config.clone(),
        notifier.clone(),
    ));
    let recovery = Arc::new(RecoveryCoordinator::new(
        store.clone(),
        driver.clone(),
        registry.clone(),
        config.clone(),
        notifier.clone(),
    ));
    let monitor = Arc::new(HeartbeatMonitor::new(
        store.clone(),
        driver.clone(),
        registry.clone(),
        config.clone(),
        notifier.clone(),
    ));

    let shutdown_state = ShutdownState::new();
    register_signal_handlers(shutdown_state.clone())?;

    // Reconcile durable records before accepting traffic
    if cli.no_recovery {
        log::warn!("Startup recovery skipped (--no-recovery)");
    } else {
        let report = recovery
            .run()
            .await
            .map_err(|e| anyhow!("Startup recovery failed: {}", e))?;
        log::info!(
            "Startup recovery: {} resumed, {} failed, {} skipped, {} reclaimed",
            report.resumed,
            report.failed,
            report.skipped,
            report.reclaimed
        );
    }

    // Background drivers
    let monitor_task = monitor.spawn(shutdown_state.clone());
    let periodic_task = config
        .recovery_interval()
        .map(|interval| recovery.clone().spawn_periodic(interval, shutdown_state.clone()));

    let auth_token = cli.auth_token.unwrap_or_else(generate_auth_token);
    let state = ServerAppState::new(
        auth_token,
        manager,
        recovery,
        store,
        registry.clone(),
        shutdown_state.clone(),
    );

    spawn_transition_forwarder(transition_rx, state.broadcaster.clone());

    let result = run_server(cli.port, &cli.bind, state).await;

    // Cleanup: release every live handle; durable Active records stay put
    // and the next startup's recovery resumes or fails them
    shutdown_state.request_shutdown();
    let _ = monitor_task.await;
    if let Some(task) = periodic_task {
        let _ = task.await;
    }

    let live = registry.drain();
    if !live.is_empty() {
        log::info!("Releasing {} live session handle(s) on shutdown", live.len());
        for (id, session) in live {
            log::debug!("Releasing handle for session {}", id);
            driver.release(session.handle).await;
        }
    }
    let killed = command_driver.release_all();
    if killed > 0 {
        log::warn!("Killed {} stray runner process(es)", killed);
    }
    shutdown_state.mark_cleanup_complete();

    result.map_err(|e| anyhow!(e))
}
