//! warden-watchdog - keeps wardend alive while a block policy is active
//!
//! Run once from boot or package-upgrade hooks (`--once --trigger boot`),
//! or as a long-lived process that checks every configured interval.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_config::load_config_or_default;
use warden_core::{WatchdogSupervisor, WatchdogTrigger};
use warden_host_linux::{DaemonSupervisor, PidFile};
use warden_store::{SqliteStore, Store};
use warden_util::default_config_path;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Trigger {
    Periodic,
    Boot,
    PackageReplaced,
}

impl From<Trigger> for WatchdogTrigger {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Periodic => WatchdogTrigger::Periodic,
            Trigger::Boot => WatchdogTrigger::Boot,
            Trigger::PackageReplaced => WatchdogTrigger::PackageReplaced,
        }
    }
}

/// warden-watchdog - Relaunches wardend when it should be running
#[derive(Parser, Debug)]
#[command(name = "warden-watchdog")]
#[command(about = "Relaunches wardend when a block policy is active", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set APPWARDEN_SOCKET env var)
    #[arg(short, long, env = "APPWARDEN_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set APPWARDEN_DATA_DIR env var)
    #[arg(short, long, env = "APPWARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// What woke the watchdog
    #[arg(short, long, value_enum, default_value = "periodic")]
    trigger: Trigger,

    /// Check once and exit instead of looping
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mut config = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(socket) = &args.socket {
        config.service.socket_path = socket.clone();
    }
    if let Some(data_dir) = &args.data_dir {
        config.service.data_dir = data_dir.clone();
    }

    let db_path = warden_util::db_path(&config.service.data_dir);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );

    let daemon_path = match &config.service.daemon_path {
        Some(path) => path.clone(),
        None => DaemonSupervisor::sibling_daemon_path()
            .context("Failed to locate the wardend binary")?,
    };

    // The relaunched daemon must agree with us on every path
    let daemon_args = vec![
        "--config".to_string(),
        args.config.display().to_string(),
        "--socket".to_string(),
        config.service.socket_path.display().to_string(),
        "--data-dir".to_string(),
        config.service.data_dir.display().to_string(),
    ];
    let supervisor = DaemonSupervisor::new(daemon_path, PidFile::new(config.service.pid_path()))
        .with_args(daemon_args);

    let watchdog = WatchdogSupervisor::new(store, Arc::new(supervisor), config.watchdog);
    let trigger = WatchdogTrigger::from(args.trigger);

    if args.once {
        let outcome = watchdog.check(trigger)?;
        info!(trigger = %trigger, outcome = ?outcome, "Watchdog check complete");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!(
        interval_secs = config.watchdog.interval.as_secs(),
        "Watchdog running"
    );
    watchdog.run_periodic(trigger, shutdown_rx).await;

    Ok(())
}
