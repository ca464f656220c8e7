//! wardenctl - control and inspect appwarden
//!
//! Writes the block policy, starts the daemon, and reports status, streaks
//! and focus history. Talks to wardend over IPC when it is running and
//! falls back to the store when it is not.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use warden_api::{
    BlockPolicy, Command, ResponsePayload, ResponseResult, ServiceStatus, UsageSession,
};
use warden_config::{load_config, load_config_or_default, Config, ConfigError};
use warden_core::{calculate_streak, SessionTracker};
use warden_host_api::ProcessSupervisor;
use warden_host_linux::{DaemonSupervisor, PidFile};
use warden_ipc::IpcClient;
use warden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use warden_util::{
    default_config_path, format_datetime_full, format_duration, format_elapsed, AppId,
};

/// wardenctl - Control the appwarden block policy
#[derive(Parser, Debug)]
#[command(name = "wardenctl")]
#[command(about = "Control the appwarden block policy", long_about = None)]
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

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: CtlCommand,
}

#[derive(Subcommand, Debug)]
enum CtlCommand {
    /// Start blocking apps and make sure wardend is running
    Block {
        /// App ids to block
        #[arg(required_unless_present = "preset", conflicts_with = "preset")]
        apps: Vec<String>,

        /// Block the apps of a named preset from the config file
        #[arg(long)]
        preset: Option<String>,
    },

    /// Lift the block policy and close the current session
    Unblock,

    /// Show policy, session and overlay state
    Status,

    /// Show the current consecutive-day streak
    Streak,

    /// List recent sessions
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Only sessions started in the last N days, oldest first
        #[arg(long)]
        days: Option<u32>,
    },

    /// Total blocked time over the last days
    FocusTime {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Delete all closed sessions
    ClearHistory,

    /// Print daemon events as they happen
    Watch,

    /// Validate the configuration file
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Args {
        config: config_path,
        socket,
        data_dir,
        command,
        ..
    } = args;

    if let CtlCommand::CheckConfig = command {
        return check_config(&config_path);
    }

    let mut config = load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if let Some(socket) = socket {
        config.service.socket_path = socket;
    }
    if let Some(data_dir) = data_dir {
        config.service.data_dir = data_dir;
    }

    run(&config_path, &config, command).await
}

async fn run(config_path: &std::path::Path, config: &Config, command: CtlCommand) -> Result<()> {
    match command {
        CtlCommand::Block { apps, preset } => block(config_path, config, apps, preset),
        CtlCommand::Unblock => unblock(config).await,
        CtlCommand::Status => status(config).await,
        CtlCommand::Streak => streak(config).await,
        CtlCommand::History { limit, days } => history(config, limit, days),
        CtlCommand::FocusTime { days } => focus_time(config, days),
        CtlCommand::ClearHistory => clear_history(config),
        CtlCommand::Watch => watch(config).await,
        CtlCommand::CheckConfig => check_config(config_path),
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let db_path = warden_util::db_path(&config.service.data_dir);
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    Ok(Arc::new(store))
}

/// Connected client, or None when the daemon is not listening
async fn connect(config: &Config) -> Option<IpcClient> {
    IpcClient::connect(&config.service.socket_path).await.ok()
}

async fn request(client: &mut IpcClient, command: Command) -> Result<ResponsePayload> {
    let response = client.send(command).await?;
    match response.result {
        ResponseResult::Ok(payload) => Ok(payload),
        ResponseResult::Err(e) => bail!("wardend refused ({:?}): {}", e.code, e.message),
    }
}

fn supervisor(config_path: &std::path::Path, config: &Config) -> Result<DaemonSupervisor> {
    let daemon_path = match &config.service.daemon_path {
        Some(path) => path.clone(),
        None => DaemonSupervisor::sibling_daemon_path()
            .context("Failed to locate the wardend binary")?,
    };

    let daemon_args = vec![
        "--config".to_string(),
        config_path.display().to_string(),
        "--socket".to_string(),
        config.service.socket_path.display().to_string(),
        "--data-dir".to_string(),
        config.service.data_dir.display().to_string(),
    ];

    Ok(
        DaemonSupervisor::new(daemon_path, PidFile::new(config.service.pid_path()))
            .with_args(daemon_args),
    )
}

fn block(
    config_path: &std::path::Path,
    config: &Config,
    apps: Vec<String>,
    preset: Option<String>,
) -> Result<()> {
    let apps: Vec<AppId> = match preset {
        Some(name) => match config.preset(&name) {
            Some(preset) => preset.apps.iter().cloned().collect(),
            None => bail!("No preset named '{}' in the configuration", name),
        },
        None => apps
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(AppId::new)
            .collect(),
    };

    let policy = BlockPolicy::blocking(apps);
    if !policy.is_enforcing() {
        bail!("Nothing to block");
    }

    let store = open_store(config)?;
    store.save_policy(&policy)?;
    let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyChanged {
        active: true,
        blocked_app_count: policy.blocked_count(),
    }));

    println!("Blocking {} app(s):", policy.blocked_count());
    for app in &policy.blocked_apps {
        println!("  {}", app);
    }

    let supervisor = supervisor(config_path, config)?;
    if supervisor.is_running() {
        println!("wardend is running and will pick up the new policy");
    } else {
        let pid = supervisor.launch()?;
        println!("Started wardend (pid {})", pid);
    }

    Ok(())
}

async fn unblock(config: &Config) -> Result<()> {
    if let Some(mut client) = connect(config).await {
        match request(&mut client, Command::Deactivate).await? {
            ResponsePayload::Deactivated { ended_session } => {
                match ended_session {
                    Some(id) => println!("Unblocked; session {} closed", id),
                    None => println!("Unblocked"),
                }
                return Ok(());
            }
            other => bail!("Unexpected response: {:?}", other),
        }
    }

    // No daemon: lift the policy ourselves and close what it left open
    let store = open_store(config)?;
    let policy = store.load_policy()?;
    store.save_policy(&policy.deactivated())?;
    let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyChanged {
        active: false,
        blocked_app_count: policy.blocked_count(),
    }));

    let tracker = SessionTracker::new(store);
    match tracker.close_orphaned_sessions(warden_util::now())? {
        Some(session) => println!(
            "Unblocked; session {} closed after {}",
            session.id,
            format_duration(session.duration())
        ),
        None => println!("Unblocked"),
    }

    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    if let Some(mut client) = connect(config).await {
        match request(&mut client, Command::GetStatus).await? {
            ResponsePayload::Status(status) => {
                print_status(&status, true);
                return Ok(());
            }
            other => bail!("Unexpected response: {:?}", other),
        }
    }

    let store = open_store(config)?;
    let pointer = store.load_pointer()?;
    let status = ServiceStatus {
        api_version: warden_api::API_VERSION,
        policy: store.load_policy()?,
        active_session: store.get_open_session()?,
        overlay: Default::default(),
        last_heartbeat: pointer.last_heartbeat,
        store_ok: store.is_healthy(),
    };
    print_status(&status, false);
    Ok(())
}

fn print_status(status: &ServiceStatus, daemon_running: bool) {
    println!(
        "wardend:   {}",
        if daemon_running { "running" } else { "not running" }
    );
    println!(
        "Policy:    {} ({} app(s))",
        if status.policy.active { "active" } else { "inactive" },
        status.policy.blocked_count()
    );
    for app in &status.policy.blocked_apps {
        println!("  {}", app);
    }

    match &status.active_session {
        Some(session) => {
            let elapsed = warden_util::millis_between(&session.start_time, &warden_util::now());
            println!(
                "Session:   {} since {} ({})",
                session.id,
                format_datetime_full(&session.start_time),
                format_elapsed(Duration::from_millis(elapsed))
            );
        }
        None => println!("Session:   none"),
    }

    if let Some(app_id) = status.overlay.app_id() {
        println!("Overlay:   shown for {}", app_id);
    }
    if let Some(heartbeat) = &status.last_heartbeat {
        println!("Heartbeat: {}", format_datetime_full(heartbeat));
    }
    if !status.store_ok {
        println!("Store:     UNHEALTHY");
    }
}

async fn streak(config: &Config) -> Result<()> {
    let days = match connect(config).await {
        Some(mut client) => match request(&mut client, Command::GetStreak).await? {
            ResponsePayload::Streak { days } => days,
            other => bail!("Unexpected response: {:?}", other),
        },
        None => {
            let store = open_store(config)?;
            calculate_streak(
                store.as_ref(),
                warden_util::now().date_naive(),
                &config.streak,
            )?
        }
    };

    println!("{} day(s)", days);
    Ok(())
}

fn history(config: &Config, limit: usize, days: Option<u32>) -> Result<()> {
    let store = open_store(config)?;
    let sessions = match days {
        Some(days) => {
            let now = warden_util::now();
            let mut sessions = store.sessions_in_range(days_back(days), now)?;
            sessions.truncate(limit);
            sessions
        }
        None => store.recent_sessions(limit)?,
    };

    if sessions.is_empty() {
        println!("No sessions recorded");
        return Ok(());
    }

    for session in &sessions {
        println!("{}", format_session(session));
    }
    Ok(())
}

fn format_session(session: &UsageSession) -> String {
    let end = match &session.end_time {
        Some(end) => format_datetime_full(end),
        None => "open".to_string(),
    };
    format!(
        "{:>5}  {}  ->  {:<19}  {:>10}  {} app(s)",
        session.id.get(),
        format_datetime_full(&session.start_time),
        end,
        format_duration(session.duration()),
        session.blocked_app_count
    )
}

fn focus_time(config: &Config, days: u32) -> Result<()> {
    let store = open_store(config)?;
    let total_ms = store.total_duration_since(days_back(days))?;

    println!(
        "{} over the last {} day(s)",
        format_duration(Duration::from_millis(total_ms)),
        days
    );
    Ok(())
}

/// Local midnight starting the window of the last `days` days, today included
fn days_back(days: u32) -> chrono::DateTime<chrono::Local> {
    let today = warden_util::now().date_naive();
    let first_day = today - chrono::Days::new(u64::from(days.saturating_sub(1)));
    warden_util::start_of_day(first_day)
}

fn clear_history(config: &Config) -> Result<()> {
    let store = open_store(config)?;

    if let Some(open) = store.get_open_session()? {
        bail!(
            "Session {} is still open; unblock before clearing history",
            open.id
        );
    }

    let removed = store.clear_sessions()?;
    let _ = store.append_audit(AuditEvent::new(AuditEventType::HistoryCleared { removed }));
    println!("Removed {} session(s)", removed);
    Ok(())
}

async fn watch(config: &Config) -> Result<()> {
    let client = IpcClient::connect(&config.service.socket_path)
        .await
        .context("wardend is not running")?;
    let mut events = client.subscribe().await?;

    loop {
        match events.next().await {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(warden_ipc::IpcError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn check_config(path: &std::path::Path) -> Result<()> {
    match load_config(path) {
        Ok(config) => {
            println!("{}: OK", path.display());
            println!("  tick interval: {:?}", config.monitor.tick_interval);
            println!("  cooldown:      {:?}", config.monitor.block_cooldown);
            println!("  presets:       {}", config.presets.len());
            Ok(())
        }
        Err(ConfigError::ValidationFailed { errors }) => {
            eprintln!("{}: invalid", path.display());
            for error in &errors {
                eprintln!("  - {}", error);
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use warden_util::SessionId;

    #[test]
    fn parses_block_with_apps() {
        let args = Args::try_parse_from(["wardenctl", "block", "steam", "org.telegram.desktop"])
            .unwrap();
        match args.command {
            CtlCommand::Block { apps, preset } => {
                assert_eq!(apps, vec!["steam", "org.telegram.desktop"]);
                assert!(preset.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn block_needs_apps_or_preset() {
        assert!(Args::try_parse_from(["wardenctl", "block"]).is_err());
        assert!(Args::try_parse_from(["wardenctl", "block", "--preset", "work"]).is_ok());
        assert!(Args::try_parse_from(["wardenctl", "block", "steam", "--preset", "work"]).is_err());
    }

    #[test]
    fn open_session_is_listed_as_open() {
        let session = UsageSession {
            id: SessionId::new(7),
            start_time: Local.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            end_time: None,
            duration_ms: 0,
            blocked_app_count: 2,
        };
        let line = format_session(&session);
        assert!(line.contains("2026-03-01 09:00:00"));
        assert!(line.contains("open"));
        assert!(line.contains("2 app(s)"));
    }
}
