//! wardend - The appwarden enforcement service
//!
//! This is the main entry point for the enforcement daemon.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization and orphaned-session recovery
//! - Session tracker and monitoring loop
//! - Host adapter (sway probe, desktop-entry labels)
//! - IPC server (status, streak, deactivate, overlay events)

mod surface;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_api::{
    BlockPolicy, ClientInfo, Command, ErrorCode, ErrorInfo, Event, EventPayload, OverlayState,
    Response, ResponsePayload, ServiceStatus, SessionEndReason, API_VERSION,
};
use warden_config::{load_config_or_default, Config};
use warden_core::{
    calculate_streak, CoreEvent, EnsuredSession, Monitor, MonitorCommand, MonitorConfig,
    OverlayController, SessionTracker, StopReason,
};
use warden_host_linux::{DesktopEntryLabels, PidFile, SwayFocusProbe, DAEMON_PROCESS_NAME};
use warden_ipc::{IpcServer, ServerMessage};
use warden_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use warden_util::{default_config_path, ClientId};

use crate::surface::IpcOverlaySurface;

/// wardend - App blocking enforcement service
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(about = "App blocking enforcement service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/appwarden/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set APPWARDEN_SOCKET env var)
    #[arg(short, long, env = "APPWARDEN_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set APPWARDEN_DATA_DIR env var)
    #[arg(short, long, env = "APPWARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    config: Config,
    store: Arc<dyn Store>,
    tracker: Arc<SessionTracker>,
    ipc: Arc<IpcServer>,
    pid_file: PidFile,
}

impl Service {
    /// Prepare the service; `None` means there is nothing to do
    async fn new(args: &Args) -> Result<Option<Self>> {
        let mut config = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        if let Some(socket) = &args.socket {
            config.service.socket_path = socket.clone();
        }
        if let Some(data_dir) = &args.data_dir {
            config.service.data_dir = data_dir.clone();
        }

        info!(
            config_path = %args.config.display(),
            preset_count = config.presets.len(),
            "Configuration loaded"
        );

        // Single instance
        let pid_file = PidFile::new(config.service.pid_path());
        if let Some(pid) = pid_file.read()
            && pid != std::process::id()
            && pid_file.is_alive(DAEMON_PROCESS_NAME)
        {
            info!(pid, "wardend already running");
            return Ok(None);
        }

        let data_dir = &config.service.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = warden_util::db_path(data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let tracker = Arc::new(SessionTracker::new(store.clone()));

        // Recover from a previous process that died mid-session
        let now = warden_util::now();
        if let Some(session) = tracker
            .close_orphaned_sessions(now)
            .context("Failed to recover orphaned sessions")?
        {
            info!(
                session_id = %session.id,
                duration_ms = session.duration_ms,
                "Orphaned session closed at startup"
            );
        }

        let policy = store.load_policy().context("Failed to read block policy")?;
        if !policy.is_enforcing() {
            info!(active = policy.active, "No active block policy, nothing to enforce");
            return Ok(None);
        }

        pid_file
            .write(std::process::id())
            .context("Failed to write pid file")?;

        let mut ipc = IpcServer::new(&config.service.socket_path);
        ipc.start().await?;

        info!(socket_path = %config.service.socket_path.display(), "IPC server started");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        Ok(Some(Self {
            config,
            store,
            tracker,
            ipc: Arc::new(ipc),
            pid_file,
        }))
    }

    async fn run(self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        // Spawn IPC accept task
        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Continue the open session or start one
        let policy = self.store.load_policy()?;
        match self
            .tracker
            .ensure_session(policy.blocked_count(), warden_util::now())?
        {
            EnsuredSession::Started(id) => {
                if let Some(session) = self.tracker.store().get_session(id)? {
                    ipc.broadcast_event(Event::new(EventPayload::SessionStarted {
                        session_id: session.id,
                        blocked_app_count: session.blocked_app_count,
                        started_at: session.start_time,
                    }));
                }
            }
            EnsuredSession::Continued(_) => {}
        }

        // Build the monitoring loop
        let overlay = OverlayController::new(
            Arc::new(IpcOverlaySurface::new(ipc.broadcaster())),
            Arc::new(DesktopEntryLabels::from_xdg()),
        );
        let (core_tx, mut core_events) = mpsc::unbounded_channel();
        let monitor = Monitor::new(
            MonitorConfig::from(&self.config.monitor),
            Arc::new(SwayFocusProbe::new()),
            self.tracker.clone(),
            overlay,
        )
        .with_events(core_tx);
        let overlay_state = monitor.overlay_state();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(16);
        let mut monitor_task: JoinHandle<StopReason> =
            tokio::spawn(monitor.run(shutdown_rx, command_rx));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

        let finished = loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break None;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break None;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break None;
                }

                // Loop ended on its own: policy lifted
                result = &mut monitor_task => {
                    break Some(result);
                }

                Some(event) = core_events.recv() => {
                    Self::handle_core_event(&ipc, event);
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(&ipc, &command_tx, &overlay_state, msg).await;
                }
            }
        };

        let result = match finished {
            Some(result) => result,
            None => {
                let _ = shutdown_tx.send(true);
                monitor_task.await
            }
        };

        match result {
            Ok(reason) => info!(reason = ?reason, "Monitoring loop finished"),
            Err(e) => {
                error!(error = %e, "Monitoring loop panicked");
                if let Err(e) = self
                    .tracker
                    .end_current_session(SessionEndReason::ServiceShutdown, warden_util::now())
                {
                    warn!(error = %e, "Failed to end session after loop failure");
                }
            }
        }

        // Forward whatever the loop emitted while stopping
        while let Ok(event) = core_events.try_recv() {
            Self::handle_core_event(&ipc, event);
        }

        info!("Shutting down wardend");
        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        self.pid_file.remove_if_owned(std::process::id());
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(ipc: &Arc<IpcServer>, event: CoreEvent) {
        match event {
            CoreEvent::SessionStarted {
                session_id,
                blocked_app_count,
                started_at,
            } => {
                ipc.broadcast_event(Event::new(EventPayload::SessionStarted {
                    session_id,
                    blocked_app_count,
                    started_at,
                }));
            }

            CoreEvent::SessionEnded {
                session_id,
                reason,
                duration_ms,
            } => {
                info!(session_id = %session_id, reason = ?reason, duration_ms, "Session ended");
                ipc.broadcast_event(Event::new(EventPayload::SessionEnded {
                    session_id,
                    reason,
                    duration_ms,
                }));
            }

            // The overlay surface already broadcast these
            CoreEvent::OverlayShown { app_id } => {
                debug!(app_id = %app_id, "Overlay shown");
            }
            CoreEvent::OverlayDismissed => {
                debug!("Overlay dismissed");
            }
        }
    }

    async fn handle_ipc_message(
        &self,
        ipc: &Arc<IpcServer>,
        commands: &mpsc::Sender<MonitorCommand>,
        overlay_state: &watch::Receiver<OverlayState>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let response = if request.api_version != API_VERSION {
                    Response::error(
                        request.request_id,
                        ErrorInfo::new(
                            ErrorCode::UnsupportedVersion,
                            format!(
                                "API version {} not supported (expected {})",
                                request.api_version, API_VERSION
                            ),
                        ),
                    )
                } else {
                    let info = ipc.get_client_info(&client_id).await;
                    self.handle_command(
                        ipc,
                        commands,
                        overlay_state,
                        &client_id,
                        info,
                        request.request_id,
                        request.command,
                    )
                    .await
                };

                let _ = ipc.send_response(&client_id, response).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_command(
        &self,
        ipc: &Arc<IpcServer>,
        commands: &mpsc::Sender<MonitorCommand>,
        overlay_state: &watch::Receiver<OverlayState>,
        client_id: &ClientId,
        info: Option<ClientInfo>,
        request_id: u64,
        command: Command,
    ) -> Response {
        let now = warden_util::now();

        match command {
            Command::GetStatus => {
                let status = self.status(overlay_state.borrow().clone());
                Response::success(request_id, ResponsePayload::Status(status))
            }

            Command::GetStreak => {
                match calculate_streak(self.store.as_ref(), now.date_naive(), &self.config.streak) {
                    Ok(days) => Response::success(request_id, ResponsePayload::Streak { days }),
                    Err(e) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::StoreError, e.to_string()),
                    ),
                }
            }

            Command::Deactivate => {
                let allowed = info.is_some_and(|i| i.role.can_deactivate());
                if !allowed {
                    warn!(client_id = %client_id, "Deactivate denied");
                    return Response::error(
                        request_id,
                        ErrorInfo::new(
                            ErrorCode::PermissionDenied,
                            "Only the owner can lift the block policy",
                        ),
                    );
                }

                match self.deactivate(ipc, now) {
                    Ok(ended_session) => {
                        Response::success(request_id, ResponsePayload::Deactivated { ended_session })
                    }
                    Err(e) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::StoreError, e.to_string()),
                    ),
                }
            }

            Command::OverlayClosed => {
                match commands.send(MonitorCommand::OverlayClosed).await {
                    Ok(()) => Response::success(request_id, ResponsePayload::OverlayClosedAck),
                    Err(_) => Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::InternalError, "Monitoring loop has stopped"),
                    ),
                }
            }

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        }
    }

    fn status(&self, overlay: OverlayState) -> ServiceStatus {
        let policy = match self.store.load_policy() {
            Ok(policy) => policy,
            Err(e) => {
                warn!(error = %e, "Failed to read policy for status");
                BlockPolicy::default()
            }
        };

        let active_session = self.tracker.get_active_session().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read active session for status");
            None
        });

        let last_heartbeat = self
            .store
            .load_pointer()
            .ok()
            .and_then(|pointer| pointer.last_heartbeat);

        ServiceStatus {
            api_version: API_VERSION,
            policy,
            active_session,
            overlay,
            last_heartbeat,
            store_ok: self.store.is_healthy(),
        }
    }

    /// Lift the policy and close the open session; the loop stops on its next tick
    fn deactivate(
        &self,
        ipc: &Arc<IpcServer>,
        now: chrono::DateTime<chrono::Local>,
    ) -> warden_store::StoreResult<Option<warden_util::SessionId>> {
        let policy = self.store.load_policy()?;
        let lifted = policy.deactivated();
        self.store.save_policy(&lifted)?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::PolicyChanged {
                active: false,
                blocked_app_count: lifted.blocked_count(),
            }));
        info!("Block policy lifted");

        let ended = self
            .tracker
            .end_current_session(SessionEndReason::Unblocked, now)?;

        Ok(ended.map(|session| {
            ipc.broadcast_event(Event::new(EventPayload::SessionEnded {
                session_id: session.id,
                reason: SessionEndReason::Unblocked,
                duration_ms: session.duration_ms,
            }));
            session.id
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");
    if warden_util::is_mock_time_active() {
        warn!(now = %warden_util::now(), "Mock time is active");
    }

    match Service::new(&args).await? {
        Some(service) => service.run().await,
        None => Ok(()),
    }
}
