//! Fixed-cadence monitoring loop

use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use warden_api::{OverlayState, SessionEndReason};
use warden_config::MonitorSettings;
use warden_host_api::ForegroundProbe;
use warden_store::{AuditEvent, AuditEventType};
use warden_util::AppId;

use crate::{CoreEvent, EnsuredSession, OverlayController, SessionTracker};

/// Monitoring loop timing
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    pub lookback: Duration,
    pub block_cooldown: Duration,
    /// Never intercepted, even if listed in the policy
    pub enforcement_app_id: AppId,
}

impl From<&MonitorSettings> for MonitorConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval,
            lookback: settings.lookback,
            block_cooldown: settings.block_cooldown,
            enforcement_app_id: settings.enforcement_app_id.clone(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

/// What a single tick decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Policy no longer enforcing; the loop must stop
    Stop,
    /// Blocked app detected and the overlay was told to show
    Intercepted(AppId),
    /// Blocked app detected again within the cooldown
    Suppressed(AppId),
    /// A non-blocked app came forward; overlay dismissed, debounce cleared
    Dismissed,
    /// No foreground transition in the look-back window
    Idle,
    /// The probe failed; treated as no transition
    ProbeFailed,
    /// The policy could not be read; tick skipped
    PolicyUnreadable,
}

/// Messages delivered to a running loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// The user left the overlay from the overlay itself
    OverlayClosed,
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PolicyInactive,
    Shutdown,
}

impl StopReason {
    pub fn session_end_reason(&self) -> SessionEndReason {
        match self {
            StopReason::PolicyInactive => SessionEndReason::PolicyInactive,
            StopReason::Shutdown => SessionEndReason::ServiceShutdown,
        }
    }
}

/// Single-owner enforcement state machine.
///
/// Each tick re-reads the persisted policy, stamps a heartbeat, asks the
/// probe for the latest foreground transition and drives the overlay.
pub struct Monitor {
    config: MonitorConfig,
    probe: Arc<dyn ForegroundProbe>,
    tracker: Arc<SessionTracker>,
    overlay: OverlayController,
    /// Last app the overlay was requested for, and when
    last_blocked: Option<(AppId, DateTime<Local>)>,
    state_tx: watch::Sender<OverlayState>,
    events: Option<mpsc::UnboundedSender<CoreEvent>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn ForegroundProbe>,
        tracker: Arc<SessionTracker>,
        overlay: OverlayController,
    ) -> Self {
        let (state_tx, _) = watch::channel(OverlayState::Hidden);

        Self {
            config,
            probe,
            tracker,
            overlay,
            last_blocked: None,
            state_tx,
            events: None,
        }
    }

    /// Forward core events to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Observe the overlay state from outside the loop
    pub fn overlay_state(&self) -> watch::Receiver<OverlayState> {
        self.state_tx.subscribe()
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    /// Run one iteration of the loop
    pub async fn tick(&mut self, now: DateTime<Local>) -> TickOutcome {
        let policy = match self.tracker.store().load_policy() {
            Ok(policy) => policy,
            Err(e) => {
                warn!(error = %e, "Failed to read policy, skipping tick");
                return TickOutcome::PolicyUnreadable;
            }
        };

        if !policy.is_enforcing() {
            debug!(active = policy.active, "Policy not enforcing");
            return TickOutcome::Stop;
        }

        self.ensure_tracking(policy.blocked_count(), now);

        if let Err(e) = self.tracker.record_heartbeat(now) {
            warn!(error = %e, "Failed to record heartbeat");
        }

        let lookback = ChronoDuration::from_std(self.config.lookback)
            .unwrap_or_else(|_| ChronoDuration::seconds(1));
        let app_id = match self
            .probe
            .most_recent_foreground_app(now - lookback, now)
            .await
        {
            Ok(Some(app_id)) => app_id,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => {
                warn!(error = %e, "Foreground probe failed");
                return TickOutcome::ProbeFailed;
            }
        };

        trace!(app_id = %app_id, "Foreground transition");

        let blocked = policy.blocks(&app_id);
        if blocked && app_id != self.config.enforcement_app_id {
            if self.in_cooldown(&app_id, now) {
                debug!(app_id = %app_id, "Blocked app detected but cooldown active");
                return TickOutcome::Suppressed(app_id);
            }

            self.last_blocked = Some((app_id.clone(), now));
            if self.overlay.show(&app_id, now) {
                let _ = self
                    .tracker
                    .store()
                    .append_audit(AuditEvent::new(AuditEventType::OverlayShown {
                        app_id: app_id.clone(),
                    }));
                self.emit(CoreEvent::OverlayShown {
                    app_id: app_id.clone(),
                });
                self.publish_state();
            }
            return TickOutcome::Intercepted(app_id);
        }

        if !blocked {
            if self.overlay.dismiss() {
                self.emit(CoreEvent::OverlayDismissed);
                self.publish_state();
            }
            self.last_blocked = None;
            return TickOutcome::Dismissed;
        }

        TickOutcome::Idle
    }

    /// An enforcing policy always has an open session, even when it was
    /// re-activated after the running session was closed
    fn ensure_tracking(&self, blocked_app_count: u32, now: DateTime<Local>) {
        match self.tracker.store().load_pointer() {
            Ok(pointer) if pointer.current_session_id.is_some() => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read session pointer");
                return;
            }
        }

        match self.tracker.ensure_session(blocked_app_count, now) {
            Ok(EnsuredSession::Started(session_id)) => self.emit(CoreEvent::SessionStarted {
                session_id,
                blocked_app_count,
                started_at: now,
            }),
            Ok(EnsuredSession::Continued(_)) => {}
            Err(e) => warn!(error = %e, "Failed to start session"),
        }
    }

    fn in_cooldown(&self, app_id: &AppId, now: DateTime<Local>) -> bool {
        match &self.last_blocked {
            Some((last_app, at)) if last_app == app_id => {
                warden_util::millis_between(at, &now) <= self.config.block_cooldown.as_millis() as u64
            }
            _ => false,
        }
    }

    pub fn handle_command(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::OverlayClosed => {
                self.overlay.mark_closed();
                self.publish_state();
            }
        }
    }

    /// Tear down after the loop ends: remove the overlay and close the session
    pub fn finish(&mut self, reason: StopReason, now: DateTime<Local>) {
        if self.overlay.dismiss() {
            self.emit(CoreEvent::OverlayDismissed);
        }
        self.publish_state();
        self.last_blocked = None;

        match self
            .tracker
            .end_current_session(reason.session_end_reason(), now)
        {
            Ok(Some(session)) => self.emit(CoreEvent::SessionEnded {
                session_id: session.id,
                reason: reason.session_end_reason(),
                duration_ms: session.duration_ms,
            }),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to end session on stop"),
        }
    }

    /// Tick until the policy stops enforcing or `shutdown` flips to true
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        mut commands: mpsc::Receiver<MonitorCommand>,
    ) -> StopReason {
        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            cooldown_ms = self.config.block_cooldown.as_millis() as u64,
            "Monitoring loop started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reason = loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.tick(warden_util::now()).await == TickOutcome::Stop {
                        break StopReason::PolicyInactive;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break StopReason::Shutdown;
                    }
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command);
                }
            }
        };

        self.finish(reason, warden_util::now());
        info!(reason = ?reason, "Monitoring loop stopped");
        reason
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.overlay.state().clone());
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
