//! Watchdog that keeps the enforcement process alive

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use warden_config::WatchdogSettings;
use warden_host_api::{HostError, ProcessSupervisor};
use warden_store::{AuditEvent, AuditEventType, Store, StoreError};

/// What woke the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogTrigger {
    Periodic,
    Boot,
    PackageReplaced,
}

impl fmt::Display for WatchdogTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchdogTrigger::Periodic => write!(f, "periodic"),
            WatchdogTrigger::Boot => write!(f, "boot"),
            WatchdogTrigger::PackageReplaced => write!(f, "package_replaced"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// Nothing to enforce
    PolicyInactive,
    AlreadyRunning,
    Relaunched { pid: u32 },
}

/// Failed check. Every variant is retryable; none is fatal.
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("Relaunch failed: {0}")]
    Relaunch(#[from] HostError),

    #[error("Policy unreadable: {0}")]
    Store(#[from] StoreError),
}

/// Periodic liveness check for the enforcement process.
///
/// Shares nothing with the monitoring loop except the persisted policy.
pub struct WatchdogSupervisor {
    store: Arc<dyn Store>,
    supervisor: Arc<dyn ProcessSupervisor>,
    settings: WatchdogSettings,
}

impl WatchdogSupervisor {
    pub fn new(
        store: Arc<dyn Store>,
        supervisor: Arc<dyn ProcessSupervisor>,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            store,
            supervisor,
            settings,
        }
    }

    /// Relaunch the enforcement process if the policy wants it and it is gone
    pub fn check(&self, trigger: WatchdogTrigger) -> Result<WatchdogOutcome, WatchdogError> {
        let policy = self.store.load_policy()?;
        if !policy.is_enforcing() {
            debug!(trigger = %trigger, "Policy inactive, nothing to supervise");
            return Ok(WatchdogOutcome::PolicyInactive);
        }

        if self.supervisor.is_running() {
            debug!(trigger = %trigger, "Enforcement process alive");
            return Ok(WatchdogOutcome::AlreadyRunning);
        }

        let pid = self.supervisor.launch()?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::WatchdogRestarted {
                pid,
                trigger: trigger.to_string(),
            }));
        info!(trigger = %trigger, pid, "Enforcement process relaunched");

        Ok(WatchdogOutcome::Relaunched { pid })
    }

    /// Delay before retry number `attempt` (1-based): linear steps of
    /// `retry_base`, never longer than the regular interval
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let delay = self.settings.retry_base.saturating_mul(attempt.max(1));
        delay.min(self.settings.interval)
    }

    /// Check every interval until `shutdown` flips to true.
    ///
    /// The first check runs immediately with `first_trigger`.
    pub async fn run_periodic(
        &self,
        first_trigger: WatchdogTrigger,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut trigger = first_trigger;
        let mut attempt: u32 = 0;

        loop {
            let delay = match self.check(trigger) {
                Ok(outcome) => {
                    attempt = 0;
                    debug!(outcome = ?outcome, "Watchdog check done");
                    self.settings.interval
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.retry_delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        "Watchdog check failed, will retry"
                    );
                    delay
                }
            };
            trigger = WatchdogTrigger::Periodic;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Watchdog stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_api::BlockPolicy;
    use warden_host_api::MockSupervisor;
    use warden_store::SqliteStore;

    fn watchdog(policy: BlockPolicy) -> (WatchdogSupervisor, Arc<MockSupervisor>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        store.save_policy(&policy).unwrap();
        let supervisor = Arc::new(MockSupervisor::new());

        let watchdog = WatchdogSupervisor::new(
            store.clone(),
            supervisor.clone(),
            WatchdogSettings {
                interval: Duration::from_secs(900),
                retry_base: Duration::from_secs(30),
            },
        );
        (watchdog, supervisor, store)
    }

    #[test]
    fn inactive_policy_is_success_without_launch() {
        let (watchdog, supervisor, _) = watchdog(BlockPolicy::blocking(["steam"]).deactivated());

        let outcome = watchdog.check(WatchdogTrigger::Boot).unwrap();
        assert_eq!(outcome, WatchdogOutcome::PolicyInactive);
        assert_eq!(supervisor.launch_count(), 0);
    }

    #[test]
    fn empty_policy_is_success_without_launch() {
        let (watchdog, supervisor, _) = watchdog(BlockPolicy {
            active: true,
            blocked_apps: Default::default(),
        });

        assert_eq!(
            watchdog.check(WatchdogTrigger::Periodic).unwrap(),
            WatchdogOutcome::PolicyInactive
        );
        assert_eq!(supervisor.launch_count(), 0);
    }

    #[test]
    fn relaunches_dead_process() {
        let (watchdog, supervisor, store) = watchdog(BlockPolicy::blocking(["steam"]));

        let outcome = watchdog.check(WatchdogTrigger::PackageReplaced).unwrap();
        assert!(matches!(outcome, WatchdogOutcome::Relaunched { .. }));
        assert_eq!(supervisor.launch_count(), 1);

        let audits = store.get_recent_audits(5).unwrap();
        assert!(matches!(
            &audits[0].event,
            AuditEventType::WatchdogRestarted { trigger, .. } if trigger == "package_replaced"
        ));

        assert_eq!(
            watchdog.check(WatchdogTrigger::Periodic).unwrap(),
            WatchdogOutcome::AlreadyRunning
        );
        assert_eq!(supervisor.launch_count(), 1);
    }

    #[test]
    fn launch_failure_is_retryable_error() {
        let (watchdog, supervisor, _) = watchdog(BlockPolicy::blocking(["steam"]));
        *supervisor.fail_launch.lock().unwrap() = true;

        let result = watchdog.check(WatchdogTrigger::Periodic);
        assert!(matches!(result, Err(WatchdogError::Relaunch(_))));
    }

    #[test]
    fn retry_delay_steps_and_caps() {
        let (watchdog, _, _) = watchdog(BlockPolicy::default());

        assert_eq!(watchdog.retry_delay(1), Duration::from_secs(30));
        assert_eq!(watchdog.retry_delay(3), Duration::from_secs(90));
        assert_eq!(watchdog.retry_delay(1000), Duration::from_secs(900));
    }

    #[tokio::test]
    async fn run_periodic_checks_immediately_and_stops() {
        let (watchdog, supervisor, _) = watchdog(BlockPolicy::blocking(["steam"]));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let run = watchdog.run_periodic(WatchdogTrigger::Boot, shutdown_rx);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_tx.send(true).unwrap();
        };

        tokio::time::timeout(Duration::from_secs(2), async { tokio::join!(run, stop) })
            .await
            .unwrap();
        assert_eq!(supervisor.launch_count(), 1);
    }
}
