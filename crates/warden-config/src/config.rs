//! Validated configuration structures

use crate::schema::{
    RawConfig, RawMonitorConfig, RawPreset, RawServiceConfig, RawStreakConfig, RawWatchdogConfig,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use warden_util::AppId;

const PID_FILENAME: &str = "wardend.pid";

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 200;
pub const DEFAULT_LOOKBACK_MS: u64 = 1000;
pub const DEFAULT_BLOCK_COOLDOWN_MS: u64 = 2000;
pub const DEFAULT_ENFORCEMENT_APP_ID: &str = "appwarden";
/// Two hours of blocking per day
pub const DEFAULT_DAILY_THRESHOLD_MS: u64 = 7_200_000;
pub const DEFAULT_MAX_STREAK_DAYS: u32 = 365;
pub const MAX_STREAK_DAYS_LIMIT: u32 = 3650;
pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 15 * 60;
pub const DEFAULT_WATCHDOG_RETRY_BASE_SECS: u64 = 30;

/// Validated configuration ready for use by the daemon and tools
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub service: ServiceConfig,
    pub monitor: MonitorSettings,
    pub streak: StreakSettings,
    pub watchdog: WatchdogSettings,
    pub presets: Vec<Preset>,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            monitor: MonitorSettings::from_raw(raw.monitor),
            streak: StreakSettings::from_raw(raw.streak),
            watchdog: WatchdogSettings::from_raw(raw.watchdog),
            presets: raw.presets.into_iter().map(Preset::from_raw).collect(),
        }
    }

    /// Get preset by name
    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.name == name)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    /// None means the `wardend` binary next to the running executable
    pub daemon_path: Option<PathBuf>,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(warden_util::default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(warden_util::default_data_dir),
            daemon_path: raw.daemon_path,
        }
    }

    /// Pid file of the running daemon, kept next to its socket
    pub fn pid_path(&self) -> PathBuf {
        match self.socket_path.parent() {
            Some(dir) => dir.join(PID_FILENAME),
            None => warden_util::default_pid_path(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Monitoring loop timing
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tick_interval: Duration,
    pub lookback: Duration,
    pub block_cooldown: Duration,
    pub enforcement_app_id: AppId,
}

impl MonitorSettings {
    fn from_raw(raw: RawMonitorConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(
                raw.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
            ),
            lookback: Duration::from_millis(raw.lookback_ms.unwrap_or(DEFAULT_LOOKBACK_MS)),
            block_cooldown: Duration::from_millis(
                raw.block_cooldown_ms.unwrap_or(DEFAULT_BLOCK_COOLDOWN_MS),
            ),
            enforcement_app_id: AppId::new(
                raw.enforcement_app_id
                    .unwrap_or_else(|| DEFAULT_ENFORCEMENT_APP_ID.to_string()),
            ),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_raw(RawMonitorConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakSettings {
    pub daily_threshold_ms: u64,
    pub max_days: u32,
}

impl StreakSettings {
    fn from_raw(raw: RawStreakConfig) -> Self {
        Self {
            daily_threshold_ms: raw.daily_threshold_ms.unwrap_or(DEFAULT_DAILY_THRESHOLD_MS),
            max_days: raw.max_days.unwrap_or(DEFAULT_MAX_STREAK_DAYS),
        }
    }
}

impl Default for StreakSettings {
    fn default() -> Self {
        Self::from_raw(RawStreakConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub retry_base: Duration,
}

impl WatchdogSettings {
    fn from_raw(raw: RawWatchdogConfig) -> Self {
        Self {
            interval: Duration::from_secs(
                raw.interval_secs.unwrap_or(DEFAULT_WATCHDOG_INTERVAL_SECS),
            ),
            retry_base: Duration::from_secs(
                raw.retry_base_secs.unwrap_or(DEFAULT_WATCHDOG_RETRY_BASE_SECS),
            ),
        }
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self::from_raw(RawWatchdogConfig::default())
    }
}

/// Named, non-empty set of apps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub apps: BTreeSet<AppId>,
}

impl Preset {
    fn from_raw(raw: RawPreset) -> Self {
        Self {
            name: raw.name,
            apps: raw.apps.into_iter().map(AppId::new).collect(),
        }
    }
}
