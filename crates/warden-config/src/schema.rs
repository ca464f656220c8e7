//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Socket, data directory and daemon binary
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Monitoring loop timing
    #[serde(default)]
    pub monitor: RawMonitorConfig,

    /// Streak computation
    #[serde(default)]
    pub streak: RawStreakConfig,

    /// Watchdog cadence
    #[serde(default)]
    pub watchdog: RawWatchdogConfig,

    /// Named sets of apps to block
    #[serde(default)]
    pub presets: Vec<RawPreset>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/appwarden/wardend.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Daemon binary launched by the watchdog
    pub daemon_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMonitorConfig {
    pub tick_interval_ms: Option<u64>,

    /// How far back each tick looks for a foreground transition
    pub lookback_ms: Option<u64>,

    /// Minimum gap before re-showing the overlay for the same app
    pub block_cooldown_ms: Option<u64>,

    /// The enforcement app's own id; never intercepted
    pub enforcement_app_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStreakConfig {
    /// Minimum closed-session time for a day to count
    pub daily_threshold_ms: Option<u64>,

    /// Upper bound on the backward walk
    pub max_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWatchdogConfig {
    pub interval_secs: Option<u64>,

    /// Retry delay step after a failed relaunch
    pub retry_base_secs: Option<u64>,
}

/// Named app set
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPreset {
    pub name: String,
    pub apps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/warden-test.sock"

            [monitor]
            tick_interval_ms = 250
            enforcement_app_id = "dev.appwarden"

            [watchdog]
            interval_secs = 600

            [[presets]]
            name = "work"
            apps = ["steam"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.monitor.tick_interval_ms, Some(250));
        assert_eq!(config.monitor.lookback_ms, None);
        assert_eq!(
            config.monitor.enforcement_app_id.as_deref(),
            Some("dev.appwarden")
        );
        assert_eq!(config.watchdog.interval_secs, Some(600));
        assert_eq!(config.presets.len(), 1);
        assert_eq!(config.presets[0].apps, vec!["steam".to_string()]);
    }
}
