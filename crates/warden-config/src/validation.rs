//! Configuration validation

use crate::config::{
    DEFAULT_BLOCK_COOLDOWN_MS, DEFAULT_LOOKBACK_MS, DEFAULT_TICK_INTERVAL_MS, MAX_STREAK_DAYS_LIMIT,
};
use crate::schema::{RawConfig, RawPreset};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("lookback_ms ({lookback_ms}) must be at least tick_interval_ms ({tick_interval_ms})")]
    LookbackShorterThanTick {
        lookback_ms: u64,
        tick_interval_ms: u64,
    },

    #[error("max_days must be between 1 and {max}, got {value}")]
    MaxDaysOutOfRange { value: u32, max: u32 },

    #[error("Preset '{name}': {message}")]
    PresetError { name: String, message: String },

    #[error("Duplicate preset name: {0}")]
    DuplicatePresetName(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let monitor = &config.monitor;
    let tick = monitor.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS);
    let lookback = monitor.lookback_ms.unwrap_or(DEFAULT_LOOKBACK_MS);
    let cooldown = monitor.block_cooldown_ms.unwrap_or(DEFAULT_BLOCK_COOLDOWN_MS);

    for (field, value) in [
        ("monitor.tick_interval_ms", tick),
        ("monitor.lookback_ms", lookback),
        ("monitor.block_cooldown_ms", cooldown),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    if tick > 0 && lookback < tick {
        errors.push(ValidationError::LookbackShorterThanTick {
            lookback_ms: lookback,
            tick_interval_ms: tick,
        });
    }

    if let Some(app) = &monitor.enforcement_app_id
        && app.trim().is_empty()
    {
        errors.push(ValidationError::GlobalError(
            "monitor.enforcement_app_id cannot be empty".into(),
        ));
    }

    if config.streak.daily_threshold_ms == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "streak.daily_threshold_ms",
        });
    }

    if let Some(days) = config.streak.max_days
        && !(1..=MAX_STREAK_DAYS_LIMIT).contains(&days)
    {
        errors.push(ValidationError::MaxDaysOutOfRange {
            value: days,
            max: MAX_STREAK_DAYS_LIMIT,
        });
    }

    if config.watchdog.interval_secs == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "watchdog.interval_secs",
        });
    }
    if config.watchdog.retry_base_secs == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "watchdog.retry_base_secs",
        });
    }

    // Check for duplicate preset names
    let mut seen_names = HashSet::new();
    for preset in &config.presets {
        if !seen_names.insert(preset.name.as_str()) {
            errors.push(ValidationError::DuplicatePresetName(preset.name.clone()));
        }
    }

    for preset in &config.presets {
        errors.extend(validate_preset(preset));
    }

    errors
}

fn validate_preset(preset: &RawPreset) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if preset.name.trim().is_empty() {
        errors.push(ValidationError::PresetError {
            name: preset.name.clone(),
            message: "name cannot be empty".into(),
        });
    }

    if preset.apps.is_empty() {
        errors.push(ValidationError::PresetError {
            name: preset.name.clone(),
            message: "apps cannot be empty".into(),
        });
    }

    if preset.apps.iter().any(|app| app.trim().is_empty()) {
        errors.push(ValidationError::PresetError {
            name: preset.name.clone(),
            message: "app ids cannot be empty".into(),
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawMonitorConfig, RawStreakConfig};

    fn base_config() -> RawConfig {
        RawConfig {
            config_version: 1,
            service: Default::default(),
            monitor: Default::default(),
            streak: Default::default(),
            watchdog: Default::default(),
            presets: vec![],
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&base_config()).is_empty());
    }

    #[test]
    fn test_lookback_must_cover_tick() {
        let mut config = base_config();
        config.monitor = RawMonitorConfig {
            tick_interval_ms: Some(500),
            lookback_ms: Some(300),
            ..Default::default()
        };

        let errors = validate_config(&config);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::LookbackShorterThanTick { .. }))
        );
    }

    #[test]
    fn test_max_days_range() {
        let mut config = base_config();
        config.streak = RawStreakConfig {
            daily_threshold_ms: Some(0),
            max_days: Some(0),
        };

        let errors = validate_config(&config);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::MaxDaysOutOfRange { value: 0, .. }))
        );
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ZeroValue {
                field: "streak.daily_threshold_ms"
            }
        )));
    }

    #[test]
    fn test_duplicate_preset_detection() {
        let mut config = base_config();
        config.presets = vec![
            RawPreset {
                name: "work".into(),
                apps: vec!["steam".into()],
            },
            RawPreset {
                name: "work".into(),
                apps: vec![],
            },
        ];

        let errors = validate_config(&config);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::DuplicatePresetName(_)))
        );
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::PresetError { .. }))
        );
    }
}
