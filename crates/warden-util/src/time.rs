//! Time utilities for appwarden
//!
//! All persisted timestamps are epoch milliseconds; in memory they are
//! `DateTime<Local>` truncated to millisecond precision so that a value
//! survives a store round-trip unchanged.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `APPWARDEN_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising day rollover and streak computation by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! APPWARDEN_MOCK_TIME="2025-12-25 23:59:00" wardend
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "APPWARDEN_MOCK_TIME";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<ChronoDuration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<ChronoDuration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                return parse_mock_offset(&mock_time_str, chrono::Local::now());
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

#[cfg_attr(not(debug_assertions), allow(dead_code))]
fn parse_mock_offset(mock_time_str: &str, real_now: DateTime<Local>) -> Option<ChronoDuration> {
    let Ok(naive_dt) = NaiveDateTime::parse_from_str(mock_time_str, "%Y-%m-%d %H:%M:%S") else {
        tracing::warn!(
            mock_time = %mock_time_str,
            expected_format = "%Y-%m-%d %H:%M:%S",
            "Invalid mock time format"
        );
        return None;
    };

    match Local.from_local_datetime(&naive_dt).single() {
        Some(mock_dt) => {
            let offset = mock_dt.signed_duration_since(real_now);
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        None => {
            tracing::warn!(
                mock_time = %mock_time_str,
                "Failed to convert mock time to local timezone"
            );
            None
        }
    }
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, truncated to milliseconds and respecting
/// mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    let now = match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    };

    truncate_to_millis(now)
}

/// Epoch milliseconds of a timestamp
pub fn to_millis(dt: &DateTime<Local>) -> i64 {
    dt.timestamp_millis()
}

/// Local timestamp from epoch milliseconds
pub fn from_millis(ms: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.with_timezone(&Local))
}

/// Drop sub-millisecond precision
pub fn truncate_to_millis(dt: DateTime<Local>) -> DateTime<Local> {
    from_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// Milliseconds elapsed from `start` to `end`, clamped at zero
pub fn millis_between(start: &DateTime<Local>, end: &DateTime<Local>) -> u64 {
    (to_millis(end) - to_millis(start)).max(0) as u64
}

/// Local midnight at the start of `day`.
///
/// When midnight does not exist locally (a DST gap at 00:00), the first
/// valid instant of the day is used instead.
pub fn start_of_day(day: NaiveDate) -> DateTime<Local> {
    let midnight = day.and_time(chrono::NaiveTime::MIN);

    Local
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            Local
                .from_local_datetime(&(midnight + ChronoDuration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| Local.from_utc_datetime(&midnight))
}

/// Half-open `[start, end)` bounds of a local calendar day
pub fn day_bounds(day: NaiveDate) -> (DateTime<Local>, DateTime<Local>) {
    let start = start_of_day(day);
    let end = match day.succ_opt() {
        Some(next) => start_of_day(next),
        None => start + ChronoDuration::days(1),
    };
    (start, end)
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format an elapsed block time as `HH:MM:SS`
pub fn format_elapsed(d: Duration) -> String {
    let total_secs = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

/// Format a DateTime with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_now_is_millisecond_precise() {
        let t = now();
        assert_eq!(t.nanosecond() % 1_000_000, 0);
        assert!(t.year() >= 2020);
    }

    #[test]
    fn test_millis_round_trip() {
        let dt = Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let back = from_millis(to_millis(&dt)).unwrap();
        assert_eq!(back, dt);
    }

    #[test]
    fn test_millis_between_clamps_negative() {
        let a = Local.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
        let b = a + ChronoDuration::milliseconds(1500);
        assert_eq!(millis_between(&a, &b), 1500);
        assert_eq!(millis_between(&b, &a), 0);
    }

    #[test]
    fn test_day_bounds_cover_whole_day() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let (start, end) = day_bounds(day);

        assert_eq!(start.date_naive(), day);
        assert_eq!(start.hour(), 0);
        assert_eq!(end.date_naive(), day.succ_opt().unwrap());

        let noon = Local.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        assert!(start <= noon && noon < end);
    }

    #[test]
    fn test_consecutive_days_share_boundary() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let (_, end) = day_bounds(day);
        let (next_start, _) = day_bounds(day.succ_opt().unwrap());
        assert_eq!(end, next_start);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03");
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:45");
    }

    #[test]
    fn test_parse_mock_offset() {
        let real_now = Local.with_ymd_and_hms(2025, 12, 25, 12, 0, 0).unwrap();

        let offset = parse_mock_offset("2025-12-25 14:30:00", real_now).unwrap();
        assert_eq!(offset, ChronoDuration::minutes(150));

        assert!(parse_mock_offset("2025-12-25T14:30:00", real_now).is_none());
        assert!(parse_mock_offset("not a date", real_now).is_none());
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "APPWARDEN_MOCK_TIME");
    }

    #[test]
    fn test_is_mock_time_active_without_env() {
        // The test environment does not set APPWARDEN_MOCK_TIME
        if std::env::var(MOCK_TIME_ENV_VAR).is_err() {
            assert!(!is_mock_time_active());
        }
    }
}
