//! Consecutive-day streak computation

use chrono::NaiveDate;
use tracing::debug;
use warden_config::StreakSettings;
use warden_store::{Store, StoreResult};

/// Count consecutive local days, ending today, whose closed sessions add
/// up to at least `settings.daily_threshold_ms`.
///
/// Only sessions that started within a day count toward it, and open
/// sessions never count. The first day that falls short (including today)
/// ends the walk. At most `settings.max_days` days are examined.
pub fn calculate_streak(
    store: &dyn Store,
    today: NaiveDate,
    settings: &StreakSettings,
) -> StoreResult<u32> {
    let mut streak = 0;
    let mut day = today;

    while streak < settings.max_days {
        let (start, end) = warden_util::day_bounds(day);
        let total_ms = store.total_closed_duration_between(start, end)?;

        if total_ms < settings.daily_threshold_ms {
            debug!(day = %day, total_ms, "Streak ends");
            break;
        }

        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }

    Ok(streak)
}
