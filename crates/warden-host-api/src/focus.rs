//! Foreground transition history

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use warden_util::AppId;

const DEFAULT_CAPACITY: usize = 64;

/// Bounded record of foreground transitions, oldest first.
///
/// Probes that observe the current focus by polling feed every observation
/// into [`FocusHistory::observe`]; only changes are kept, so a query over a
/// short window answers "which app came to the foreground lately" rather
/// than "which app is focused".
#[derive(Debug, Clone)]
pub struct FocusHistory {
    transitions: VecDeque<(DateTime<Local>, AppId)>,
    capacity: usize,
}

impl FocusHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record the currently focused app. Returns true if this is a transition.
    pub fn observe(&mut self, app_id: AppId, at: DateTime<Local>) -> bool {
        if self.current() == Some(&app_id) {
            return false;
        }
        self.record(app_id, at);
        true
    }

    /// Record a transition unconditionally
    pub fn record(&mut self, app_id: AppId, at: DateTime<Local>) {
        if self.transitions.len() == self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back((at, app_id));
    }

    /// The app of the most recent transition
    pub fn current(&self) -> Option<&AppId> {
        self.transitions.back().map(|(_, app)| app)
    }

    /// The latest transition with a timestamp in `[since, until]`
    pub fn latest_between(&self, since: DateTime<Local>, until: DateTime<Local>) -> Option<AppId> {
        self.transitions
            .iter()
            .rev()
            .find(|(at, _)| *at >= since && *at <= until)
            .map(|(_, app)| app.clone())
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

impl Default for FocusHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn observe_keeps_only_changes() {
        let mut history = FocusHistory::new();
        let t = base();

        assert!(history.observe(AppId::new("foot"), t));
        assert!(!history.observe(AppId::new("foot"), t + Duration::milliseconds(200)));
        assert!(history.observe(AppId::new("steam"), t + Duration::milliseconds(400)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn latest_between_picks_newest_in_window() {
        let mut history = FocusHistory::new();
        let t = base();
        history.record(AppId::new("foot"), t);
        history.record(AppId::new("steam"), t + Duration::milliseconds(300));
        history.record(AppId::new("firefox"), t + Duration::milliseconds(2500));

        let found = history.latest_between(t, t + Duration::milliseconds(1000));
        assert_eq!(found, Some(AppId::new("steam")));

        let found = history.latest_between(
            t + Duration::milliseconds(1000),
            t + Duration::milliseconds(2000),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut history = FocusHistory::with_capacity(2);
        let t = base();
        history.record(AppId::new("a"), t);
        history.record(AppId::new("b"), t + Duration::seconds(1));
        history.record(AppId::new("c"), t + Duration::seconds(2));

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest_between(t, t), None);
        assert_eq!(history.current(), Some(&AppId::new("c")));
    }
}
