//! Integration tests for wardend
//!
//! These tests drive the enforcement pieces together against an on-disk
//! store, the way the daemon, the watchdog and wardenctl share it.

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use warden_api::{BlockPolicy, SessionEndReason};
use warden_config::{StreakSettings, WatchdogSettings};
use warden_core::{
    calculate_streak, CoreEvent, EnsuredSession, Monitor, MonitorConfig, OverlayController,
    SessionTracker, StopReason, WatchdogOutcome, WatchdogSupervisor, WatchdogTrigger,
};
use warden_host_api::{MockForegroundProbe, MockLabels, MockOverlaySurface, MockSupervisor};
use warden_store::{SqliteStore, Store};
use warden_util::AppId;

fn at(day: u32, hour: u32, min: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
}

fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(warden_util::db_path(dir.path())).unwrap())
}

#[tokio::test]
async fn monitor_enforces_until_policy_is_lifted() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    store
        .save_policy(&BlockPolicy::blocking(["com.x", "com.z"]))
        .unwrap();

    let tracker = Arc::new(SessionTracker::new(store.clone()));
    let started = tracker
        .ensure_session(2, warden_util::now())
        .unwrap();
    assert!(matches!(started, EnsuredSession::Started(_)));

    let probe = Arc::new(MockForegroundProbe::new());
    let surface = Arc::new(MockOverlaySurface::new());
    let overlay = OverlayController::new(
        surface.clone(),
        Arc::new(MockLabels::new().with("com.x", "Example X")),
    );
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let monitor = Monitor::new(
        MonitorConfig {
            tick_interval: Duration::from_millis(20),
            ..MonitorConfig::default()
        },
        probe.clone(),
        tracker.clone(),
        overlay,
    )
    .with_events(events_tx);
    let mut overlay_state = monitor.overlay_state();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_command_tx, command_rx) = mpsc::channel(4);
    let handle = tokio::spawn(monitor.run(shutdown_rx, command_rx));

    probe.report("com.x", warden_util::now());
    tokio::time::timeout(Duration::from_secs(2), overlay_state.wait_for(|s| s.is_showing()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        surface.attached(),
        Some((AppId::new("com.x"), "Example X".to_string()))
    );

    // Lifted from outside the loop, as wardenctl does without a daemon
    store
        .save_policy(&BlockPolicy::blocking(["com.x", "com.z"]).deactivated())
        .unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, StopReason::PolicyInactive);
    assert!(surface.attached().is_none());

    let session = store.get_session(started.id()).unwrap().unwrap();
    assert!(!session.is_open());
    assert_eq!(
        session.duration_ms,
        warden_util::millis_between(&session.start_time, &session.end_time.unwrap())
    );
    assert!(store.load_pointer().unwrap().current_session_id.is_none());

    let mut saw_end = false;
    while let Ok(event) = events_rx.try_recv() {
        if let CoreEvent::SessionEnded { reason, .. } = event {
            assert_eq!(reason, SessionEndReason::PolicyInactive);
            saw_end = true;
        }
    }
    assert!(saw_end);
}

#[tokio::test]
async fn shutdown_signal_ends_session() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store.save_policy(&BlockPolicy::blocking(["com.x"])).unwrap();
    let tracker = Arc::new(SessionTracker::new(store.clone()));
    let id = tracker.ensure_session(1, warden_util::now()).unwrap().id();

    let monitor = Monitor::new(
        MonitorConfig::default(),
        Arc::new(MockForegroundProbe::new()),
        tracker.clone(),
        OverlayController::new(
            Arc::new(MockOverlaySurface::new()),
            Arc::new(MockLabels::new()),
        ),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_command_tx, command_rx) = mpsc::channel(4);
    let handle = tokio::spawn(monitor.run(shutdown_rx, command_rx));

    shutdown_tx.send(true).unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(reason, StopReason::Shutdown);
    assert!(!store.get_session(id).unwrap().unwrap().is_open());
}

#[test]
fn restart_with_active_policy_continues_session() {
    let dir = tempfile::tempdir().unwrap();

    let first_id = {
        let store = open_store(&dir);
        store.save_policy(&BlockPolicy::blocking(["steam"])).unwrap();
        let tracker = SessionTracker::new(store);
        let id = tracker.start_session(1, at(2, 9, 0)).unwrap();
        tracker.record_heartbeat(at(2, 9, 30)).unwrap();
        id
        // Process dies here without closing the session
    };

    let store = open_store(&dir);
    let tracker = SessionTracker::new(store.clone());

    assert!(tracker.close_orphaned_sessions(at(2, 10, 0)).unwrap().is_none());
    assert_eq!(
        tracker.ensure_session(1, at(2, 10, 0)).unwrap(),
        EnsuredSession::Continued(first_id)
    );
    assert_eq!(store.load_pointer().unwrap().current_session_id, Some(first_id));
}

#[test]
fn orphan_closed_at_last_heartbeat_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let store = open_store(&dir);
        store.save_policy(&BlockPolicy::blocking(["steam"])).unwrap();
        let tracker = SessionTracker::new(store.clone());
        let id = tracker.start_session(1, at(2, 9, 0)).unwrap();
        tracker.record_heartbeat(at(2, 9, 45)).unwrap();

        // Policy lifted by another process while the daemon was dead
        store
            .save_policy(&BlockPolicy::blocking(["steam"]).deactivated())
            .unwrap();
        id
    };

    let store = open_store(&dir);
    let tracker = SessionTracker::new(store.clone());
    let closed = tracker
        .close_orphaned_sessions(at(2, 12, 0))
        .unwrap()
        .unwrap();

    assert_eq!(closed.id, id);
    assert_eq!(closed.end_time, Some(at(2, 9, 45)));
    assert_eq!(closed.duration_ms, 45 * 60 * 1000);
    assert!(store.get_open_session().unwrap().is_none());

    // Running recovery again changes nothing
    assert!(tracker.close_orphaned_sessions(at(2, 13, 0)).unwrap().is_none());
}

#[test]
fn unblock_twice_is_same_as_once() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let tracker = SessionTracker::new(store.clone());
    let id = tracker.start_session(3, at(5, 8, 0)).unwrap();

    let first = tracker
        .end_current_session(SessionEndReason::Unblocked, at(5, 9, 0))
        .unwrap()
        .unwrap();
    assert_eq!(first.id, id);

    assert!(tracker
        .end_current_session(SessionEndReason::Unblocked, at(5, 10, 0))
        .unwrap()
        .is_none());
    assert!(tracker
        .end_session(id, SessionEndReason::Unblocked, at(5, 11, 0))
        .unwrap()
        .is_none());

    let stored = store.get_session(id).unwrap().unwrap();
    assert_eq!(stored.end_time, Some(at(5, 9, 0)));
    assert_eq!(stored.duration_ms, 60 * 60 * 1000);
}

#[test]
fn concurrent_starts_leave_one_open_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let tracker = Arc::new(SessionTracker::new(store.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = tracker.clone();
            std::thread::spawn(move || tracker.ensure_session(1, warden_util::now()).unwrap())
        })
        .collect();

    let ids: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().id())
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0]));

    let open: Vec<_> = store
        .recent_sessions(100)
        .unwrap()
        .into_iter()
        .filter(|s| s.is_open())
        .collect();
    assert_eq!(open.len(), 1);
}

#[test]
fn streak_over_persisted_history() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let tracker = SessionTracker::new(store.clone());
    let settings = StreakSettings {
        daily_threshold_ms: 2 * 60 * 60 * 1000,
        max_days: 365,
    };
    let today = at(10, 12, 0).date_naive();

    assert_eq!(calculate_streak(&*store, today, &settings).unwrap(), 0);

    // 1 h yesterday, 3 h today in two sessions
    let id = tracker.start_session(1, at(9, 8, 0)).unwrap();
    tracker
        .end_session(id, SessionEndReason::Unblocked, at(9, 9, 0))
        .unwrap();
    let id = tracker.start_session(1, at(10, 6, 0)).unwrap();
    tracker
        .end_session(id, SessionEndReason::Unblocked, at(10, 8, 0))
        .unwrap();
    let id = tracker.start_session(1, at(10, 9, 0)).unwrap();
    tracker
        .end_session(id, SessionEndReason::Unblocked, at(10, 10, 0))
        .unwrap();

    assert_eq!(calculate_streak(&*store, today, &settings).unwrap(), 1);

    // Another hour yesterday makes it two days
    let id = tracker.start_session(1, at(9, 20, 0)).unwrap();
    tracker
        .end_session(id, SessionEndReason::Unblocked, at(9, 21, 0))
        .unwrap();
    assert_eq!(calculate_streak(&*store, today, &settings).unwrap(), 2);
}

#[test]
fn watchdog_follows_persisted_policy() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let supervisor = Arc::new(MockSupervisor::new());
    let watchdog = WatchdogSupervisor::new(
        store.clone(),
        supervisor.clone(),
        WatchdogSettings {
            interval: Duration::from_secs(900),
            retry_base: Duration::from_secs(30),
        },
    );

    assert_eq!(
        watchdog.check(WatchdogTrigger::Boot).unwrap(),
        WatchdogOutcome::PolicyInactive
    );

    store.save_policy(&BlockPolicy::blocking(["steam"])).unwrap();
    assert!(matches!(
        watchdog.check(WatchdogTrigger::Periodic).unwrap(),
        WatchdogOutcome::Relaunched { .. }
    ));

    // Daemon died again
    supervisor.set_running(false);
    assert!(matches!(
        watchdog.check(WatchdogTrigger::PackageReplaced).unwrap(),
        WatchdogOutcome::Relaunched { .. }
    ));
    assert_eq!(supervisor.launch_count(), 2);
}

#[test]
fn focus_time_sums_closed_sessions_since() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let tracker = SessionTracker::new(store.clone());

    let id = tracker.start_session(1, at(1, 10, 0)).unwrap();
    tracker
        .end_session(id, SessionEndReason::Unblocked, at(1, 11, 0))
        .unwrap();
    let id = tracker.start_session(1, at(3, 10, 0)).unwrap();
    tracker
        .end_session(id, SessionEndReason::Unblocked, at(3, 10, 30))
        .unwrap();
    tracker.start_session(1, at(3, 12, 0)).unwrap();

    let since = at(2, 0, 0);
    assert_eq!(store.total_duration_since(since).unwrap(), 30 * 60 * 1000);
    assert_eq!(
        store
            .total_duration_since(since - ChronoDuration::days(5))
            .unwrap(),
        90 * 60 * 1000
    );
}
