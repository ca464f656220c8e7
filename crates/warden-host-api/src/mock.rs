//! Mock host capabilities for testing

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warden_util::AppId;

use crate::{
    AppLabelResolver, FocusHistory, ForegroundProbe, HostError, HostResult, OverlaySurface,
    ProcessSupervisor,
};

/// Probe driven by explicit `report` calls
pub struct MockForegroundProbe {
    history: Mutex<FocusHistory>,
    queries: AtomicUsize,

    /// Number of upcoming queries that fail
    pub fail_next: Arc<Mutex<u32>>,
}

impl MockForegroundProbe {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(FocusHistory::new()),
            queries: AtomicUsize::new(0),
            fail_next: Arc::new(Mutex::new(0)),
        }
    }

    /// Simulate `app_id` coming to the foreground at `at`
    pub fn report(&self, app_id: impl Into<AppId>, at: DateTime<Local>) {
        self.history.lock().unwrap().record(app_id.into(), at);
    }

    pub fn set_fail_next(&self, count: u32) {
        *self.fail_next.lock().unwrap() = count;
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Default for MockForegroundProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForegroundProbe for MockForegroundProbe {
    async fn most_recent_foreground_app(
        &self,
        since: DateTime<Local>,
        until: DateTime<Local>,
    ) -> HostResult<Option<AppId>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(HostError::ProbeFailed("Mock probe failure".into()));
            }
        }

        Ok(self.history.lock().unwrap().latest_between(since, until))
    }
}

/// Overlay surface that records what it was asked to render
pub struct MockOverlaySurface {
    attached: Mutex<Option<(AppId, String)>>,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,

    /// Configure attach to fail
    pub fail_attach: Arc<Mutex<bool>>,
}

impl MockOverlaySurface {
    pub fn new() -> Self {
        Self {
            attached: Mutex::new(None),
            attach_calls: AtomicUsize::new(0),
            detach_calls: AtomicUsize::new(0),
            fail_attach: Arc::new(Mutex::new(false)),
        }
    }

    /// The app and label currently on screen
    pub fn attached(&self) -> Option<(AppId, String)> {
        self.attached.lock().unwrap().clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockOverlaySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlaySurface for MockOverlaySurface {
    fn attach(&self, app_id: &AppId, label: &str) -> HostResult<()> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_attach.lock().unwrap() {
            return Err(HostError::AttachFailed("Mock attach failure".into()));
        }

        *self.attached.lock().unwrap() = Some((app_id.clone(), label.to_string()));
        Ok(())
    }

    fn detach(&self) -> HostResult<()> {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        *self.attached.lock().unwrap() = None;
        Ok(())
    }
}

/// Fixed app id -> label table
#[derive(Debug, Default)]
pub struct MockLabels {
    labels: HashMap<AppId, String>,
}

impl MockLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, app_id: impl Into<AppId>, label: impl Into<String>) -> Self {
        self.labels.insert(app_id.into(), label.into());
        self
    }
}

impl AppLabelResolver for MockLabels {
    fn label_for(&self, app_id: &AppId) -> Option<String> {
        self.labels.get(app_id).cloned()
    }
}

/// In-memory stand-in for the enforcement process
pub struct MockSupervisor {
    launches: AtomicU32,

    /// Whether the process is considered alive
    pub running: Arc<Mutex<bool>>,

    /// Configure launch to fail
    pub fail_launch: Arc<Mutex<bool>>,
}

impl MockSupervisor {
    pub fn new() -> Self {
        Self {
            launches: AtomicU32::new(0),
            running: Arc::new(Mutex::new(false)),
            fail_launch: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_running(&self, running: bool) {
        *self.running.lock().unwrap() = running;
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Default for MockSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor for MockSupervisor {
    fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn launch(&self) -> HostResult<u32> {
        if *self.fail_launch.lock().unwrap() {
            return Err(HostError::LaunchFailed("Mock launch failure".into()));
        }

        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        *self.running.lock().unwrap() = true;
        Ok(10_000 + n)
    }
}
