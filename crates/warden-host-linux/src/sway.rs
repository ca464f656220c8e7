//! Foreground probe backed by the sway window tree

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::trace;
use warden_host_api::{FocusHistory, ForegroundProbe, HostError, HostResult};
use warden_util::AppId;

const DEFAULT_SWAYMSG: &str = "swaymsg";

/// Polls `swaymsg -t get_tree` and turns focus changes into transitions.
///
/// Each query observes the focused window at `until`; the answer is the
/// latest transition inside the requested window.
pub struct SwayFocusProbe {
    swaymsg: String,
    history: Mutex<FocusHistory>,
}

impl SwayFocusProbe {
    pub fn new() -> Self {
        Self::with_command(DEFAULT_SWAYMSG)
    }

    pub fn with_command(swaymsg: impl Into<String>) -> Self {
        Self {
            swaymsg: swaymsg.into(),
            history: Mutex::new(FocusHistory::new()),
        }
    }

    async fn read_tree(&self) -> HostResult<Value> {
        let output = Command::new(&self.swaymsg)
            .args(["-t", "get_tree", "-r"])
            .output()
            .await
            .map_err(|e| HostError::ProbeFailed(format!("Failed to run {}: {}", self.swaymsg, e)))?;

        if !output.status.success() {
            return Err(HostError::ProbeFailed(format!(
                "{} exited with {}: {}",
                self.swaymsg,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| HostError::ProbeFailed(format!("Invalid tree JSON: {}", e)))
    }
}

impl Default for SwayFocusProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForegroundProbe for SwayFocusProbe {
    async fn most_recent_foreground_app(
        &self,
        since: DateTime<Local>,
        until: DateTime<Local>,
    ) -> HostResult<Option<AppId>> {
        let tree = self.read_tree().await?;

        let mut history = self.history.lock().unwrap();
        if let Some(app_id) = focused_app_id(&tree)
            && history.observe(app_id.clone(), until)
        {
            trace!(app_id = %app_id, "Focus changed");
        }

        Ok(history.latest_between(since, until))
    }
}

/// The app id of the focused window in a sway tree.
///
/// Wayland clients report `app_id`; XWayland clients only carry
/// `window_properties.class`.
pub fn focused_app_id(node: &Value) -> Option<AppId> {
    if node.get("focused").and_then(Value::as_bool) == Some(true) {
        return node_app_id(node);
    }

    ["nodes", "floating_nodes"]
        .iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_array))
        .flatten()
        .find_map(focused_app_id)
}

fn node_app_id(node: &Value) -> Option<AppId> {
    let wayland = node.get("app_id").and_then(Value::as_str);
    let x11 = node
        .get("window_properties")
        .and_then(|props| props.get("class"))
        .and_then(Value::as_str);

    wayland
        .or(x11)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(AppId::new)
}
