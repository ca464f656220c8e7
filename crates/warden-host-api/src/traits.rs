//! Host capability traits

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;
use warden_util::AppId;

/// Errors from host operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Foreground probe failed: {0}")]
    ProbeFailed(String),

    #[error("Overlay attach failed: {0}")]
    AttachFailed(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Reports which application came to the foreground recently
#[async_trait]
pub trait ForegroundProbe: Send + Sync {
    /// The app of the latest foreground transition in `[since, until]`.
    ///
    /// `Ok(None)` means no transition happened in the window. Errors are
    /// transient; callers retry on the next tick.
    async fn most_recent_foreground_app(
        &self,
        since: DateTime<Local>,
        until: DateTime<Local>,
    ) -> HostResult<Option<AppId>>;
}

/// Renders the intercepting view above all other applications
pub trait OverlaySurface: Send + Sync {
    /// Put the block overlay on screen for `app_id`.
    ///
    /// Must not block on the UI owner; implementations hand the request off.
    fn attach(&self, app_id: &AppId, label: &str) -> HostResult<()>;

    /// Remove the overlay. Removing an absent overlay is not an error.
    fn detach(&self) -> HostResult<()>;
}

/// Best-effort human-readable names for app ids
pub trait AppLabelResolver: Send + Sync {
    fn label_for(&self, app_id: &AppId) -> Option<String>;
}

/// Liveness query and launcher for the enforcement process
pub trait ProcessSupervisor: Send + Sync {
    /// Whether the enforcement process is currently alive
    fn is_running(&self) -> bool;

    /// Start the enforcement process detached; returns its pid
    fn launch(&self) -> HostResult<u32>;
}
