//! Core events emitted by the enforcement engine

use chrono::{DateTime, Local};
use warden_api::SessionEndReason;
use warden_util::{AppId, SessionId};

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// Session opened
    SessionStarted {
        session_id: SessionId,
        blocked_app_count: u32,
        started_at: DateTime<Local>,
    },

    /// Session closed
    SessionEnded {
        session_id: SessionId,
        reason: SessionEndReason,
        duration_ms: u64,
    },

    /// Overlay put on screen
    OverlayShown { app_id: AppId },

    /// Overlay removed
    OverlayDismissed,
}
