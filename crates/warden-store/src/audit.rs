//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use warden_api::SessionEndReason;
use warden_util::{AppId, SessionId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Enforcement daemon started
    ServiceStarted,

    /// Enforcement daemon stopped
    ServiceStopped,

    /// Block policy written
    PolicyChanged {
        active: bool,
        blocked_app_count: u32,
    },

    /// Session opened
    SessionStarted {
        session_id: SessionId,
        blocked_app_count: u32,
    },

    /// Session closed
    SessionEnded {
        session_id: SessionId,
        reason: SessionEndReason,
        duration_ms: u64,
    },

    /// Open session left behind by a dead process was closed at startup
    OrphanedSessionClosed {
        session_id: SessionId,
        end_time: DateTime<Local>,
        /// false when no heartbeat was recorded and `now` was used
        from_heartbeat: bool,
    },

    /// Block overlay shown
    OverlayShown { app_id: AppId },

    /// Watchdog relaunched the daemon
    WatchdogRestarted { pid: u32, trigger: String },

    /// Session history wiped
    HistoryCleared { removed: usize },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: warden_util::now(),
            event,
        }
    }
}
