//! Shared types for the appwarden data model and API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use warden_util::{AppId, SessionId};

/// The active block configuration.
///
/// Written by the UI layer, read-only to the enforcement core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPolicy {
    /// Whether blocking is switched on
    pub active: bool,

    /// Applications that may not be brought to the foreground
    pub blocked_apps: BTreeSet<AppId>,
}

impl BlockPolicy {
    /// An active policy blocking the given apps
    pub fn blocking<I, A>(apps: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AppId>,
    {
        Self {
            active: true,
            blocked_apps: apps.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the core should enforce this policy.
    ///
    /// An active policy with an empty set is treated as inactive.
    pub fn is_enforcing(&self) -> bool {
        self.active && !self.blocked_apps.is_empty()
    }

    pub fn blocks(&self, app_id: &AppId) -> bool {
        self.blocked_apps.contains(app_id)
    }

    pub fn blocked_count(&self) -> u32 {
        self.blocked_apps.len() as u32
    }

    /// Same app set, switched off
    pub fn deactivated(&self) -> Self {
        Self {
            active: false,
            blocked_apps: self.blocked_apps.clone(),
        }
    }
}

/// One interval of policy enforcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSession {
    pub id: SessionId,
    pub start_time: DateTime<Local>,
    /// None while the session is open
    pub end_time: Option<DateTime<Local>>,
    /// 0 while open, `end_time - start_time` once closed
    pub duration_ms: u64,
    /// Policy size when the session started
    pub blocked_app_count: u32,
}

impl UsageSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Persisted reference to the open session plus the loop's liveness stamp
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPointer {
    pub current_session_id: Option<SessionId>,
    pub last_heartbeat: Option<DateTime<Local>>,
}

/// Block overlay state (in-memory only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OverlayState {
    #[default]
    Hidden,
    ShownFor {
        app_id: AppId,
        shown_at: DateTime<Local>,
    },
}

impl OverlayState {
    pub fn is_showing(&self) -> bool {
        matches!(self, OverlayState::ShownFor { .. })
    }

    pub fn app_id(&self) -> Option<&AppId> {
        match self {
            OverlayState::Hidden => None,
            OverlayState::ShownFor { app_id, .. } => Some(app_id),
        }
    }
}

/// Why a session was closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEndReason {
    /// The user lifted the policy
    Unblocked,
    /// The monitoring loop observed an inactive policy
    PolicyInactive,
    /// The daemon was asked to stop
    ServiceShutdown,
    /// Closed at startup after the owning process died
    Orphaned,
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub api_version: u32,
    pub policy: BlockPolicy,
    pub active_session: Option<UsageSession>,
    pub overlay: OverlayState,
    pub last_heartbeat: Option<DateTime<Local>>,
    pub store_ok: bool,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Overlay/shell client - can view status and report overlay closes
    Shell,
    /// Local owner - can also lift the policy
    Admin,
}

impl ClientRole {
    pub fn can_deactivate(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}
