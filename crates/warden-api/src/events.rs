//! Event types for wardend -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use warden_util::{AppId, SessionId};

use crate::{SessionEndReason, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: warden_util::now(),
            payload,
        }
    }
}

/// All possible events from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A usage session was opened (policy activated)
    SessionStarted {
        session_id: SessionId,
        blocked_app_count: u32,
        started_at: DateTime<Local>,
    },

    /// A usage session was closed (policy deactivated)
    SessionEnded {
        session_id: SessionId,
        reason: SessionEndReason,
        duration_ms: u64,
    },

    /// Render the full-screen block overlay for this app
    OverlayShow { app_id: AppId, label: String },

    /// Remove the block overlay
    OverlayDismiss,

    /// Daemon is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_event_serialization() {
        let event = Event::new(EventPayload::OverlayShow {
            app_id: AppId::new("steam"),
            label: "Steam".into(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"overlay_show\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        match parsed.payload {
            EventPayload::OverlayShow { app_id, label } => {
                assert_eq!(app_id.as_str(), "steam");
                assert_eq!(label, "Steam");
            }
            other => panic!("Expected OverlayShow, got {:?}", other),
        }
    }

    #[test]
    fn session_ended_carries_reason() {
        let event = Event::new(EventPayload::SessionEnded {
            session_id: SessionId::new(3),
            reason: SessionEndReason::Unblocked,
            duration_ms: 60_000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("unblocked"));
    }
}
