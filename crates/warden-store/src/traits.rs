//! Store trait definitions

use chrono::{DateTime, Local};
use warden_api::{BlockPolicy, SessionPointer, UsageSession};
use warden_util::SessionId;

use crate::{AuditEvent, StoreError, StoreResult};

/// Preference key for the open session's id
pub const PREF_CURRENT_SESSION_ID: &str = "current_session_id";

/// Preference key for the monitoring loop's last heartbeat (epoch ms)
pub const PREF_LAST_HEARTBEAT: &str = "last_heartbeat_ms";

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Usage sessions

    /// Insert an open session and return its id.
    ///
    /// Fails with [`StoreError::Conflict`] if another session is already open.
    fn insert_session(
        &self,
        start_time: DateTime<Local>,
        blocked_app_count: u32,
    ) -> StoreResult<SessionId>;

    fn get_session(&self, id: SessionId) -> StoreResult<Option<UsageSession>>;

    /// The session with no end time, if any
    fn get_open_session(&self) -> StoreResult<Option<UsageSession>>;

    /// Close an open session at `end_time`.
    ///
    /// Returns the closed row, or `None` when the id is unknown or the
    /// session was already closed. An `end_time` before the start is
    /// clamped to the start.
    fn close_session(
        &self,
        id: SessionId,
        end_time: DateTime<Local>,
    ) -> StoreResult<Option<UsageSession>>;

    /// Sessions whose start time lies in `[start, end)`, oldest first
    fn sessions_in_range(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> StoreResult<Vec<UsageSession>>;

    /// Most recent sessions, newest first
    fn recent_sessions(&self, limit: usize) -> StoreResult<Vec<UsageSession>>;

    /// Sum of `duration_ms` over closed sessions starting in `[start, end)`
    fn total_closed_duration_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> StoreResult<u64>;

    /// Sum of `duration_ms` over closed sessions starting at or after `since`
    fn total_duration_since(&self, since: DateTime<Local>) -> StoreResult<u64>;

    /// Delete every session; returns the number removed
    fn clear_sessions(&self) -> StoreResult<usize>;

    // Preferences

    fn get_pref(&self, key: &str) -> StoreResult<Option<String>>;

    fn set_pref(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove_pref(&self, key: &str) -> StoreResult<()>;

    /// Read the persisted session pointer
    fn load_pointer(&self) -> StoreResult<SessionPointer> {
        let current_session_id = match self.get_pref(PREF_CURRENT_SESSION_ID)? {
            Some(raw) => Some(raw.parse::<SessionId>().map_err(|_| StoreError::Corrupt {
                key: PREF_CURRENT_SESSION_ID.into(),
                value: raw,
            })?),
            None => None,
        };

        let last_heartbeat = match self.get_pref(PREF_LAST_HEARTBEAT)? {
            Some(raw) => {
                let ms = raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(warden_util::from_millis);
                match ms {
                    Some(ts) => Some(ts),
                    None => {
                        return Err(StoreError::Corrupt {
                            key: PREF_LAST_HEARTBEAT.into(),
                            value: raw,
                        });
                    }
                }
            }
            None => None,
        };

        Ok(SessionPointer {
            current_session_id,
            last_heartbeat,
        })
    }

    fn set_current_session_id(&self, id: Option<SessionId>) -> StoreResult<()> {
        match id {
            Some(id) => self.set_pref(PREF_CURRENT_SESSION_ID, &id.to_string()),
            None => self.remove_pref(PREF_CURRENT_SESSION_ID),
        }
    }

    fn set_last_heartbeat(&self, at: DateTime<Local>) -> StoreResult<()> {
        self.set_pref(PREF_LAST_HEARTBEAT, &warden_util::to_millis(&at).to_string())
    }

    // Block policy

    /// Load the persisted policy; an inactive empty policy when none was saved
    fn load_policy(&self) -> StoreResult<BlockPolicy>;

    fn save_policy(&self, policy: &BlockPolicy) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
