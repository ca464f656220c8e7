//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};
use warden_api::{BlockPolicy, UsageSession};
use warden_util::{from_millis, to_millis, AppId, SessionId};

use crate::{AuditEvent, Store, StoreResult};

const SESSION_COLUMNS: &str = "id, start_ms, end_ms, duration_ms, blocked_app_count";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_ms INTEGER NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Usage sessions
            CREATE TABLE IF NOT EXISTS usage_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                blocked_app_count INTEGER NOT NULL
            );

            -- Key/value preferences (session pointer)
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Block policy (single row)
            CREATE TABLE IF NOT EXISTS policy (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                active INTEGER NOT NULL,
                apps_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_sessions_start ON usage_sessions(start_ms);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_single_open
                ON usage_sessions((end_ms IS NULL)) WHERE end_ms IS NULL;
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<UsageSession> {
    let id: i64 = row.get(0)?;
    let start_ms: i64 = row.get(1)?;
    let end_ms: Option<i64> = row.get(2)?;
    let duration_ms: i64 = row.get(3)?;
    let blocked_app_count: i64 = row.get(4)?;

    let start_time =
        from_millis(start_ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(1, start_ms))?;
    let end_time = match end_ms {
        Some(ms) => Some(from_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(2, ms))?),
        None => None,
    };

    Ok(UsageSession {
        id: SessionId::new(id),
        start_time,
        end_time,
        duration_ms: duration_ms.max(0) as u64,
        blocked_app_count: blocked_app_count.max(0) as u32,
    })
}

fn select_session(conn: &Connection, id: SessionId) -> StoreResult<Option<UsageSession>> {
    let session = conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM usage_sessions WHERE id = ?"),
            [id.get()],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp_ms, event_json) VALUES (?, ?)",
            params![to_millis(&event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_ms: i64 = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_ms, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_ms, event_json) = row?;
            let timestamp = from_millis(timestamp_ms).unwrap_or_else(warden_util::now);
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn insert_session(
        &self,
        start_time: DateTime<Local>,
        blocked_app_count: u32,
    ) -> StoreResult<SessionId> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO usage_sessions (start_ms, end_ms, duration_ms, blocked_app_count) VALUES (?, NULL, 0, ?)",
            params![to_millis(&start_time), blocked_app_count],
        )?;

        let id = SessionId::new(conn.last_insert_rowid());
        debug!(session_id = %id, blocked_app_count, "Session row inserted");
        Ok(id)
    }

    fn get_session(&self, id: SessionId) -> StoreResult<Option<UsageSession>> {
        let conn = self.conn.lock().unwrap();
        select_session(&conn, id)
    }

    fn get_open_session(&self) -> StoreResult<Option<UsageSession>> {
        let conn = self.conn.lock().unwrap();

        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM usage_sessions WHERE end_ms IS NULL ORDER BY id DESC LIMIT 1"
                ),
                [],
                session_from_row,
            )
            .optional()?;

        Ok(session)
    }

    fn close_session(
        &self,
        id: SessionId,
        end_time: DateTime<Local>,
    ) -> StoreResult<Option<UsageSession>> {
        let conn = self.conn.lock().unwrap();

        let Some(session) = select_session(&conn, id)? else {
            debug!(session_id = %id, "Close requested for unknown session");
            return Ok(None);
        };
        if !session.is_open() {
            debug!(session_id = %id, "Session already closed");
            return Ok(None);
        }

        let start_ms = to_millis(&session.start_time);
        let end_ms = to_millis(&end_time).max(start_ms);
        let duration_ms = end_ms - start_ms;

        let changed = conn.execute(
            "UPDATE usage_sessions SET end_ms = ?, duration_ms = ? WHERE id = ? AND end_ms IS NULL",
            params![end_ms, duration_ms, id.get()],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        debug!(session_id = %id, duration_ms, "Session row closed");
        select_session(&conn, id)
    }

    fn sessions_in_range(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> StoreResult<Vec<UsageSession>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM usage_sessions WHERE start_ms >= ? AND start_ms < ? ORDER BY start_ms ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![to_millis(&start), to_millis(&end)], session_from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    fn recent_sessions(&self, limit: usize) -> StoreResult<Vec<UsageSession>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM usage_sessions ORDER BY start_ms DESC, id DESC LIMIT ?"
        ))?;
        let rows = stmt.query_map([limit as i64], session_from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }

    fn total_closed_duration_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(duration_ms), 0) FROM usage_sessions
            WHERE start_ms >= ? AND start_ms < ? AND end_ms IS NOT NULL
            "#,
            params![to_millis(&start), to_millis(&end)],
            |row| row.get(0),
        )?;

        Ok(total.max(0) as u64)
    }

    fn total_duration_since(&self, since: DateTime<Local>) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(duration_ms), 0) FROM usage_sessions WHERE start_ms >= ? AND end_ms IS NOT NULL",
            [to_millis(&since)],
            |row| row.get(0),
        )?;

        Ok(total.max(0) as u64)
    }

    fn clear_sessions(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM usage_sessions", [])?;
        debug!(removed, "Session history cleared");
        Ok(removed)
    }

    fn get_pref(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();

        let value = conn
            .query_row("SELECT value FROM preferences WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(value)
    }

    fn set_pref(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO preferences (key, value)
            VALUES (?, ?)
            ON CONFLICT(key)
            DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;

        Ok(())
    }

    fn remove_pref(&self, key: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM preferences WHERE key = ?", [key])?;
        Ok(())
    }

    fn load_policy(&self) -> StoreResult<BlockPolicy> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(bool, String)> = conn
            .query_row("SELECT active, apps_json FROM policy WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        match row {
            Some((active, apps_json)) => {
                let apps: Vec<AppId> = serde_json::from_str(&apps_json)?;
                Ok(BlockPolicy {
                    active,
                    blocked_apps: apps.into_iter().collect(),
                })
            }
            None => Ok(BlockPolicy::default()),
        }
    }

    fn save_policy(&self, policy: &BlockPolicy) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let apps_json = serde_json::to_string(&policy.blocked_apps)?;

        conn.execute(
            r#"
            INSERT INTO policy (id, active, apps_json)
            VALUES (1, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET active = excluded.active, apps_json = excluded.apps_json
            "#,
            params![policy.active, apps_json],
        )?;

        debug!(
            active = policy.active,
            blocked_apps = policy.blocked_apps.len(),
            "Policy saved"
        );
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AuditEventType, StoreError};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        let event = AuditEvent::new(AuditEventType::ServiceStarted);
        store.append_audit(event).unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_session_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();

        let id = store.insert_session(at(9, 0), 3).unwrap();
        let open = store.get_open_session().unwrap().unwrap();
        assert_eq!(open.id, id);
        assert!(open.is_open());
        assert_eq!(open.duration_ms, 0);
        assert_eq!(open.blocked_app_count, 3);

        let closed = store.close_session(id, at(9, 30)).unwrap().unwrap();
        assert_eq!(closed.end_time, Some(at(9, 30)));
        assert_eq!(closed.duration_ms, 30 * 60 * 1000);
        assert!(store.get_open_session().unwrap().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();

        let id = store.insert_session(at(9, 0), 1).unwrap();
        assert!(store.close_session(id, at(10, 0)).unwrap().is_some());
        assert!(store.close_session(id, at(11, 0)).unwrap().is_none());

        let session = store.get_session(id).unwrap().unwrap();
        assert_eq!(session.end_time, Some(at(10, 0)));
        assert_eq!(session.duration_ms, 60 * 60 * 1000);

        assert!(
            store
                .close_session(SessionId::new(999), at(11, 0))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_second_open_session_rejected() {
        let store = SqliteStore::in_memory().unwrap();

        store.insert_session(at(9, 0), 1).unwrap();
        let result = store.insert_session(at(9, 5), 1);
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_close_before_start_clamps_to_zero() {
        let store = SqliteStore::in_memory().unwrap();

        let id = store.insert_session(at(9, 0), 1).unwrap();
        let closed = store.close_session(id, at(8, 0)).unwrap().unwrap();
        assert_eq!(closed.duration_ms, 0);
        assert_eq!(closed.end_time, Some(at(9, 0)));
    }

    #[test]
    fn test_duration_sums_exclude_open_sessions() {
        let store = SqliteStore::in_memory().unwrap();

        let a = store.insert_session(at(8, 0), 1).unwrap();
        store.close_session(a, at(9, 0)).unwrap();
        let b = store.insert_session(at(10, 0), 1).unwrap();
        store.close_session(b, at(10, 30)).unwrap();
        store.insert_session(at(12, 0), 1).unwrap();

        let (start, end) = (at(0, 0), at(0, 0) + ChronoDuration::days(1));
        assert_eq!(
            store.total_closed_duration_between(start, end).unwrap(),
            90 * 60 * 1000
        );
        assert_eq!(store.sessions_in_range(start, end).unwrap().len(), 3);
        assert_eq!(
            store.total_duration_since(at(9, 30)).unwrap(),
            30 * 60 * 1000
        );
    }

    #[test]
    fn test_range_is_half_open() {
        let store = SqliteStore::in_memory().unwrap();

        let id = store.insert_session(at(12, 0), 1).unwrap();
        store.close_session(id, at(13, 0)).unwrap();

        assert_eq!(store.sessions_in_range(at(11, 0), at(12, 0)).unwrap().len(), 0);
        assert_eq!(store.sessions_in_range(at(12, 0), at(12, 1)).unwrap().len(), 1);
    }

    #[test]
    fn test_recent_sessions_and_clear() {
        let store = SqliteStore::in_memory().unwrap();

        for hour in [8, 10, 12] {
            let id = store.insert_session(at(hour, 0), 1).unwrap();
            store.close_session(id, at(hour, 45)).unwrap();
        }

        let recent = store.recent_sessions(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].start_time, at(12, 0));

        assert_eq!(store.clear_sessions().unwrap(), 3);
        assert!(store.recent_sessions(10).unwrap().is_empty());
    }

    #[test]
    fn test_session_pointer() {
        let store = SqliteStore::in_memory().unwrap();

        let pointer = store.load_pointer().unwrap();
        assert!(pointer.current_session_id.is_none());
        assert!(pointer.last_heartbeat.is_none());

        store.set_current_session_id(Some(SessionId::new(4))).unwrap();
        store.set_last_heartbeat(at(9, 15)).unwrap();

        let pointer = store.load_pointer().unwrap();
        assert_eq!(pointer.current_session_id, Some(SessionId::new(4)));
        assert_eq!(pointer.last_heartbeat, Some(at(9, 15)));

        store.set_current_session_id(None).unwrap();
        assert!(store.load_pointer().unwrap().current_session_id.is_none());
    }

    #[test]
    fn test_corrupt_pointer_is_reported() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_pref(crate::PREF_LAST_HEARTBEAT, "yesterday").unwrap();

        assert!(matches!(
            store.load_pointer(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_policy_round_trip() {
        let store = SqliteStore::in_memory().unwrap();

        let policy = store.load_policy().unwrap();
        assert!(!policy.active);
        assert!(policy.blocked_apps.is_empty());

        let policy = BlockPolicy::blocking(["steam", "org.telegram.desktop"]);
        store.save_policy(&policy).unwrap();
        assert_eq!(store.load_policy().unwrap(), policy);

        store.save_policy(&policy.deactivated()).unwrap();
        assert!(!store.load_policy().unwrap().active);
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("appwarden.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_session(at(9, 0), 2).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let open = store.get_open_session().unwrap().unwrap();
        assert_eq!(open.blocked_app_count, 2);
    }
}
