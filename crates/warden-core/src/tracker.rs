//! Usage session life-cycle and orphan recovery

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use warden_api::{SessionEndReason, UsageSession};
use warden_store::{AuditEvent, AuditEventType, Store, StoreResult};
use warden_util::SessionId;

/// Result of [`SessionTracker::ensure_session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsuredSession {
    /// An open session already existed and was kept
    Continued(SessionId),
    /// No session was open; a new one was started
    Started(SessionId),
}

impl EnsuredSession {
    pub fn id(&self) -> SessionId {
        match self {
            EnsuredSession::Continued(id) | EnsuredSession::Started(id) => *id,
        }
    }
}

/// Owns the persisted session life-cycle.
///
/// Every operation runs under one mutex so concurrent callers cannot open
/// two sessions. The store additionally rejects a second open row.
pub struct SessionTracker {
    store: Arc<dyn Store>,
    serial: Mutex<()>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            serial: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The guarded value is `()`, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.serial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new session and point the session pointer at it.
    ///
    /// Callers must check [`get_active_session`](Self::get_active_session)
    /// first, or use [`ensure_session`](Self::ensure_session).
    pub fn start_session(&self, blocked_app_count: u32, now: DateTime<Local>) -> StoreResult<SessionId> {
        let _guard = self.lock();
        self.start_locked(blocked_app_count, now)
    }

    fn start_locked(&self, blocked_app_count: u32, now: DateTime<Local>) -> StoreResult<SessionId> {
        let id = self.store.insert_session(now, blocked_app_count)?;
        self.store.set_current_session_id(Some(id))?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionStarted {
            session_id: id,
            blocked_app_count,
        }));

        info!(session_id = %id, blocked_app_count, "Session started");
        Ok(id)
    }

    /// The open session, if any
    pub fn get_active_session(&self) -> StoreResult<Option<UsageSession>> {
        self.store.get_open_session()
    }

    /// Close a session and clear the pointer.
    ///
    /// Unknown or already-closed ids are a no-op and return `None`.
    pub fn end_session(
        &self,
        id: SessionId,
        reason: SessionEndReason,
        now: DateTime<Local>,
    ) -> StoreResult<Option<UsageSession>> {
        let _guard = self.lock();
        self.end_locked(id, reason, now)
    }

    fn end_locked(
        &self,
        id: SessionId,
        reason: SessionEndReason,
        now: DateTime<Local>,
    ) -> StoreResult<Option<UsageSession>> {
        let Some(closed) = self.store.close_session(id, now)? else {
            debug!(session_id = %id, "No open session with this id");
            return Ok(None);
        };

        self.clear_pointer_if(id)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SessionEnded {
            session_id: id,
            reason: reason.clone(),
            duration_ms: closed.duration_ms,
        }));

        info!(
            session_id = %id,
            duration_ms = closed.duration_ms,
            reason = ?reason,
            "Session ended"
        );
        Ok(Some(closed))
    }

    fn clear_pointer_if(&self, id: SessionId) -> StoreResult<()> {
        let pointer = self.store.load_pointer()?;
        if pointer.current_session_id.is_none_or(|current| current == id) {
            self.store.set_current_session_id(None)?;
        }
        Ok(())
    }

    /// Close whatever session is open
    pub fn end_current_session(
        &self,
        reason: SessionEndReason,
        now: DateTime<Local>,
    ) -> StoreResult<Option<UsageSession>> {
        let _guard = self.lock();
        match self.store.get_open_session()? {
            Some(session) => self.end_locked(session.id, reason, now),
            None => Ok(None),
        }
    }

    /// Reuse the open session or start one; never creates a duplicate
    pub fn ensure_session(
        &self,
        blocked_app_count: u32,
        now: DateTime<Local>,
    ) -> StoreResult<EnsuredSession> {
        let _guard = self.lock();

        if let Some(open) = self.store.get_open_session()? {
            let pointer = self.store.load_pointer()?;
            if pointer.current_session_id != Some(open.id) {
                self.store.set_current_session_id(Some(open.id))?;
            }
            info!(session_id = %open.id, "Continuing open session");
            return Ok(EnsuredSession::Continued(open.id));
        }

        self.start_locked(blocked_app_count, now)
            .map(EnsuredSession::Started)
    }

    /// Stamp the loop's liveness
    pub fn record_heartbeat(&self, at: DateTime<Local>) -> StoreResult<()> {
        self.store.set_last_heartbeat(at)
    }

    /// Close a session left open by a process that died.
    ///
    /// Runs at startup before the monitoring loop. An open session is an
    /// orphan only if the policy is no longer enforcing. It is closed at
    /// `min(last_heartbeat, now)`, or at `now` when no heartbeat was ever
    /// recorded.
    pub fn close_orphaned_sessions(&self, now: DateTime<Local>) -> StoreResult<Option<UsageSession>> {
        let _guard = self.lock();

        let Some(open) = self.store.get_open_session()? else {
            // A pointer without an open row is stale
            if self.store.load_pointer()?.current_session_id.is_some() {
                warn!("Clearing stale session pointer");
                self.store.set_current_session_id(None)?;
            }
            return Ok(None);
        };

        if self.store.load_policy()?.is_enforcing() {
            debug!(session_id = %open.id, "Open session belongs to an active policy");
            return Ok(None);
        }

        let pointer = self.store.load_pointer()?;
        let (end_time, from_heartbeat) = match pointer.last_heartbeat {
            Some(heartbeat) => (heartbeat.min(now), true),
            None => (now, false),
        };

        let Some(closed) = self.end_locked(open.id, SessionEndReason::Orphaned, end_time)? else {
            return Ok(None);
        };

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::OrphanedSessionClosed {
                session_id: closed.id,
                end_time,
                from_heartbeat,
            }));

        info!(
            session_id = %closed.id,
            end_time = %end_time,
            from_heartbeat,
            "Closed orphaned session"
        );
        Ok(Some(closed))
    }
}
