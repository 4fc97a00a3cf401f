//! The session record and the read-only view exposed to collaborators.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tokio::sync::OwnedSemaphorePermit;

// Layer 3: Internal module imports
use crate::ids::SessionId;

/// A streaming session's mutable state (§3).
///
/// Owned exclusively by [`super::SessionManager`]; the sender only ever
/// sees [`SessionView`], a read-only snapshot.
pub(super) struct SessionRecord {
    pub(super) session_id: SessionId,
    pub(super) created_at: DateTime<Utc>,
    pub(super) last_activity_at: DateTime<Utc>,
    pub(super) message_count: u64,
    pub(super) active: bool,
    /// Held while `active`; dropped by [`SessionRecord::release_permit`] on
    /// the active → closed transition so a closed session stops counting
    /// against `max-concurrent-sessions` even though its record (needed to
    /// distinguish `SessionClosed` from `SessionNotFound`) stays in the
    /// table until `deactivate_all` removes it at `close()`.
    permit: Option<OwnedSemaphorePermit>,
}

impl SessionRecord {
    pub(super) fn new(session_id: SessionId, permit: OwnedSemaphorePermit) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            last_activity_at: now,
            message_count: 0,
            active: true,
            permit: Some(permit),
        }
    }

    /// Release this session's capacity permit back to the manager's
    /// semaphore. Called once, on the active → closed transition.
    pub(super) fn release_permit(&mut self) {
        self.permit = None;
    }

    pub(super) fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            message_count: self.message_count,
            active: self.active,
        }
    }
}

/// Read-only snapshot of a [`SessionRecord`], returned by
/// [`super::SessionManager::get`] and used by the sender to obtain the
/// routing key without holding a lock on the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionView {
    /// The session's identifier, also its routing key (§3).
    pub session_id: SessionId,
    /// When `streamStart` created this session.
    pub created_at: DateTime<Utc>,
    /// Updated on every `streamSend`/`bidiSend`.
    pub last_activity_at: DateTime<Utc>,
    /// Number of `streamSend`/`bidiSend` calls recorded so far.
    pub message_count: u64,
    /// `false` once the session has transitioned to `CLOSED` (I3).
    pub active: bool,
}

impl SessionView {
    /// The value fed to the broker's queue selector; stable for the
    /// session's lifetime (§4.4 `routingKeyFor`).
    pub fn routing_key(&self) -> String {
        self.session_id.routing_key()
    }
}
