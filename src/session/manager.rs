//! Session lifecycle and routing-key custody for streaming sessions (§4.4).

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::debug;

// Layer 3: Internal module imports
use super::record::{SessionRecord, SessionView};
use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::ids::SessionId;
use crate::metrics::MetricsRegistry;

/// Maps *session-id → session record* and enforces
/// `max-concurrent-sessions` via a bounded semaphore (§4.4, I4).
///
/// Cheap to clone: every clone shares the same table, capacity semaphore,
/// and metrics registry.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: DashMap<SessionId, SessionRecord>,
    capacity: Arc<Semaphore>,
    max_concurrent_sessions: usize,
    metrics: MetricsRegistry,
}

impl SessionManager {
    /// Construct a manager with its capacity bound taken from `config`.
    pub fn new(config: &ClientConfig, metrics: MetricsRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                capacity: Arc::new(Semaphore::new(config.max_concurrent_sessions)),
                max_concurrent_sessions: config.max_concurrent_sessions,
                metrics,
            }),
        }
    }

    /// Number of live session records (active or already closed but not
    /// yet reaped), for `CapacityExceeded` diagnostics and tests.
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    /// `true` iff no session record is currently live.
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Create a new active session. Fails with
    /// [`RpcError::CapacityExceeded`] if the live count is already at
    /// `max-concurrent-sessions` (§4.4 `create`).
    pub fn create(&self) -> Result<SessionId, RpcError> {
        let permit = Arc::clone(&self.inner.capacity)
            .try_acquire_owned()
            .map_err(|_| RpcError::CapacityExceeded {
                current: self.len(),
                max: self.inner.max_concurrent_sessions,
            })?;
        let session_id = SessionId::new();
        self.inner
            .sessions
            .insert(session_id, SessionRecord::new(session_id, permit));
        self.inner.metrics.record_session_created();
        debug!(session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// A read-only snapshot of `session_id`'s record, or `None` if it was
    /// never created or has already been reaped from the table.
    pub fn get(&self, session_id: SessionId) -> Option<SessionView> {
        self.inner.sessions.get(&session_id).map(|r| r.view())
    }

    /// Look up `session_id`, distinguishing an unknown id from a known but
    /// closed one — the distinction the RPC facade surfaces as
    /// [`RpcError::SessionNotFound`] vs. [`RpcError::SessionClosed`].
    pub fn require_active(&self, session_id: SessionId) -> Result<SessionView, RpcError> {
        match self.get(session_id) {
            None => Err(RpcError::SessionNotFound(session_id)),
            Some(view) if !view.active => Err(RpcError::SessionClosed(session_id)),
            Some(view) => Ok(view),
        }
    }

    /// Record a `streamSend`/`bidiSend` call: bumps the message count and
    /// activity timestamp. Serialized per-session by `DashMap`'s shard
    /// locking, satisfying the same-queue/count consistency guarantee of
    /// §4.4.
    pub fn record_activity(&self, session_id: SessionId) -> Result<(), RpcError> {
        match self.inner.sessions.get_mut(&session_id) {
            None => Err(RpcError::SessionNotFound(session_id)),
            Some(mut record) if !record.active => Err(RpcError::SessionClosed(session_id)),
            Some(mut record) => {
                record.message_count += 1;
                record.last_activity_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Transition `session_id` from active to closed (§4.4 `deactivate`).
    ///
    /// Idempotent: whoever flips the flag first owns the teardown side
    /// effect (the metrics decrement and releasing the capacity permit); a
    /// second caller (a racing `deactivate`/`reap`) observes the session
    /// already closed and is a no-op, matching the "no resurrection" state
    /// machine (I3). Releasing the permit here — not just at
    /// `deactivate_all`'s table sweep on `close()` — is what keeps a
    /// closed-but-not-yet-reaped session from continuing to count against
    /// `max-concurrent-sessions` (I4).
    pub fn deactivate(&self, session_id: SessionId) -> Result<(), RpcError> {
        match self.inner.sessions.get_mut(&session_id) {
            None => Err(RpcError::SessionNotFound(session_id)),
            Some(mut record) => {
                if record.active {
                    record.active = false;
                    record.release_permit();
                    self.inner.metrics.record_session_closed();
                    debug!(session_id = %session_id, "session deactivated");
                }
                Ok(())
            }
        }
    }

    /// Sweep every active session idle for at least `idle_threshold` and
    /// deactivate it, returning the ids this sweep actually closed (§4.4
    /// `reap`). Notifying any attached streaming handler and removing the
    /// corresponding correlation entry is the caller's responsibility
    /// (§9: the session manager holds no back-reference to the
    /// correlation manager).
    pub fn reap(&self, idle_threshold: Duration) -> Vec<SessionId> {
        let now = Utc::now();
        let mut closed = Vec::new();
        for mut entry in self.inner.sessions.iter_mut() {
            let record = entry.value_mut();
            if !record.active {
                continue;
            }
            let idle_for = (now - record.last_activity_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if idle_for >= idle_threshold {
                record.active = false;
                record.release_permit();
                self.inner.metrics.record_session_closed();
                closed.push(record.session_id);
            }
        }
        if !closed.is_empty() {
            debug!(count = closed.len(), "session reaper closed idle sessions");
        }
        closed
    }

    /// Drop every session record, regardless of state (`close()`'s
    /// deactivate-all, §4.7). Returns the ids that were still active, so
    /// the caller can notify their streaming handlers.
    pub fn deactivate_all(&self) -> Vec<SessionId> {
        let mut active_ids = Vec::new();
        self.inner.sessions.retain(|_, record| {
            if record.active {
                active_ids.push(record.session_id);
            }
            false
        });
        active_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(&ClientConfig::default(), MetricsRegistry::new())
    }

    #[test]
    fn create_starts_active_with_zero_messages() {
        let manager = manager();
        let id = manager.create().unwrap();
        let view = manager.get(id).unwrap();
        assert!(view.active);
        assert_eq!(view.message_count, 0);
    }

    #[test]
    fn capacity_exceeded_once_the_cap_is_reached() {
        let config = ClientConfig::builder().max_concurrent_sessions(1).build().unwrap();
        let manager = SessionManager::new(&config, MetricsRegistry::new());
        manager.create().unwrap();
        assert!(matches!(manager.create(), Err(RpcError::CapacityExceeded { .. })));
    }

    #[test]
    fn deactivating_a_session_frees_its_capacity_permit() {
        let config = ClientConfig::builder().max_concurrent_sessions(1).build().unwrap();
        let manager = SessionManager::new(&config, MetricsRegistry::new());
        let first = manager.create().unwrap();
        assert!(matches!(manager.create(), Err(RpcError::CapacityExceeded { .. })));

        manager.deactivate(first).unwrap();

        // The closed session's record is still in the table (so
        // `SessionClosed` vs `SessionNotFound` stays distinguishable), but
        // its permit is released, so a new session can be created.
        let second = manager.create();
        assert!(second.is_ok(), "closed sessions must not hold onto capacity");
    }

    #[test]
    fn reaping_an_idle_session_frees_its_capacity_permit() {
        let config = ClientConfig::builder().max_concurrent_sessions(1).build().unwrap();
        let manager = SessionManager::new(&config, MetricsRegistry::new());
        manager.create().unwrap();

        let closed = manager.reap(Duration::ZERO);
        assert_eq!(closed.len(), 1);

        assert!(manager.create().is_ok(), "reaped sessions must not hold onto capacity");
    }

    #[test]
    fn record_activity_increments_the_message_count() {
        let manager = manager();
        let id = manager.create().unwrap();
        manager.record_activity(id).unwrap();
        manager.record_activity(id).unwrap();
        assert_eq!(manager.get(id).unwrap().message_count, 2);
    }

    #[test]
    fn record_activity_on_unknown_session_fails_not_found() {
        let manager = manager();
        let unknown = SessionId::new();
        assert!(matches!(
            manager.record_activity(unknown),
            Err(RpcError::SessionNotFound(_))
        ));
    }

    #[test]
    fn deactivate_is_idempotent() {
        let manager = manager();
        let id = manager.create().unwrap();
        manager.deactivate(id).unwrap();
        manager.deactivate(id).unwrap();
        assert!(!manager.get(id).unwrap().active);
    }

    #[test]
    fn closed_session_rejects_further_activity() {
        let manager = manager();
        let id = manager.create().unwrap();
        manager.deactivate(id).unwrap();
        assert!(matches!(
            manager.record_activity(id),
            Err(RpcError::SessionClosed(_))
        ));
    }

    #[test]
    fn reap_at_zero_threshold_closes_every_untouched_session() {
        let manager = manager();
        let id = manager.create().unwrap();
        let closed = manager.reap(Duration::ZERO);
        assert_eq!(closed, vec![id]);
        assert!(!manager.get(id).unwrap().active);
    }

    #[test]
    fn reap_leaves_recently_active_sessions_alone() {
        let manager = manager();
        let id = manager.create().unwrap();
        manager.record_activity(id).unwrap();
        let closed = manager.reap(Duration::from_secs(3600));
        assert!(closed.is_empty());
        assert!(manager.get(id).unwrap().active);
    }

    #[test]
    fn deactivate_all_clears_the_table_and_reports_active_ids() {
        let manager = manager();
        let active = manager.create().unwrap();
        let already_closed = manager.create().unwrap();
        manager.deactivate(already_closed).unwrap();

        let active_ids = manager.deactivate_all();
        assert_eq!(active_ids, vec![active]);
        assert!(manager.is_empty());
    }
}
