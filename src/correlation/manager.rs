//! The correlation manager: maps outgoing request ids to pending waiters,
//! enforces timeouts, and cancels cleanly (§4.3). The keystone of the core.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::future::AsyncResponse;
use super::handler::StreamHandler;
use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::ids::{CorrelationId, SessionId};
use crate::message::{Metadata, RpcMessage, RpcResponse};
use crate::metrics::MetricsRegistry;

type Completion = oneshot::Sender<Result<RpcResponse, RpcError>>;

/// The tagged variant a pending operation can be (§9: the other seam,
/// besides [`StreamHandler`], where this crate uses dynamic dispatch-free
/// polymorphism — this is a closed enum, not a trait object).
enum PendingOperation {
    /// A `sendSync` call blocked on its own oneshot receiver.
    SyncWaiter(Completion),
    /// A `sendAsync` call; resolved through the same channel shape as
    /// `SyncWaiter`, but the caller never blocks to receive it (§4.7).
    AsyncFuture(Completion),
    /// A streaming session's aggregate final-response waiter, with an
    /// optional per-message handler for `bidiSend` incremental delivery.
    StreamingWaiter {
        aggregate: Completion,
        handler: Option<Arc<dyn StreamHandler>>,
    },
}

impl PendingOperation {
    fn complete(self, result: Result<RpcResponse, RpcError>) {
        match self {
            PendingOperation::SyncWaiter(tx) | PendingOperation::AsyncFuture(tx) => {
                let _ = tx.send(result);
            }
            PendingOperation::StreamingWaiter { aggregate, .. } => {
                let _ = aggregate.send(result);
            }
        }
    }
}

struct Entry {
    operation: PendingOperation,
    registered_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    timeout_handle: JoinHandle<()>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Maps *correlation-id → pending operation* and enforces
/// `max-concurrent-requests` via a bounded semaphore (§4.3, I4).
///
/// Cheap to clone: every clone shares the same table, capacity semaphore,
/// and metrics registry.
#[derive(Clone)]
pub struct CorrelationManager {
    inner: Arc<Inner>,
}

struct Inner {
    entries: DashMap<CorrelationId, Entry>,
    capacity: Arc<Semaphore>,
    max_concurrent_requests: usize,
    metrics: MetricsRegistry,
}

impl CorrelationManager {
    /// Construct a manager with its capacity bound taken from `config`.
    pub fn new(config: &ClientConfig, metrics: MetricsRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                capacity: Arc::new(Semaphore::new(config.max_concurrent_requests)),
                max_concurrent_requests: config.max_concurrent_requests,
                metrics,
            }),
        }
    }

    /// Number of live request records, for `CapacityExceeded` diagnostics
    /// and tests asserting P3/P4.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// `true` iff no request record is currently live.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn try_acquire_permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit, RpcError> {
        Arc::clone(&self.inner.capacity)
            .try_acquire_owned()
            .map_err(|_| RpcError::CapacityExceeded {
                current: self.len(),
                max: self.inner.max_concurrent_requests,
            })
    }

    fn schedule_timeout(&self, id: CorrelationId, timeout: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.fire_timeout(id);
        })
    }

    fn insert(
        &self,
        id: CorrelationId,
        operation: PendingOperation,
        timeout: Duration,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let now = Utc::now();
        let deadline = now + chrono::Duration::milliseconds(timeout.as_millis() as i64);
        let timeout_handle = self.schedule_timeout(id, timeout);
        self.inner.entries.insert(
            id,
            Entry {
                operation,
                registered_at: now,
                deadline,
                timeout_handle,
                _permit: permit,
            },
        );
        self.inner.metrics.record_request_registered();
        debug!(correlation_id = %id, timeout_ms = timeout.as_millis() as u64, "registered pending operation");
    }

    /// Register a `SyncWaiter` for `sendSync`, generating a fresh
    /// correlation id. Fails with [`RpcError::CapacityExceeded`] if the
    /// live count is already at `max-concurrent-requests`.
    pub fn register_sync(
        &self,
        timeout: Duration,
    ) -> Result<(CorrelationId, oneshot::Receiver<Result<RpcResponse, RpcError>>), RpcError> {
        let permit = self.try_acquire_permit()?;
        let id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        self.insert(id, PendingOperation::SyncWaiter(tx), timeout, permit);
        Ok((id, rx))
    }

    /// Register an `AsyncFuture` for `sendAsync`, returning the cancellable
    /// future the caller awaits.
    pub fn register_async(&self, timeout: Duration) -> Result<AsyncResponse, RpcError> {
        let permit = self.try_acquire_permit()?;
        let id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();
        self.insert(id, PendingOperation::AsyncFuture(tx), timeout, permit);
        Ok(AsyncResponse::new(id, self.clone(), rx))
    }

    /// Register a `StreamingWaiter` whose correlation id equals `session_id`
    /// (§3: the session id doubles as the final response's correlation id),
    /// used by `streamStart`.
    pub fn register_streaming(
        &self,
        session_id: SessionId,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Result<RpcResponse, RpcError>>, RpcError> {
        let permit = self.try_acquire_permit()?;
        let id = session_id.as_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.insert(
            id,
            PendingOperation::StreamingWaiter {
                aggregate: tx,
                handler: None,
            },
            timeout,
            permit,
        );
        Ok(rx)
    }

    /// Attach or replace the per-message handler on a streaming waiter
    /// (`bidiSend`'s atomic swap, §4.7). No-op if the entry is not a
    /// `StreamingWaiter` or is no longer live.
    pub fn attach_handler(&self, session_id: SessionId, handler: Arc<dyn StreamHandler>) {
        let id = session_id.as_correlation_id();
        if let Some(mut entry) = self.inner.entries.get_mut(&id) {
            if let PendingOperation::StreamingWaiter { handler: slot, .. } = &mut entry.operation {
                *slot = Some(handler);
            }
        }
    }

    /// Deliver a response message, dispatching it to its matching pending
    /// operation (§4.3 `deliverResponse`).
    ///
    /// For `SyncWaiter`/`AsyncFuture` the entry is removed and completed
    /// unconditionally. For a `StreamingWaiter`, only a *final*
    /// (`streamFinal`) response removes and completes the entry; an
    /// incremental response invokes the handler (if any) and leaves the
    /// entry live. Unknown or already-resolved correlation ids are dropped
    /// and counted as `lateOrUnknown`.
    pub async fn deliver_response(&self, message: RpcMessage) {
        let metadata = match message.metadata() {
            Ok(metadata) => metadata,
            Err(reason) => {
                warn!(reason, "dropping response with malformed metadata");
                return;
            }
        };
        let id = metadata.correlation_id;

        let Some((_, entry)) = self.inner.entries.remove(&id) else {
            self.inner.metrics.record_late_or_unknown();
            warn!(correlation_id = %id, "late or unknown response");
            return;
        };

        let response = RpcResponse::from_metadata(message.payload, &metadata);
        // Bytes-received is a plain throughput counter, not a
        // completion metric, so it is recorded for every delivered
        // response regardless of whether this one is incremental.
        self.inner.metrics.record_bytes_received(response.payload.len() as u64);

        let Entry {
            operation,
            registered_at,
            deadline,
            timeout_handle,
            _permit,
        } = entry;
        // The old timeout task is superseded either way: the entry is
        // about to complete, or it is being reinserted under a freshly
        // scheduled one. Leaving the old task alive would let it fire a
        // second, spurious timeout against the reinserted entry.
        timeout_handle.abort();

        match operation {
            op @ (PendingOperation::SyncWaiter(_) | PendingOperation::AsyncFuture(_)) => {
                self.record_completion_metrics(&response, registered_at);
                op.complete(Ok(response));
            }
            PendingOperation::StreamingWaiter { aggregate, handler } if metadata.stream_final => {
                self.record_completion_metrics(&response, registered_at);
                if let Some(handler) = &handler {
                    handler.on_complete(response.clone()).await;
                }
                let _ = aggregate.send(Ok(response));
            }
            PendingOperation::StreamingWaiter { aggregate, handler } => {
                // Incremental: keep the entry live for the eventual final
                // response, and invoke the per-message handler, but don't
                // count this toward successful/failed completions or
                // latency — §4.2 scopes those to "per successful sync or
                // async completion", i.e. the one completion a request or
                // streaming exchange ever has, not every message along
                // the way.
                if let Some(handler) = &handler {
                    self.inner.metrics.record_streaming_message();
                    handler.on_response(response).await;
                }
                let remaining = (deadline - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_millis(1));
                self.inner.entries.insert(
                    id,
                    Entry {
                        operation: PendingOperation::StreamingWaiter { aggregate, handler },
                        registered_at,
                        deadline,
                        timeout_handle: self.schedule_timeout(id, remaining),
                        _permit,
                    },
                );
            }
        }
    }

    fn record_completion_metrics(&self, response: &RpcResponse, registered_at: DateTime<Utc>) {
        let latency = (Utc::now() - registered_at).to_std().unwrap_or_default();
        if response.success {
            self.inner.metrics.record_success(latency);
        } else {
            self.inner.metrics.record_failure(latency);
        }
    }

    /// Fire the timeout for `id` if its entry is still present (§4.3
    /// `fireTimeout`). Re-checks presence itself, since the scheduled task
    /// may race with `deliver_response`/`cancel` (§5: best-effort
    /// cancellation of the timeout task).
    ///
    /// `pub(crate)` rather than private so `RpcClient::stream_end` can
    /// expire a streaming waiter against its own (re-armed) deadline
    /// instead of the one `register_streaming` scheduled at `streamStart`.
    pub(crate) fn fire_timeout(&self, id: CorrelationId) {
        let Some((_, entry)) = self.inner.entries.remove(&id) else {
            return;
        };
        self.inner.metrics.record_timeout();
        warn!(correlation_id = %id, "request timed out");
        if let PendingOperation::StreamingWaiter { handler, .. } = &entry.operation {
            if let Some(handler) = handler.clone() {
                tokio::spawn(async move {
                    handler.on_error(RpcError::Timeout(id)).await;
                });
            }
        }
        entry.operation.complete(Err(RpcError::Timeout(id)));
    }

    /// Cancel a single pending operation (caller-initiated `sendAsync`
    /// cancellation, or a session's final-response waiter on idle reap).
    /// No-op if the entry is no longer live.
    pub fn cancel(&self, id: CorrelationId) {
        let Some((_, entry)) = self.inner.entries.remove(&id) else {
            return;
        };
        entry.timeout_handle.abort();
        entry
            .operation
            .complete(Err(RpcError::Cancelled("caller cancelled".to_string())));
    }

    /// Fail a single pending operation with a caller-supplied error,
    /// notifying a streaming handler's `on_error` first if one is attached.
    /// Used by session idle-reaping (§4.4 `reap`).
    pub async fn fail(&self, id: CorrelationId, error: RpcError) {
        let Some((_, entry)) = self.inner.entries.remove(&id) else {
            return;
        };
        entry.timeout_handle.abort();
        if let PendingOperation::StreamingWaiter { handler, .. } = &entry.operation {
            if let Some(handler) = handler {
                handler.on_error(error.clone_for_notification()).await;
            }
        }
        entry.operation.complete(Err(error));
    }

    /// Remove and fail every live entry with `reason` (`close()`'s
    /// `cancelAll`, §4.3). After this returns the table is empty and every
    /// scheduled timeout has been cancelled (P4).
    pub fn cancel_all(&self, reason: &str) {
        let ids: Vec<CorrelationId> = self.inner.entries.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.inner.entries.remove(&id) {
                entry.timeout_handle.abort();
                entry
                    .operation
                    .complete(Err(RpcError::Cancelled(reason.to_string())));
            }
        }
    }
}

impl RpcError {
    /// Build a copy of this error suitable for a secondary notification
    /// sink (a streaming handler's `on_error`) without requiring `RpcError`
    /// to implement `Clone` at the public API boundary.
    fn clone_for_notification(&self) -> RpcError {
        match self {
            RpcError::Timeout(id) => RpcError::Timeout(*id),
            RpcError::Cancelled(reason) => RpcError::Cancelled(reason.clone()),
            other => RpcError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::tests_support::recording_handler;
    use std::time::Duration;

    fn manager() -> CorrelationManager {
        CorrelationManager::new(&ClientConfig::default(), MetricsRegistry::new())
    }

    fn response_message(correlation_id: CorrelationId, payload: &str) -> RpcMessage {
        let metadata = Metadata::response(correlation_id, true);
        RpcMessage::new("rpc.responses.x", payload.as_bytes().to_vec(), &metadata)
    }

    #[tokio::test]
    async fn sync_waiter_resolves_on_matching_response() {
        let manager = manager();
        let (id, rx) = manager.register_sync(Duration::from_secs(5)).unwrap();
        manager.deliver_response(response_message(id, "pong")).await;
        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.payload, b"pong");
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn unknown_correlation_id_is_dropped_as_late_or_unknown() {
        let manager = manager();
        manager
            .deliver_response(response_message(CorrelationId::new(), "x"))
            .await;
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn capacity_exceeded_once_the_cap_is_reached() {
        let config = ClientConfig::builder()
            .max_concurrent_requests(1)
            .build()
            .unwrap();
        let manager = CorrelationManager::new(&config, MetricsRegistry::new());
        let (_id, _rx) = manager.register_sync(Duration::from_secs(5)).unwrap();
        let second = manager.register_sync(Duration::from_secs(5));
        assert!(matches!(second, Err(RpcError::CapacityExceeded { .. })));
    }

    #[tokio::test]
    async fn timeout_completes_the_waiter_and_a_later_response_is_late() {
        let manager = manager();
        let (id, rx) = manager.register_sync(Duration::from_millis(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(RpcError::Timeout(_))));

        // A response that arrives after the timeout already fired is late.
        manager.deliver_response(response_message(id, "late")).await;
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn cancelling_an_async_future_resolves_it_with_cancelled() {
        let manager = manager();
        let future = manager.register_async(Duration::from_secs(5)).unwrap();
        let id = future.correlation_id();
        manager.cancel(id);
        let result = future.await;
        assert!(matches!(result, Err(RpcError::Cancelled(_))));
    }

    #[tokio::test]
    async fn cancel_all_drains_every_entry() {
        let manager = manager();
        let (_id_a, _rx_a) = manager.register_sync(Duration::from_secs(5)).unwrap();
        let _future_b = manager.register_async(Duration::from_secs(5)).unwrap();
        assert_eq!(manager.len(), 2);
        manager.cancel_all("ClientClosing");
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn streaming_waiter_keeps_the_entry_alive_across_incremental_responses() {
        let manager = manager();
        let session = SessionId::new();
        let rx = manager
            .register_streaming(session, Duration::from_secs(5))
            .unwrap();
        let handler = recording_handler();
        manager.attach_handler(session, handler.clone());

        let incremental = Metadata::response(session.as_correlation_id(), true);
        let incremental_msg =
            RpcMessage::new("rpc.responses.x", b"one".to_vec(), &incremental);
        manager.deliver_response(incremental_msg).await;
        assert_eq!(manager.len(), 1, "entry stays live until the final response");
        assert_eq!(handler.responses.lock().len(), 1);

        let final_metadata =
            Metadata::response(session.as_correlation_id(), true).with_stream_final();
        let final_msg = RpcMessage::new("rpc.responses.x", b"done".to_vec(), &final_metadata);
        manager.deliver_response(final_msg).await;

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.payload, b"done");
        assert_eq!(manager.len(), 0);
        assert!(handler.completed.lock().is_some());
    }

    #[tokio::test]
    async fn incremental_streaming_responses_do_not_inflate_completion_metrics() {
        let metrics = MetricsRegistry::new();
        let manager = CorrelationManager::new(&ClientConfig::default(), metrics.clone());
        let session = SessionId::new();
        let _rx = manager
            .register_streaming(session, Duration::from_secs(5))
            .unwrap();

        for payload in ["one", "two", "three"] {
            let incremental = Metadata::response(session.as_correlation_id(), true);
            manager
                .deliver_response(RpcMessage::new("rpc.responses.x", payload.as_bytes().to_vec(), &incremental))
                .await;
        }

        // §4.2 scopes `successfulRequests`/latency to the one completion a
        // streaming exchange eventually has, not each incremental message.
        let snap = metrics.snapshot();
        assert_eq!(snap.successful_requests, 0);
        assert_eq!(snap.failed_requests, 0);
        assert_eq!(snap.mean_latency_micros, None);
        assert_eq!(snap.streaming_messages, 3);

        let final_metadata = Metadata::response(session.as_correlation_id(), true).with_stream_final();
        manager
            .deliver_response(RpcMessage::new("rpc.responses.x", b"done".to_vec(), &final_metadata))
            .await;

        let snap = metrics.snapshot();
        assert_eq!(snap.successful_requests, 1);
        assert!(snap.mean_latency_micros.is_some());
    }

    #[tokio::test]
    async fn fail_notifies_the_streaming_handler_before_completing() {
        let manager = manager();
        let session = SessionId::new();
        let rx = manager
            .register_streaming(session, Duration::from_secs(5))
            .unwrap();
        let handler = recording_handler();
        manager.attach_handler(session, handler.clone());

        manager
            .fail(session.as_correlation_id(), RpcError::Timeout(session.as_correlation_id()))
            .await;

        assert!(matches!(rx.await.unwrap(), Err(RpcError::Timeout(_))));
        assert_eq!(handler.errors.lock().len(), 1);
    }
}
