//! The RPC facade: the public surface that ties the correlation manager,
//! session manager, sender, and receiver into one request/response and
//! streaming client (§4.7).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

// Layer 3: Internal module imports
use crate::broker::Broker;
use crate::config::ClientConfig;
use crate::correlation::{AsyncResponse, CorrelationManager, StreamHandler};
use crate::error::RpcError;
use crate::ids::{SenderId, SessionId};
use crate::message::RpcResponse;
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::receiver::MessageReceiver;
use crate::sender::MessageSender;
use crate::session::{SessionManager, SessionView};

const STATE_NOT_STARTED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Resources that only exist while the client is running, assembled by
/// [`RpcClient::start`] in the order metrics → correlation → session →
/// receiver → sender, and torn down by [`RpcClient::close`] in reverse.
enum RuntimeState<B: Broker> {
    NotStarted,
    Running {
        sender: MessageSender<B>,
        receiver: MessageReceiver,
        reaper: JoinHandle<()>,
        metrics_log: Option<JoinHandle<()>>,
    },
    Closed,
}

struct Inner<B: Broker> {
    config: ClientConfig,
    broker: Arc<B>,
    sender_id: SenderId,
    metrics: MetricsRegistry,
    correlation: CorrelationManager,
    sessions: SessionManager,
    /// Aggregate-response receivers parked between `streamStart` and
    /// `streamEnd`; keyed by session id since the correlation manager does
    /// not hand the receiver back to its caller (§9: no cyclic ownership —
    /// this table belongs to the facade, not to either manager).
    stream_waiters: DashMap<SessionId, oneshot::Receiver<Result<RpcResponse, RpcError>>>,
    runtime: Mutex<RuntimeState<B>>,
    state: AtomicU8,
}

/// Public entry point: layers request/response and streaming semantics on
/// top of a [`Broker`] (§1).
///
/// Cheap to clone: every clone shares the same managers, pipeline, and
/// metrics, mirroring the `Arc<Inner>` pattern used throughout this crate.
pub struct RpcClient<B: Broker> {
    inner: Arc<Inner<B>>,
}

impl<B: Broker> Clone for RpcClient<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Broker + 'static> RpcClient<B> {
    /// Build a client bound to `broker`, generating a fresh sender id.
    /// Does not contact the broker; call [`RpcClient::start`] before
    /// issuing any request.
    pub fn new(config: ClientConfig, broker: Arc<B>) -> Self {
        let metrics = MetricsRegistry::new();
        let correlation = CorrelationManager::new(&config, metrics.clone());
        let sessions = SessionManager::new(&config, metrics.clone());
        Self {
            inner: Arc::new(Inner {
                sender_id: SenderId::new(),
                correlation,
                sessions,
                metrics,
                stream_waiters: DashMap::new(),
                runtime: Mutex::new(RuntimeState::NotStarted),
                state: AtomicU8::new(STATE_NOT_STARTED),
                config,
                broker,
            }),
        }
    }

    /// This client's sender id, also the suffix of its private response
    /// topic.
    pub fn sender_id(&self) -> SenderId {
        self.inner.sender_id
    }

    /// A point-in-time read of this client's metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// A read-only view of a streaming session, for diagnostics and tests.
    pub fn session_view(&self, session_id: SessionId) -> Option<SessionView> {
        self.inner.sessions.get(session_id)
    }

    /// Assert the response topic and the shared request topic exist,
    /// subscribe the receiver, and start the periodic reaper and metrics
    /// tasks. Idempotent after a first success (§8 R3); fails with
    /// [`RpcError::AlreadyStarted`] if called after [`RpcClient::close`] —
    /// a client instance is not restartable (§9 open question: no
    /// process-wide statics survive across lifecycles, so neither does a
    /// single client instance).
    pub async fn start(&self) -> Result<(), RpcError> {
        let mut runtime = self.inner.runtime.lock().await;
        match &*runtime {
            RuntimeState::Running { .. } => return Ok(()),
            RuntimeState::Closed => return Err(RpcError::AlreadyStarted),
            RuntimeState::NotStarted => {}
        }

        if !self.inner.broker.topic_exists(&self.inner.config.request_topic).await? {
            self.inner
                .broker
                .create_topic(
                    &self.inner.config.request_topic,
                    self.inner.config.consume_threads_max,
                    self.inner.config.consume_threads_max,
                )
                .await?;
        }

        let receiver = MessageReceiver::start(
            self.inner.broker.as_ref(),
            &self.inner.config,
            self.inner.sender_id,
            self.inner.correlation.clone(),
        )
        .await?;

        let sender = MessageSender::new(
            Arc::clone(&self.inner.broker),
            self.inner.sessions.clone(),
            self.inner.metrics.clone(),
            &self.inner.config,
            self.inner.sender_id,
        );

        let reaper = self.spawn_reaper();
        let metrics_log = self.inner.config.metrics_log_enabled.then(|| self.spawn_metrics_log());

        *runtime = RuntimeState::Running {
            sender,
            receiver,
            reaper,
            metrics_log,
        };
        self.inner.state.store(STATE_RUNNING, Ordering::Release);
        info!(sender_id = %self.inner.sender_id, "rpc client started");
        Ok(())
    }

    /// Stop accepting new sends, unsubscribe the receiver, deactivate every
    /// session (notifying attached handlers), cancel every pending
    /// operation, and emit a final metrics summary — in that order (§4.7).
    /// Idempotent (§8 R2).
    pub async fn close(&self) -> Result<(), RpcError> {
        let mut runtime = self.inner.runtime.lock().await;

        let running = {
            let current = &mut *runtime;
            if matches!(current, RuntimeState::Running { .. }) {
                Some(std::mem::replace(current, RuntimeState::Closed))
            } else {
                *current = RuntimeState::Closed;
                None
            }
        };

        let Some(RuntimeState::Running {
            sender,
            receiver,
            reaper,
            metrics_log,
        }) = running
        else {
            self.inner.state.store(STATE_CLOSED, Ordering::Release);
            return Ok(());
        };

        drop(sender);
        reaper.abort();
        if let Some(task) = metrics_log {
            task.abort();
        }
        receiver.stop().await;

        for session_id in self.inner.sessions.deactivate_all() {
            self.inner
                .correlation
                .fail(session_id.as_correlation_id(), RpcError::client_closing())
                .await;
        }
        self.inner.correlation.cancel_all("ClientClosing");

        self.inner.state.store(STATE_CLOSED, Ordering::Release);
        self.inner.metrics.log_summary();
        info!("rpc client closed");
        Ok(())
    }

    fn spawn_reaper(&self) -> JoinHandle<()> {
        let sessions = self.inner.sessions.clone();
        let correlation = self.inner.correlation.clone();
        let sweep_interval = Duration::from_millis(self.inner.config.session_reap_interval_ms);
        let idle_threshold = Duration::from_millis(self.inner.config.idle_session_timeout_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                for session_id in sessions.reap(idle_threshold) {
                    correlation
                        .fail(session_id.as_correlation_id(), RpcError::Timeout(session_id.as_correlation_id()))
                        .await;
                }
            }
        })
    }

    fn spawn_metrics_log(&self) -> JoinHandle<()> {
        let metrics = self.inner.metrics.clone();
        let interval = Duration::from_secs(self.inner.config.metrics_log_interval_sec);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                metrics.log_summary();
            }
        })
    }

    fn require_started(&self) -> Result<(), RpcError> {
        if self.inner.state.load(Ordering::Acquire) == STATE_RUNNING {
            Ok(())
        } else {
            Err(RpcError::NotStarted)
        }
    }

    async fn sender(&self) -> Result<MessageSender<B>, RpcError> {
        let runtime = self.inner.runtime.lock().await;
        match &*runtime {
            RuntimeState::Running { sender, .. } => Ok(sender.clone()),
            _ => Err(RpcError::NotStarted),
        }
    }

    fn validate_payload(&self, payload: &[u8]) -> Result<(), RpcError> {
        if payload.is_empty() {
            return Err(RpcError::InvalidArgument("payload must not be empty".to_string()));
        }
        Ok(())
    }

    fn resolve_timeout(&self, timeout_ms: u64) -> Result<Duration, RpcError> {
        let ms = if timeout_ms == 0 {
            self.inner.config.default_timeout_ms
        } else {
            timeout_ms
        };
        if !(1..=300_000).contains(&ms) {
            return Err(RpcError::InvalidArgument(format!(
                "timeout_ms must be between 1 and 300000, got {ms}"
            )));
        }
        Ok(Duration::from_millis(ms))
    }

    /// Send `payload` and block until a response arrives or `timeout_ms`
    /// elapses (`0` uses `default-timeout-ms`).
    pub async fn send_sync(&self, payload: Vec<u8>, timeout_ms: u64) -> Result<RpcResponse, RpcError> {
        self.require_started()?;
        self.validate_payload(&payload)?;
        let timeout = self.resolve_timeout(timeout_ms)?;
        let sender = self.sender().await?;

        let (id, rx) = self.inner.correlation.register_sync(timeout)?;
        if let Err(err) = sender.send_request(id, payload).await {
            self.inner.correlation.cancel(id);
            return Err(err);
        }

        rx.await
            .unwrap_or_else(|_| Err(RpcError::Internal("pending operation dropped without completion".to_string())))
    }

    /// Send `payload` and return immediately with a cancellable future
    /// (`0` uses `default-timeout-ms`). Structural errors (empty payload,
    /// out-of-range timeout, capacity exceeded) fail synchronously; a
    /// broker send failure after registration instead fails the returned
    /// future (§9 open question).
    pub async fn send_async(&self, payload: Vec<u8>, timeout_ms: u64) -> Result<AsyncResponse, RpcError> {
        self.require_started()?;
        self.validate_payload(&payload)?;
        let timeout = self.resolve_timeout(timeout_ms)?;
        let sender = self.sender().await?;

        let future = self.inner.correlation.register_async(timeout)?;
        let id = future.correlation_id();
        let correlation = self.inner.correlation.clone();
        tokio::spawn(async move {
            if let Err(err) = sender.send_request(id, payload).await {
                correlation.fail(id, err).await;
            }
        });
        Ok(future)
    }

    /// Create a streaming session and register its aggregate final-response
    /// waiter. Purely local: no message is sent (`0` uses
    /// `default-timeout-ms` for the aggregate wait bound).
    pub fn stream_start(&self, timeout_ms: u64) -> Result<SessionId, RpcError> {
        self.require_started()?;
        let timeout = self.resolve_timeout(timeout_ms)?;
        let session_id = self.inner.sessions.create()?;
        let rx = self.inner.correlation.register_streaming(session_id, timeout)?;
        self.inner.stream_waiters.insert(session_id, rx);
        Ok(session_id)
    }

    /// Send one streaming mid-message on `session_id`'s routing key (§4.7).
    pub async fn stream_send(&self, session_id: SessionId, payload: Vec<u8>) -> Result<(), RpcError> {
        self.require_started()?;
        self.validate_payload(&payload)?;
        let sender = self.sender().await?;
        sender.send_stream_message(session_id, payload).await
    }

    /// Send the end-of-stream marker, deactivate the session, and block
    /// until the aggregate final response arrives.
    ///
    /// `timeout_ms` (not the deadline `streamStart` registered) bounds
    /// this wait: the aggregate waiter's own scheduled timeout fires on
    /// `streamStart`'s timeout, so a shorter `streamEnd` deadline is
    /// enforced here directly and the waiter is expired early if it
    /// elapses first (§4.7).
    pub async fn stream_end(&self, session_id: SessionId, timeout_ms: u64) -> Result<RpcResponse, RpcError> {
        self.require_started()?;
        let timeout = self.resolve_timeout(timeout_ms)?;
        let sender = self.sender().await?;

        self.inner.sessions.require_active(session_id)?;
        sender.send_stream_end(session_id).await?;
        self.inner.sessions.deactivate(session_id)?;

        let Some((_, rx)) = self.inner.stream_waiters.remove(&session_id) else {
            return Err(RpcError::SessionNotFound(session_id));
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::Internal(
                "pending operation dropped without completion".to_string(),
            )),
            Err(_elapsed) => {
                let correlation_id = session_id.as_correlation_id();
                // The aggregate entry may still be live (its own deadline,
                // registered back at `streamStart`, hasn't fired yet):
                // expire it now against `streamEnd`'s own deadline instead.
                self.inner.correlation.fire_timeout(correlation_id);
                Err(RpcError::Timeout(correlation_id))
            }
        }
    }

    /// Attach `handler` to `session_id`'s streaming waiter and send one
    /// mid-message; every incremental response reaches `handler.on_response`
    /// until the final response resolves the aggregate waiter awaited by
    /// [`RpcClient::stream_end`] (§4.7 `bidiSend`).
    pub async fn bidi_send(
        &self,
        session_id: SessionId,
        payload: Vec<u8>,
        handler: Arc<dyn StreamHandler>,
    ) -> Result<(), RpcError> {
        self.require_started()?;
        self.validate_payload(&payload)?;
        let sender = self.sender().await?;
        self.inner.correlation.attach_handler(session_id, handler);
        sender.send_stream_message(session_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::correlation::tests_support::recording_handler;
    use crate::message::{Metadata, RpcMessage};

    fn config() -> ClientConfig {
        ClientConfig::builder().session_reaping(1_000, 50).build().unwrap()
    }

    async fn started_client() -> RpcClient<InMemoryBroker> {
        let broker = Arc::new(InMemoryBroker::new());
        let client = RpcClient::new(config(), broker);
        client.start().await.unwrap();
        client
    }

    fn spawn_echo_responder(client: &RpcClient<InMemoryBroker>, broker: Arc<InMemoryBroker>) {
        let response_topic = client.inner.config.response_topic_for(client.sender_id());
        let request_topic = client.inner.config.request_topic.clone();
        tokio::spawn(async move {
            let handler: crate::broker::MessageHandler = {
                let broker = Arc::clone(&broker);
                Arc::new(move |msg: RpcMessage| {
                    let broker = Arc::clone(&broker);
                    let response_topic = response_topic.clone();
                    tokio::spawn(async move {
                        let metadata = Metadata::response(msg.metadata().unwrap().correlation_id, true);
                        let _ = broker
                            .publish(&response_topic, msg.payload, metadata.to_properties(), "any")
                            .await;
                    });
                })
            };
            let _subscription = broker.subscribe(&request_topic, 1, 1, handler).await.unwrap();
            std::future::pending::<()>().await;
        });
    }

    #[tokio::test]
    async fn calling_operations_before_start_fails_not_started() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = RpcClient::new(config(), broker);
        let err = client.send_sync(b"hi".to_vec(), 1_000).await.unwrap_err();
        assert!(matches!(err, RpcError::NotStarted));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let client = started_client().await;
        client.start().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let client = started_client().await;
        client.close().await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn restarting_after_close_fails() {
        let client = started_client().await;
        client.close().await.unwrap();
        assert!(matches!(client.start().await, Err(RpcError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn sync_echo_round_trips_through_the_broker() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = RpcClient::new(config(), Arc::clone(&broker));
        broker.create_topic(&client.inner.config.request_topic, 4, 4).await.unwrap();
        client.start().await.unwrap();
        spawn_echo_responder(&client, broker);

        let response = client.send_sync(b"ping".to_vec(), 2_000).await.unwrap();
        assert!(response.success);
        assert_eq!(response.payload, b"ping");
        assert_eq!(client.metrics_snapshot().successful_requests, 1);
    }

    #[tokio::test]
    async fn async_send_with_no_responder_times_out() {
        let client = started_client().await;
        let future = client.send_async(b"x".to_vec(), 100).await.unwrap();
        let result = future.await;
        assert!(matches!(result, Err(RpcError::Timeout(_))));
        assert_eq!(client.metrics_snapshot().timed_out_requests, 1);
    }

    #[tokio::test]
    async fn streaming_session_closes_on_stream_end() {
        let broker = Arc::new(InMemoryBroker::new());
        let client = RpcClient::new(config(), Arc::clone(&broker));
        broker.create_topic(&client.inner.config.request_topic, 4, 4).await.unwrap();
        client.start().await.unwrap();

        let response_topic = client.inner.config.response_topic_for(client.sender_id());
        let request_topic = client.inner.config.request_topic.clone();
        let broker_for_responder = Arc::clone(&broker);
        tokio::spawn(async move {
            let seen = Arc::new(parking_lot::Mutex::new(Vec::<Vec<u8>>::new()));
            let sink = Arc::clone(&seen);
            let handler: crate::broker::MessageHandler = {
                let broker = Arc::clone(&broker_for_responder);
                Arc::new(move |msg: RpcMessage| {
                    let metadata = msg.metadata().unwrap();
                    if metadata.stream_end {
                        let collected: Vec<u8> = sink.lock().concat();
                        let broker = Arc::clone(&broker);
                        let response_topic = response_topic.clone();
                        let final_metadata = Metadata::response(metadata.correlation_id, true).with_stream_final();
                        tokio::spawn(async move {
                            let _ = broker
                                .publish(&response_topic, collected, final_metadata.to_properties(), "any")
                                .await;
                        });
                    } else {
                        sink.lock().push(msg.payload);
                    }
                })
            };
            let _subscription = broker_for_responder
                .subscribe(&request_topic, 1, 1, handler)
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        let session = client.stream_start(5_000).unwrap();
        client.stream_send(session, b"a".to_vec()).await.unwrap();
        client.stream_send(session, b"b".to_vec()).await.unwrap();
        client.stream_send(session, b"c".to_vec()).await.unwrap();
        let response = client.stream_end(session, 5_000).await.unwrap();

        assert_eq!(response.payload, b"abc");
        assert!(!client.session_view(session).unwrap().active);
        assert_eq!(client.metrics_snapshot().completed_sessions, 1);
    }

    #[tokio::test]
    async fn bidi_send_delivers_incremental_responses_to_the_handler() {
        let client = started_client().await;
        let handler = recording_handler();
        let session = client.stream_start(5_000).unwrap();

        client
            .bidi_send(session, b"q1".to_vec(), handler.clone())
            .await
            .unwrap();

        let incremental = Metadata::response(session.as_correlation_id(), true);
        let message = RpcMessage::new(
            client.inner.config.response_topic_for(client.sender_id()),
            b"partial".to_vec(),
            &incremental,
        );
        client.inner.correlation.deliver_response(message).await;

        assert_eq!(handler.responses.lock().len(), 1);
    }

    #[tokio::test]
    async fn capacity_exceeded_rejects_the_third_outstanding_async_send() {
        let config = ClientConfig::builder()
            .max_concurrent_requests(2)
            .build()
            .unwrap();
        let broker = Arc::new(InMemoryBroker::new());
        let client = RpcClient::new(config, Arc::clone(&broker));
        broker.create_topic(&client.inner.config.request_topic, 4, 4).await.unwrap();
        client.start().await.unwrap();

        let _first = client.send_async(b"a".to_vec(), 5_000).await.unwrap();
        let _second = client.send_async(b"b".to_vec(), 5_000).await.unwrap();
        let third = client.send_async(b"c".to_vec(), 5_000).await;
        assert!(matches!(third, Err(RpcError::CapacityExceeded { .. })));
    }

    #[tokio::test]
    async fn stream_end_honors_its_own_timeout_not_stream_starts() {
        let client = started_client().await;
        // `stream_start(0)` uses `default_timeout_ms` (30s); with no
        // responder subscribed, `stream_end`'s own short deadline must
        // still bound the wait rather than the 30s one.
        let session = client.stream_start(0).unwrap();

        let started = tokio::time::Instant::now();
        let result = client.stream_end(session, 100).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(RpcError::Timeout(_))));
        assert!(
            elapsed < std::time::Duration::from_secs(5),
            "stream_end should not wait out stream_start's default timeout, took {elapsed:?}"
        );
        assert_eq!(client.metrics_snapshot().timed_out_requests, 1);
    }
}
