//! Generic broker trait the core consumes. A real binding to an external
//! broker implements this; the crate ships [`super::InMemoryBroker`] for
//! tests and demos (§10.4).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::error::BrokerError;
use crate::message::RpcMessage;

/// Per-topic handler invoked for every message the broker delivers from a
/// subscription. Implementations must be cheap to clone (they are shared
/// across the worker pool) and must not block.
pub type MessageHandler = std::sync::Arc<dyn Fn(RpcMessage) + Send + Sync>;

/// Handle returned by [`Broker::subscribe`]; dropping or calling
/// [`Subscription::unsubscribe`] tears the subscription down.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Tear down the subscription and wait for any in-flight handler
    /// dispatches to finish (§4.6 close ordering).
    async fn unsubscribe(self: Box<Self>);
}

/// The pub/sub contract the core consumes (§6).
///
/// The broker only understands opaque bytes, string user-properties, and
/// a queue selector's routing key — it has no notion of correlation,
/// request/response, or streams. Everything above that is synthesized by
/// the rest of this crate.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish `payload` to `topic` with the given string user-properties,
    /// choosing a destination queue via `routing_key` (same routing key ⇒
    /// same queue, for a stable queue count). Retries up to the broker's
    /// configured cap before failing with [`BrokerError::PublishFailed`];
    /// exceeding `send-timeout-ms` fails with [`BrokerError::SendTimeout`].
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        properties: HashMap<String, String>,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Subscribe to `topic`, delivering every message at-least-once and in
    /// per-queue FIFO order to `handler`, via a worker pool sized between
    /// `min_workers` and `max_workers`.
    async fn subscribe(
        &self,
        topic: &str,
        min_workers: usize,
        max_workers: usize,
        handler: MessageHandler,
    ) -> Result<Box<dyn Subscription>, BrokerError>;

    /// `true` if `topic` already exists.
    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError>;

    /// Create `topic` with the given read/write queue counts. Used once at
    /// startup to assert the response topic exists (§6).
    async fn create_topic(
        &self,
        topic: &str,
        read_queues: usize,
        write_queues: usize,
    ) -> Result<(), BrokerError>;
}
