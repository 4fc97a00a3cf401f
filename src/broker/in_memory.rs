//! Partitioned, FIFO-per-queue, at-least-once in-process broker (§10.4).
//!
//! Mirrors the source ecosystem's own `InMemoryMessageBroker`: a fully
//! working default implementation that exists so the rest of the crate,
//! and anyone evaluating it, never needs a real broker connection to run.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

// Layer 3: Internal module imports
use super::selector::{stable_hash_selector, QueueSelector};
use super::traits::{Broker, MessageHandler, Subscription};
use crate::error::BrokerError;
use crate::message::RpcMessage;

struct Queue {
    sender: mpsc::UnboundedSender<RpcMessage>,
    receiver: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<RpcMessage>>>,
}

struct Topic {
    queues: Vec<Queue>,
}

impl Topic {
    fn new(queue_count: usize) -> Self {
        let queues = (0..queue_count.max(1))
            .map(|_| {
                let (sender, receiver) = mpsc::unbounded_channel();
                Queue {
                    sender,
                    receiver: parking_lot::Mutex::new(Some(receiver)),
                }
            })
            .collect();
        Self { queues }
    }
}

/// In-process implementation of [`Broker`], backed by per-queue unbounded
/// channels.
///
/// One `tokio` task is dedicated to each queue on subscribe, so per-queue
/// FIFO delivery holds regardless of the requested worker bounds; the
/// `min_workers`/`max_workers` arguments are accepted for interface
/// parity with a real broker binding but do not change this broker's
/// ordering guarantees.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    topics: DashMap<String, Arc<Topic>>,
    selector: QueueSelector,
}

struct InMemorySubscription {
    handles: Vec<JoinHandle<()>>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn unsubscribe(self: Box<Self>) {
        for handle in self.handles {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl InMemoryBroker {
    /// Construct a broker with the default stable-hash queue selector.
    pub fn new() -> Self {
        Self::with_selector(stable_hash_selector())
    }

    /// Construct a broker with a custom queue selector, for tests that
    /// want to control routing directly.
    pub fn with_selector(selector: QueueSelector) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                selector,
            }),
        }
    }

    fn queue_count(&self, topic: &str) -> Option<usize> {
        self.inner.topics.get(topic).map(|t| t.queues.len())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        properties: HashMap<String, String>,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let Some(entry) = self.inner.topics.get(topic) else {
            return Err(BrokerError::TopicNotFound(topic.to_string()));
        };
        let queue_count = entry.queues.len();
        let index = (self.inner.selector)(topic, &payload, routing_key, queue_count);
        let message = RpcMessage::from_properties(topic, payload, properties);

        debug!(topic, routing_key, queue = index, "publishing message");

        entry.queues[index]
            .sender
            .send(message)
            .map_err(|e| BrokerError::publish_failed(topic, 1, SendError(e.to_string())))
    }

    async fn subscribe(
        &self,
        topic: &str,
        min_workers: usize,
        max_workers: usize,
        handler: MessageHandler,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        let Some(entry) = self.inner.topics.get(topic) else {
            return Err(BrokerError::SubscribeFailed(
                topic.to_string(),
                "topic does not exist".to_string(),
            ));
        };

        debug!(
            topic,
            queues = entry.queues.len(),
            min_workers,
            max_workers,
            "subscribing"
        );

        let mut handles = Vec::with_capacity(entry.queues.len());
        for queue in &entry.queues {
            let mut receiver = queue
                .receiver
                .lock()
                .take()
                .ok_or_else(|| {
                    BrokerError::SubscribeFailed(
                        topic.to_string(),
                        "topic already has a subscriber".to_string(),
                    )
                })?;
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move {
                while let Some(message) = receiver.recv().await {
                    handler(message);
                }
            }));
        }

        Ok(Box::new(InMemorySubscription { handles }))
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool, BrokerError> {
        Ok(self.inner.topics.contains_key(topic))
    }

    async fn create_topic(
        &self,
        topic: &str,
        read_queues: usize,
        write_queues: usize,
    ) -> Result<(), BrokerError> {
        if self.inner.topics.contains_key(topic) {
            return Ok(());
        }
        let queue_count = read_queues.max(write_queues).max(1);
        self.inner
            .topics
            .insert(topic.to_string(), Arc::new(Topic::new(queue_count)));
        Ok(())
    }
}

#[derive(Debug)]
struct SendError(String);

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SendError {}
