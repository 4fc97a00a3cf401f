//! Message sender: validates, tags, and publishes outbound requests (§4.5).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::debug;

// Layer 3: Internal module imports
use crate::broker::Broker;
use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::ids::{CorrelationId, SenderId, SessionId};
use crate::message::{Metadata, RpcMessage};
use crate::metrics::MetricsRegistry;
use crate::session::SessionManager;

/// Attaches metadata to outgoing requests, validates their size, and
/// publishes them to the shared request topic (§4.5).
///
/// Holds a borrowed-in-spirit read view of the session table only (via
/// [`SessionManager`]'s cheap clone) — it never mutates session state
/// itself (§9: no cyclic ownership).
pub struct MessageSender<B: Broker> {
    broker: Arc<B>,
    sessions: SessionManager,
    metrics: MetricsRegistry,
    request_topic: String,
    sender_id: SenderId,
    max_message_bytes: usize,
}

impl<B: Broker> Clone for MessageSender<B> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            sessions: self.sessions.clone(),
            metrics: self.metrics.clone(),
            request_topic: self.request_topic.clone(),
            sender_id: self.sender_id,
            max_message_bytes: self.max_message_bytes,
        }
    }
}

impl<B: Broker> MessageSender<B> {
    /// Construct a sender bound to `broker`'s shared request topic.
    pub fn new(
        broker: Arc<B>,
        sessions: SessionManager,
        metrics: MetricsRegistry,
        config: &ClientConfig,
        sender_id: SenderId,
    ) -> Self {
        Self {
            broker,
            sessions,
            metrics,
            request_topic: config.request_topic.clone(),
            sender_id,
            max_message_bytes: config.max_message_bytes,
        }
    }

    fn check_size(&self, payload: &[u8]) -> Result<(), RpcError> {
        if payload.len() > self.max_message_bytes {
            return Err(RpcError::InvalidArgument(format!(
                "payload of {} bytes exceeds max_message_bytes of {}",
                payload.len(),
                self.max_message_bytes
            )));
        }
        Ok(())
    }

    async fn publish(
        &self,
        metadata: Metadata,
        payload: Vec<u8>,
        routing_key: &str,
    ) -> Result<(), RpcError> {
        let properties = metadata.to_properties();
        let bytes = payload.len() as u64;
        self.broker
            .publish(&self.request_topic, payload, properties, routing_key)
            .await
            .map_err(RpcError::from)?;
        self.metrics.record_bytes_sent(bytes);
        Ok(())
    }

    /// Send a plain (non-streaming) request, letting the broker choose any
    /// queue (§4.5: "non-streaming sends let the broker select any queue").
    pub async fn send_request(
        &self,
        correlation_id: CorrelationId,
        payload: Vec<u8>,
    ) -> Result<(), RpcError> {
        self.check_size(&payload)?;
        let metadata = Metadata::request(correlation_id, self.sender_id);
        debug!(correlation_id = %correlation_id, "sending request");
        // No session to pin to a queue: the correlation id doubles as a
        // routing key purely for selector determinism, not for grouping.
        self.publish(metadata, payload, &correlation_id.to_string()).await
    }

    /// Send a streaming mid-message (`streamSend`): pinned to the
    /// session's routing key and carrying no correlation id, since the
    /// responder groups these by session id alone (§4.7).
    pub async fn send_stream_message(
        &self,
        session_id: SessionId,
        payload: Vec<u8>,
    ) -> Result<(), RpcError> {
        self.check_size(&payload)?;
        self.sessions.record_activity(session_id)?;
        let metadata = Metadata::request(session_id.as_correlation_id(), self.sender_id)
            .with_session(session_id);
        debug!(session_id = %session_id, "sending stream message");
        self.publish(metadata, payload, &session_id.routing_key()).await
    }

    /// Send the end-of-stream marker (`streamEnd`): same routing key as
    /// every other message in the session, correlation id equal to the
    /// session id, and the `streamEnd` marker property set (§4.7).
    pub async fn send_stream_end(&self, session_id: SessionId) -> Result<(), RpcError> {
        self.sessions.record_activity(session_id)?;
        let metadata = Metadata::request(session_id.as_correlation_id(), self.sender_id)
            .with_session(session_id)
            .with_stream_end();
        debug!(session_id = %session_id, "sending end-of-stream marker");
        self.publish(metadata, Vec::new(), &session_id.routing_key()).await
    }
}
