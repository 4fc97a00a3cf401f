//! Message receiver: subscribes to the client's private response topic and
//! dispatches deliveries to the correlation manager (§4.6).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tracing::warn;

// Layer 3: Internal module imports
use crate::broker::{Broker, Subscription};
use crate::config::ClientConfig;
use crate::correlation::CorrelationManager;
use crate::error::RpcError;
use crate::ids::SenderId;
use crate::message::{MessageKind, RpcMessage};

/// Owns the live subscription against a client's private response topic and
/// routes every delivered message to the [`CorrelationManager`] that can
/// resolve it.
///
/// A message that fails to parse, or whose `messageType` isn't `RESPONSE`,
/// is dropped with a warning rather than surfaced as an error: the broker
/// contract (§6) gives the receiver no way to reject or nack a delivery.
pub struct MessageReceiver {
    subscription: Option<Box<dyn Subscription>>,
    response_topic: String,
}

impl MessageReceiver {
    /// Assert the private response topic exists and subscribe to it,
    /// wiring every delivery into `correlation`.
    pub async fn start<B: Broker>(
        broker: &B,
        config: &ClientConfig,
        sender_id: SenderId,
        correlation: CorrelationManager,
    ) -> Result<Self, RpcError> {
        let response_topic = config.response_topic_for(sender_id);

        if !broker.topic_exists(&response_topic).await? {
            broker.create_topic(&response_topic, 1, 1).await?;
        }

        let handler = Arc::new(move |message: RpcMessage| {
            let correlation = correlation.clone();
            tokio::spawn(async move {
                dispatch(&correlation, message).await;
            });
        });

        let subscription = broker
            .subscribe(
                &response_topic,
                config.consume_threads_min,
                config.consume_threads_max,
                handler,
            )
            .await?;

        Ok(Self {
            subscription: Some(subscription),
            response_topic,
        })
    }

    /// The private response topic this receiver is subscribed to.
    pub fn response_topic(&self) -> &str {
        &self.response_topic
    }

    /// Tear down the subscription, waiting for any in-flight dispatch to
    /// finish (§4.7 close ordering: the sender stops first, then this).
    pub async fn stop(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
    }
}

async fn dispatch(correlation: &CorrelationManager, message: RpcMessage) {
    let metadata = match message.metadata() {
        Ok(metadata) => metadata,
        Err(reason) => {
            warn!(reason, "dropping undeliverable response");
            return;
        }
    };

    if metadata.kind != MessageKind::Response {
        warn!(kind = %metadata.kind, "dropping non-response message on the response topic");
        return;
    }

    correlation.deliver_response(message).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::ids::CorrelationId;
    use crate::message::Metadata;
    use crate::metrics::MetricsRegistry;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_a_matching_response_to_the_correlation_manager() {
        let broker = InMemoryBroker::new();
        let config = ClientConfig::default();
        let sender_id = SenderId::new();
        let correlation = CorrelationManager::new(&config, MetricsRegistry::new());

        let receiver = MessageReceiver::start(&broker, &config, sender_id, correlation.clone())
            .await
            .unwrap();

        let (correlation_id, waiter) = correlation
            .register_sync(Duration::from_secs(5))
            .unwrap();

        let metadata = Metadata::response(correlation_id, true);
        broker
            .publish(
                receiver.response_topic(),
                b"pong".to_vec(),
                metadata.to_properties(),
                "any",
            )
            .await
            .unwrap();

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.payload, b"pong");

        receiver.stop().await;
    }

    #[tokio::test]
    async fn unparseable_response_is_dropped_without_panicking() {
        let broker = InMemoryBroker::new();
        let config = ClientConfig::default();
        let sender_id = SenderId::new();
        let correlation = CorrelationManager::new(&config, MetricsRegistry::new());

        let receiver = MessageReceiver::start(&broker, &config, sender_id, correlation.clone())
            .await
            .unwrap();

        broker
            .publish(
                receiver.response_topic(),
                b"garbage".to_vec(),
                std::collections::HashMap::new(),
                "any",
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(correlation.is_empty());

        receiver.stop().await;
    }

    #[tokio::test]
    async fn request_shaped_message_on_the_response_topic_is_ignored() {
        let broker = InMemoryBroker::new();
        let config = ClientConfig::default();
        let sender_id = SenderId::new();
        let correlation = CorrelationManager::new(&config, MetricsRegistry::new());

        let receiver = MessageReceiver::start(&broker, &config, sender_id, correlation.clone())
            .await
            .unwrap();

        let metadata = Metadata::request(CorrelationId::new(), sender_id);
        broker
            .publish(
                receiver.response_topic(),
                b"oops".to_vec(),
                metadata.to_properties(),
                "any",
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(correlation.is_empty());

        receiver.stop().await;
    }
}
