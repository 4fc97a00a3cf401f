//! The envelope handed to and received from a [`crate::broker::Broker`].

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::Metadata;

/// Opaque payload bytes plus the flattened string properties that ride
/// alongside them, and the topic this message travels on.
///
/// This is the only shape a [`crate::broker::Broker`] implementation ever
/// sees: it does not parse `payload` and does not interpret `properties`
/// beyond treating them as string key/value pairs. The sender and
/// receiver are the only places that convert to and from typed
/// [`Metadata`] ([`RpcMessage::metadata`]/[`RpcMessage::with_metadata`]).
#[derive(Debug, Clone)]
pub struct RpcMessage {
    /// Destination (outbound) or source (inbound) topic.
    pub topic: String,
    /// Opaque request or response body.
    pub payload: Vec<u8>,
    /// Raw string user-properties, as carried by the broker.
    pub properties: HashMap<String, String>,
}

impl RpcMessage {
    /// Construct a new envelope addressed to `topic`, deriving its raw
    /// properties from `metadata`.
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, metadata: &Metadata) -> Self {
        Self {
            topic: topic.into(),
            payload,
            properties: metadata.to_properties(),
        }
    }

    /// Construct an envelope directly from already-flattened properties,
    /// as a broker implementation does when handing a delivered message
    /// back to a subscriber.
    pub fn from_properties(
        topic: impl Into<String>,
        payload: Vec<u8>,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload,
            properties,
        }
    }

    /// Parse this envelope's raw properties into typed [`Metadata`].
    pub fn metadata(&self) -> Result<Metadata, String> {
        Metadata::from_properties(&self.properties)
    }

    /// Size of the payload in bytes, used for the local payload-size cap
    /// and for the bytes-sent/bytes-received metrics.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CorrelationId, SenderId};

    #[test]
    fn payload_len_matches_the_stored_bytes() {
        let metadata = Metadata::request(CorrelationId::new(), SenderId::new());
        let msg = RpcMessage::new("rpc.requests", vec![1, 2, 3], &metadata);
        assert_eq!(msg.payload_len(), 3);
    }

    #[test]
    fn metadata_round_trips_through_properties() {
        let metadata = Metadata::request(CorrelationId::new(), SenderId::new());
        let msg = RpcMessage::new("rpc.requests", vec![], &metadata);
        let parsed = msg.metadata().expect("valid properties");
        assert_eq!(parsed.correlation_id, metadata.correlation_id);
    }
}
