//! Closed error taxonomy for the RPC client's public surface.

// Layer 1: Standard library imports
use std::error::Error as StdError;
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::config::ConfigError;
use crate::ids::{CorrelationId, SessionId};

/// Unified error type surfaced by every public `RpcClient` operation.
///
/// Component-local errors (`ConfigError`, `BrokerError`) convert into this
/// type via `#[from]` at the seam where they cross into the public facade,
/// so callers only ever deal with one error type.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Null/empty payload, out-of-range timeout, or oversized payload.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted before `start()` completed successfully.
    #[error("client has not been started")]
    NotStarted,

    /// `start()` was called on a client that is already running.
    #[error("client is already started")]
    AlreadyStarted,

    /// The request or session concurrency cap has been reached.
    #[error("capacity exceeded: {current} live, max {max}")]
    CapacityExceeded {
        /// Live count at the moment of rejection.
        current: usize,
        /// The configured cap that was hit.
        max: usize,
    },

    /// `streamSend`/`streamEnd`/`bidiSend` referenced an unknown session.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The referenced session has already transitioned to closed.
    #[error("session is closed: {0}")]
    SessionClosed(SessionId),

    /// No response arrived before the registered deadline.
    #[error("request {0} timed out")]
    Timeout(CorrelationId),

    /// The caller cancelled the operation, or the client is closing.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The broker failed to send or subscribe after exhausting retries.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An internal invariant was violated; wraps the unexpected cause.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// A transient condition; retrying the same call at a later time may
    /// succeed without any change in caller behavior.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::TransportError(_) | RpcError::Timeout(_))
    }

    /// An error that reflects a closed/ended state rather than a transient
    /// failure — retrying without first re-establishing state will not help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::NotStarted
                | RpcError::SessionClosed(_)
                | RpcError::AlreadyStarted
        )
    }

    /// Construct a `Cancelled` error carrying `ClientClosing` as its reason,
    /// the label `cancelAll` uses at shutdown (§4.3).
    pub fn client_closing() -> Self {
        RpcError::Cancelled("ClientClosing".to_string())
    }
}

impl From<ConfigError> for RpcError {
    fn from(err: ConfigError) -> Self {
        RpcError::InvalidArgument(err.to_string())
    }
}

/// Errors raised by a [`crate::broker::Broker`] implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The named topic does not exist and was not asserted into existence.
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// A publish attempt failed after exhausting the configured retries.
    #[error("publish to {topic} failed after {attempts} attempt(s): {reason}")]
    PublishFailed {
        /// Destination topic.
        topic: String,
        /// Number of attempts made, including the first.
        attempts: u32,
        /// Underlying failure reason.
        reason: String,
    },

    /// A publish attempt exceeded `send-timeout-ms`.
    #[error("publish to {topic} timed out after {timeout:?}")]
    SendTimeout {
        /// Destination topic.
        topic: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Failed to subscribe to a topic (e.g. at client startup).
    #[error("subscribe to {0} failed: {1}")]
    SubscribeFailed(String, String),

    /// Topic administration (existence check / creation) failed.
    #[error("topic administration failed for {0}: {1}")]
    AdminFailed(String, String),
}

impl BrokerError {
    /// Box an arbitrary error as the `reason` field of `PublishFailed`.
    pub fn publish_failed(topic: impl Into<String>, attempts: u32, source: impl StdError) -> Self {
        BrokerError::PublishFailed {
            topic: topic.into(),
            attempts,
            reason: source.to_string(),
        }
    }
}

impl From<BrokerError> for RpcError {
    fn from(err: BrokerError) -> Self {
        RpcError::TransportError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_timeout_are_transient() {
        assert!(RpcError::TransportError("x".into()).is_transient());
        assert!(RpcError::Timeout(CorrelationId::new()).is_transient());
        assert!(!RpcError::NotStarted.is_transient());
    }

    #[test]
    fn not_started_and_session_closed_are_fatal() {
        assert!(RpcError::NotStarted.is_fatal());
        assert!(RpcError::SessionClosed(SessionId::new()).is_fatal());
        assert!(!RpcError::CapacityExceeded { current: 1, max: 1 }.is_fatal());
    }

    #[test]
    fn client_closing_carries_the_expected_reason() {
        let err = RpcError::client_closing();
        assert_eq!(err.to_string(), "operation cancelled: ClientClosing");
    }

    #[test]
    fn broker_error_converts_into_transport_error() {
        let broker_err = BrokerError::TopicNotFound("req".to_string());
        let rpc_err: RpcError = broker_err.into();
        assert!(matches!(rpc_err, RpcError::TransportError(_)));
    }
}
