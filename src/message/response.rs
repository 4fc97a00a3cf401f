//! Business-level response handed back to RPC facade callers.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::Metadata;

/// The result of `sendSync`/`sendAsync`/`streamEnd`/a `bidiSend` delivery.
///
/// A failed *business* response (`success = false`) is a distinct,
/// non-exceptional value from a transport fault (§7): the caller reads
/// [`RpcResponse::success`] and [`RpcResponse::error_message`] rather than
/// an `Err` arriving for business-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    /// Opaque response body. May be empty when `success` is `false`.
    pub payload: Vec<u8>,
    /// `true` unless the responder set `success=false` in its metadata.
    pub success: bool,
    /// Set iff `success` is `false`.
    pub error_message: Option<String>,
}

impl RpcResponse {
    /// Build a response from a delivered payload and its parsed metadata.
    pub fn from_metadata(payload: Vec<u8>, metadata: &Metadata) -> Self {
        Self {
            payload,
            success: metadata.success.unwrap_or(true),
            error_message: metadata.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CorrelationId;

    #[test]
    fn defaults_to_successful_when_metadata_omits_the_flag() {
        let metadata = Metadata::request(CorrelationId::new(), crate::ids::SenderId::new());
        let response = RpcResponse::from_metadata(b"ok".to_vec(), &metadata);
        assert!(response.success);
        assert!(response.error_message.is_none());
    }

    #[test]
    fn carries_the_error_message_of_a_business_failure() {
        let metadata = Metadata::response(CorrelationId::new(), true).with_error("boom");
        let response = RpcResponse::from_metadata(vec![], &metadata);
        assert!(!response.success);
        assert_eq!(response.error_message.as_deref(), Some("boom"));
    }
}
