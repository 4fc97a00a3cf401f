//! Per-message delivery handler for a bidirectional streaming session.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::error::RpcError;
use crate::message::RpcResponse;

/// The one polymorphic seam the correlation manager exposes (§9): callers
/// of `bidiSend` implement this to receive incremental responses as they
/// arrive, with a default no-op for the completion and error hooks.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Called for every incremental (non-final) response on this session.
    async fn on_response(&self, response: RpcResponse);

    /// Called once with the final aggregated response, immediately before
    /// the session's aggregate future resolves. Default: no-op.
    async fn on_complete(&self, _response: RpcResponse) {}

    /// Called if the session is torn down without a final response
    /// arriving — idle-reaped or the client closed. Default: no-op.
    async fn on_error(&self, _error: RpcError) {}
}
