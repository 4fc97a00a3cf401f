//! The cancellable future returned by `sendAsync`.

// Layer 1: Standard library imports
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

// Layer 2: Third-party crate imports
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use super::manager::CorrelationManager;
use crate::error::RpcError;
use crate::ids::CorrelationId;
use crate::message::RpcResponse;

/// Future returned by `RpcClient::send_async`.
///
/// Dropping this future before it resolves removes the correlation entry,
/// cancels its scheduled timeout, and completes it with [`RpcError::Cancelled`]
/// (§5 Cancellation) — a late broker response is then dropped and counted
/// as `lateOrUnknown`.
pub struct AsyncResponse {
    correlation_id: CorrelationId,
    manager: CorrelationManager,
    receiver: oneshot::Receiver<Result<RpcResponse, RpcError>>,
    settled: bool,
}

impl AsyncResponse {
    pub(super) fn new(
        correlation_id: CorrelationId,
        manager: CorrelationManager,
        receiver: oneshot::Receiver<Result<RpcResponse, RpcError>>,
    ) -> Self {
        Self {
            correlation_id,
            manager,
            receiver,
            settled: false,
        }
    }

    /// The correlation id this future is waiting on, for diagnostics.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

impl Future for AsyncResponse {
    type Output = Result<RpcResponse, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.settled = true;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.settled = true;
                Poll::Ready(Err(RpcError::Internal(
                    "pending operation dropped without completion".to_string(),
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for AsyncResponse {
    fn drop(&mut self) {
        if !self.settled {
            self.manager.cancel(self.correlation_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::metrics::MetricsRegistry;
    use std::time::Duration;

    #[tokio::test]
    async fn dropping_before_resolution_cancels_the_entry() {
        let config = ClientConfig::default();
        let manager = CorrelationManager::new(&config, MetricsRegistry::new());
        let future = manager
            .register_async(Duration::from_secs(5))
            .expect("capacity available");
        let id = future.correlation_id();

        assert_eq!(manager.len(), 1);
        drop(future);
        // Cancellation removal happens synchronously in `cancel`.
        assert_eq!(manager.len(), 0);
        let _ = id;
    }
}
