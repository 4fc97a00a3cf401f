//! Fluent builder for [`super::ClientConfig`].

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::{ClientConfig, ConfigError};

/// Builder for [`ClientConfig`] with a fluent API.
///
/// `build()` runs [`ClientConfig::validate`] and returns a [`ConfigError`]
/// rather than panicking on bad input (§10.3).
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the broker endpoint this client connects to.
    pub fn broker_address(mut self, address: impl Into<String>) -> Self {
        self.config.broker_address = address.into();
        self
    }

    /// Set the shared outbound request topic.
    pub fn request_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.request_topic = topic.into();
        self
    }

    /// Set the prefix used to derive this client's private response topic.
    pub fn response_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.response_topic_prefix = prefix.into();
        self
    }

    /// Set the timeout used when a caller passes `0`/omits a timeout.
    pub fn default_timeout_ms(mut self, ms: u64) -> Self {
        self.config.default_timeout_ms = ms;
        self
    }

    /// Set the hard cap on live request records.
    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.config.max_concurrent_requests = max;
        self
    }

    /// Set the hard cap on live active sessions.
    pub fn max_concurrent_sessions(mut self, max: usize) -> Self {
        self.config.max_concurrent_sessions = max;
        self
    }

    /// Set the broker send acknowledgment timeout.
    pub fn send_timeout_ms(mut self, ms: u64) -> Self {
        self.config.send_timeout_ms = ms;
        self
    }

    /// Set the broker-level resend count for `sendSync`.
    pub fn retry_sync(mut self, count: u32) -> Self {
        self.config.retry_sync = count;
        self
    }

    /// Set the broker-level resend count for `sendAsync`.
    pub fn retry_async(mut self, count: u32) -> Self {
        self.config.retry_async = count;
        self
    }

    /// Set the local payload size cap.
    pub fn max_message_bytes(mut self, bytes: usize) -> Self {
        self.config.max_message_bytes = bytes;
        self
    }

    /// Set the receiver worker pool bounds.
    pub fn consume_threads(mut self, min: usize, max: usize) -> Self {
        self.config.consume_threads_min = min;
        self.config.consume_threads_max = max;
        self
    }

    /// Set the receiver prefetch/dispatch batch sizes.
    pub fn batch_sizes(mut self, pull_batch: usize, consume_batch: usize) -> Self {
        self.config.pull_batch = pull_batch;
        self.config.consume_batch = consume_batch;
        self
    }

    /// Enable the periodic metrics summary log line at the given interval.
    pub fn metrics_log(mut self, enabled: bool, interval_sec: u64) -> Self {
        self.config.metrics_log_enabled = enabled;
        self.config.metrics_log_interval_sec = interval_sec;
        self
    }

    /// Set the idle threshold and sweep interval for the session reaper.
    pub fn session_reaping(mut self, idle_timeout_ms: u64, interval_ms: u64) -> Self {
        self.config.idle_session_timeout_ms = idle_timeout_ms;
        self.config.session_reap_interval_ms = interval_ms;
        self
    }

    /// Validate and materialize the frozen [`ClientConfig`].
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
