//! Frozen-at-startup client configuration, assembled through a fluent builder.
//!
//! Mirrors the source ecosystem's `SystemConfig`/`SystemConfigBuilder` pairing
//! (§10.3): sensible defaults, a `validate()` step that runs automatically at
//! `build()`, and a structured [`ConfigError`] rather than a panic on bad input.

mod builder;
mod error;

pub use builder::ClientConfigBuilder;
pub use error::ConfigError;

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

/// Default timeout used when a caller passes `0` to `sendSync`/`sendAsync`.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default hard cap on live request records.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 1_000;

/// Default hard cap on live active sessions.
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 100;

/// Default broker send acknowledgment timeout.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

/// Default broker-level resend count for `sendSync`.
pub const DEFAULT_RETRY_SYNC: u32 = 2;

/// Default broker-level resend count for `sendAsync`.
pub const DEFAULT_RETRY_ASYNC: u32 = 2;

/// Default local payload size cap (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default lower bound for the receiver's worker pool.
pub const DEFAULT_CONSUME_THREADS_MIN: usize = 2;

/// Default upper bound for the receiver's worker pool.
pub const DEFAULT_CONSUME_THREADS_MAX: usize = 8;

/// Default receiver prefetch batch size.
pub const DEFAULT_PULL_BATCH: usize = 10;

/// Default receiver dispatch batch size.
pub const DEFAULT_CONSUME_BATCH: usize = 10;

/// Default periodic metrics summary interval.
pub const DEFAULT_METRICS_LOG_INTERVAL_SEC: u64 = 60;

/// Default idle threshold before the session reaper closes a session.
pub const DEFAULT_IDLE_SESSION_TIMEOUT_MS: u64 = 300_000;

/// Default interval between session reaper sweeps.
pub const DEFAULT_SESSION_REAP_INTERVAL_MS: u64 = 5_000;

/// Upper bound accepted for `max-message-bytes` (4 MiB, §4.1).
pub const MAX_MESSAGE_BYTES_CEILING: usize = 4 * 1024 * 1024;

/// Frozen configuration bundle for an [`crate::client::RpcClient`].
///
/// Built exclusively through [`ClientConfigBuilder`]; `build()` runs
/// [`ClientConfig::validate`] and fails fast with a [`ConfigError`] for any
/// out-of-range or structurally invalid input (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Target broker endpoint.
    pub broker_address: String,
    /// Shared outbound request topic.
    pub request_topic: String,
    /// Prefix used to derive the per-sender response topic.
    pub response_topic_prefix: String,
    /// Timeout used when the caller passes `0`/omits a timeout.
    pub default_timeout_ms: u64,
    /// Hard cap on live request records.
    pub max_concurrent_requests: usize,
    /// Hard cap on live active sessions.
    pub max_concurrent_sessions: usize,
    /// Broker send acknowledgment timeout.
    pub send_timeout_ms: u64,
    /// Broker-level resend count for `sendSync`.
    pub retry_sync: u32,
    /// Broker-level resend count for `sendAsync`.
    pub retry_async: u32,
    /// Reject locally-originated payloads larger than this.
    pub max_message_bytes: usize,
    /// Lower bound of the receiver worker pool.
    pub consume_threads_min: usize,
    /// Upper bound of the receiver worker pool.
    pub consume_threads_max: usize,
    /// Receiver prefetch batch size.
    pub pull_batch: usize,
    /// Receiver dispatch batch size.
    pub consume_batch: usize,
    /// Whether the periodic metrics summary log line is emitted.
    pub metrics_log_enabled: bool,
    /// Interval between periodic metrics summary log lines.
    pub metrics_log_interval_sec: u64,
    /// Idle threshold after which the session reaper closes a session.
    pub idle_session_timeout_ms: u64,
    /// Interval between session reaper sweeps.
    pub session_reap_interval_ms: u64,
}

impl ClientConfig {
    /// Start building a configuration, pre-populated with defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// The default request timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// The broker send acknowledgment timeout as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// The response topic this client's instance derives from its sender id.
    pub fn response_topic_for(&self, sender_id: impl std::fmt::Display) -> String {
        format!("{}{}", self.response_topic_prefix, sender_id)
    }

    /// Validate every bound named in §4.1. Called automatically by
    /// `ClientConfigBuilder::build()`; exposed for callers that construct a
    /// `ClientConfig` by hand (e.g. via deserialization) and want the same
    /// fail-fast guarantee.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_address.trim().is_empty() {
            return Err(ConfigError::Invalid("broker_address must not be empty".into()));
        }
        if self.request_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("request_topic must not be empty".into()));
        }
        if self.response_topic_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "response_topic_prefix must not be empty".into(),
            ));
        }
        Self::in_range("default_timeout_ms", self.default_timeout_ms, 100, 300_000)?;
        Self::in_range(
            "max_concurrent_requests",
            self.max_concurrent_requests as u64,
            1,
            10_000,
        )?;
        Self::in_range(
            "max_concurrent_sessions",
            self.max_concurrent_sessions as u64,
            1,
            1_000,
        )?;
        Self::in_range("send_timeout_ms", self.send_timeout_ms, 1_000, 30_000)?;
        Self::in_range("retry_sync", self.retry_sync as u64, 0, 10)?;
        Self::in_range("retry_async", self.retry_async as u64, 0, 10)?;
        if self.max_message_bytes == 0 || self.max_message_bytes > MAX_MESSAGE_BYTES_CEILING {
            return Err(ConfigError::OutOfRange {
                field: "max_message_bytes",
                min: 1,
                max: MAX_MESSAGE_BYTES_CEILING as u64,
                actual: self.max_message_bytes as u64,
            });
        }
        Self::in_range(
            "consume_threads_min",
            self.consume_threads_min as u64,
            1,
            1_000,
        )?;
        Self::in_range(
            "consume_threads_max",
            self.consume_threads_max as u64,
            1,
            1_000,
        )?;
        if self.consume_threads_min > self.consume_threads_max {
            return Err(ConfigError::Invalid(
                "consume_threads_min must not exceed consume_threads_max".into(),
            ));
        }
        Self::in_range("pull_batch", self.pull_batch as u64, 1, 100)?;
        Self::in_range("consume_batch", self.consume_batch as u64, 1, 100)?;
        if self.metrics_log_enabled {
            Self::in_range(
                "metrics_log_interval_sec",
                self.metrics_log_interval_sec,
                10,
                3_600,
            )?;
        }
        Self::in_range(
            "idle_session_timeout_ms",
            self.idle_session_timeout_ms,
            0,
            3_600_000,
        )?;
        Self::in_range(
            "session_reap_interval_ms",
            self.session_reap_interval_ms,
            100,
            60_000,
        )?;
        Ok(())
    }

    fn in_range(field: &'static str, actual: u64, min: u64, max: u64) -> Result<(), ConfigError> {
        if actual < min || actual > max {
            return Err(ConfigError::OutOfRange {
                field,
                min,
                max,
                actual,
            });
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_address: "memory://local".to_string(),
            request_topic: "rpc.requests".to_string(),
            response_topic_prefix: "rpc.responses.".to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            retry_sync: DEFAULT_RETRY_SYNC,
            retry_async: DEFAULT_RETRY_ASYNC,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            consume_threads_min: DEFAULT_CONSUME_THREADS_MIN,
            consume_threads_max: DEFAULT_CONSUME_THREADS_MAX,
            pull_batch: DEFAULT_PULL_BATCH,
            consume_batch: DEFAULT_CONSUME_BATCH,
            metrics_log_enabled: false,
            metrics_log_interval_sec: DEFAULT_METRICS_LOG_INTERVAL_SEC,
            idle_session_timeout_ms: DEFAULT_IDLE_SESSION_TIMEOUT_MS,
            session_reap_interval_ms: DEFAULT_SESSION_REAP_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn response_topic_is_derived_from_prefix_and_sender_id() {
        let config = ClientConfig::default();
        let topic = config.response_topic_for("abc-123");
        assert_eq!(topic, "rpc.responses.abc-123");
    }

    #[test]
    fn rejects_empty_broker_address() {
        let config = ClientConfig {
            broker_address: String::new(),
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_timeout_out_of_range() {
        let config = ClientConfig {
            default_timeout_ms: 50,
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "default_timeout_ms", .. })
        ));
    }

    #[test]
    fn rejects_inverted_consume_thread_bounds() {
        let config = ClientConfig {
            consume_threads_min: 10,
            consume_threads_max: 2,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_max_message_bytes() {
        let config = ClientConfig {
            max_message_bytes: MAX_MESSAGE_BYTES_CEILING + 1,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
