//! Lock-free atomic metrics registry.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use tracing::info;

// Layer 3: Internal module imports
// (none)

/// Process-singleton holder of request/session/streaming counters and
/// latency aggregates (§4.2).
///
/// Cloning is cheap (`Arc<Inner>`, the M-SERVICES-CLONE pattern); every
/// clone observes the same underlying counters. Every recording method is
/// wait-free: a single atomic fetch-add per event, no locks.
#[derive(Debug)]
pub struct MetricsRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    started_at: Instant,

    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    timed_out_requests: AtomicU64,

    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    completed_sessions: AtomicU64,
    streaming_messages: AtomicU64,

    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    late_or_unknown: AtomicU64,

    latency_sum_micros: AtomicU64,
    latency_min_micros: AtomicU64,
    latency_max_micros: AtomicU64,
    latency_count: AtomicU64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            timed_out_requests: AtomicU64::new(0),
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            completed_sessions: AtomicU64::new(0),
            streaming_messages: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            late_or_unknown: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_min_micros: AtomicU64::new(u64::MAX),
            latency_max_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

/// Point-in-time read of [`MetricsRegistry`], including derived statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// Total requests ever registered (sync + async + streaming starts).
    pub total_requests: u64,
    /// Requests that completed with `success = true`.
    pub successful_requests: u64,
    /// Requests that completed with `success = false`.
    pub failed_requests: u64,
    /// Requests whose deadline elapsed before a response arrived.
    pub timed_out_requests: u64,
    /// Sessions ever created.
    pub total_sessions: u64,
    /// Sessions currently in the `ACTIVE` state.
    pub active_sessions: u64,
    /// Sessions that reached `CLOSED`.
    pub completed_sessions: u64,
    /// Incremental streaming messages delivered (not counting the final one).
    pub streaming_messages: u64,
    /// Bytes handed to the broker across every publish.
    pub bytes_sent: u64,
    /// Bytes received across every delivered response.
    pub bytes_received: u64,
    /// Responses dropped because their correlation id was unknown or had
    /// already been resolved (e.g. arrived after a timeout fired).
    pub late_or_unknown: u64,
    /// Mean latency across every completed sync/async request, in
    /// microseconds. `None` if no request has completed yet.
    pub mean_latency_micros: Option<u64>,
    /// Minimum observed latency, in microseconds.
    pub min_latency_micros: Option<u64>,
    /// Maximum observed latency, in microseconds.
    pub max_latency_micros: Option<u64>,
    /// Fraction of completed requests (success + failure, excluding
    /// timeouts) that succeeded, in `[0.0, 1.0]`. `None` if none completed.
    pub success_rate: Option<f64>,
    /// Completed requests per second of uptime.
    pub requests_per_sec: f64,
    /// Bytes sent plus received per second of uptime.
    pub bytes_per_sec: f64,
    /// Time elapsed since the registry was created.
    pub uptime: Duration,
}

impl MetricsRegistry {
    /// Start a fresh registry with every counter zeroed and the clock
    /// running from this instant.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Record a newly registered request (sync, async, or the start of a
    /// streaming exchange).
    pub fn record_request_registered(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that completed successfully, with its end-to-end
    /// latency.
    pub fn record_success(&self, latency: Duration) {
        self.inner.successful_requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a request that completed with a failure response.
    pub fn record_failure(&self, latency: Duration) {
        self.inner.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a request whose deadline elapsed before any response arrived.
    pub fn record_timeout(&self) {
        self.inner.timed_out_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response that could not be matched to a live correlation
    /// entry (unknown id, or the id had already resolved/timed out).
    pub fn record_late_or_unknown(&self) {
        self.inner.late_or_unknown.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a newly created session, now active.
    pub fn record_session_created(&self) {
        self.inner.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.inner.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session transitioning from active to closed.
    pub fn record_session_closed(&self) {
        self.inner.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.inner.completed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one incremental streaming message delivered to a handler.
    pub fn record_streaming_message(&self) {
        self.inner.streaming_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes handed to the broker for a single publish.
    pub fn record_bytes_sent(&self, bytes: u64) {
        self.inner.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record bytes carried by a single delivered response.
    pub fn record_bytes_received(&self, bytes: u64) {
        self.inner.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.inner.latency_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.inner.latency_count.fetch_add(1, Ordering::Relaxed);
        self.inner.latency_min_micros.fetch_min(micros, Ordering::Relaxed);
        self.inner.latency_max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Time elapsed since this registry was constructed.
    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Take a consistent-enough point-in-time read of every counter plus
    /// the statistics derived from them.
    ///
    /// Individual counters are read independently (no registry-wide lock),
    /// so under concurrent writers a snapshot may mix values from
    /// slightly different instants; this matches the wait-free contract
    /// in favor of perfect atomicity across fields.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.uptime();
        let successful = self.inner.successful_requests.load(Ordering::Relaxed);
        let failed = self.inner.failed_requests.load(Ordering::Relaxed);
        let latency_count = self.inner.latency_count.load(Ordering::Relaxed);
        let latency_sum = self.inner.latency_sum_micros.load(Ordering::Relaxed);
        let min_latency = self.inner.latency_min_micros.load(Ordering::Relaxed);
        let max_latency = self.inner.latency_max_micros.load(Ordering::Relaxed);
        let bytes_sent = self.inner.bytes_sent.load(Ordering::Relaxed);
        let bytes_received = self.inner.bytes_received.load(Ordering::Relaxed);
        let completed = successful + failed;

        let seconds = uptime.as_secs_f64().max(f64::EPSILON);

        MetricsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            successful_requests: successful,
            failed_requests: failed,
            timed_out_requests: self.inner.timed_out_requests.load(Ordering::Relaxed),
            total_sessions: self.inner.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.inner.active_sessions.load(Ordering::Relaxed),
            completed_sessions: self.inner.completed_sessions.load(Ordering::Relaxed),
            streaming_messages: self.inner.streaming_messages.load(Ordering::Relaxed),
            bytes_sent,
            bytes_received,
            late_or_unknown: self.inner.late_or_unknown.load(Ordering::Relaxed),
            mean_latency_micros: (latency_count > 0).then(|| latency_sum / latency_count),
            min_latency_micros: (latency_count > 0).then_some(min_latency),
            max_latency_micros: (latency_count > 0).then_some(max_latency),
            success_rate: (completed > 0).then(|| successful as f64 / completed as f64),
            requests_per_sec: completed as f64 / seconds,
            bytes_per_sec: (bytes_sent + bytes_received) as f64 / seconds,
            uptime,
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        self.inner.total_requests.store(0, Ordering::Relaxed);
        self.inner.successful_requests.store(0, Ordering::Relaxed);
        self.inner.failed_requests.store(0, Ordering::Relaxed);
        self.inner.timed_out_requests.store(0, Ordering::Relaxed);
        self.inner.total_sessions.store(0, Ordering::Relaxed);
        self.inner.active_sessions.store(0, Ordering::Relaxed);
        self.inner.completed_sessions.store(0, Ordering::Relaxed);
        self.inner.streaming_messages.store(0, Ordering::Relaxed);
        self.inner.bytes_sent.store(0, Ordering::Relaxed);
        self.inner.bytes_received.store(0, Ordering::Relaxed);
        self.inner.late_or_unknown.store(0, Ordering::Relaxed);
        self.inner.latency_sum_micros.store(0, Ordering::Relaxed);
        self.inner.latency_min_micros.store(u64::MAX, Ordering::Relaxed);
        self.inner.latency_max_micros.store(0, Ordering::Relaxed);
        self.inner.latency_count.store(0, Ordering::Relaxed);
    }

    /// Emit the one-line structured summary used by the periodic logging
    /// task and by `close()`'s final summary (§4.1, §4.3 lifecycle).
    pub fn log_summary(&self) {
        let snap = self.snapshot();
        info!(
            total_requests = snap.total_requests,
            successful_requests = snap.successful_requests,
            failed_requests = snap.failed_requests,
            timed_out_requests = snap.timed_out_requests,
            active_sessions = snap.active_sessions,
            success_rate = snap.success_rate.unwrap_or(0.0),
            requests_per_sec = snap.requests_per_sec,
            uptime_secs = snap.uptime.as_secs(),
            "rpc client metrics summary"
        );
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsRegistry {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_registry_has_no_latency_statistics() {
        let metrics = MetricsRegistry::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.mean_latency_micros, None);
        assert_eq!(snap.success_rate, None);
        assert_eq!(snap.total_requests, 0);
    }

    #[test]
    fn records_success_and_failure_into_latency_and_rate() {
        let metrics = MetricsRegistry::new();
        metrics.record_request_registered();
        metrics.record_success(Duration::from_millis(10));
        metrics.record_request_registered();
        metrics.record_failure(Duration::from_millis(30));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.successful_requests, 1);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.success_rate, Some(0.5));
        assert_eq!(snap.min_latency_micros, Some(10_000));
        assert_eq!(snap.max_latency_micros, Some(30_000));
        assert_eq!(snap.mean_latency_micros, Some(20_000));
    }

    #[test]
    fn session_lifecycle_moves_between_active_and_completed() {
        let metrics = MetricsRegistry::new();
        metrics.record_session_created();
        metrics.record_session_created();
        metrics.record_session_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_sessions, 2);
        assert_eq!(snap.active_sessions, 1);
        assert_eq!(snap.completed_sessions, 1);
    }

    #[test]
    fn reset_zeros_every_counter_and_latency_state() {
        let metrics = MetricsRegistry::new();
        metrics.record_success(Duration::from_millis(5));
        metrics.record_bytes_sent(128);
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.successful_requests, 0);
        assert_eq!(snap.bytes_sent, 0);
        assert_eq!(snap.mean_latency_micros, None);
    }

    #[test]
    fn clone_shares_the_same_underlying_counters() {
        let metrics = MetricsRegistry::new();
        let clone = metrics.clone();
        clone.record_request_registered();
        assert_eq!(metrics.snapshot().total_requests, 1);
    }
}
