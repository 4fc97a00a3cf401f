//! Process-singleton metrics registry: lock-free counters, latency
//! aggregates, and derived throughput statistics (§4.2).

mod registry;

pub use registry::{MetricsRegistry, MetricsSnapshot};
