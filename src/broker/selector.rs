//! Pluggable queue-selection strategy (§6): `queueIndex = stable_hash(routing_key) mod queueCount`.

// Layer 1: Standard library imports
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// A callback invoked per send that receives `(topic, payload, routing_key,
/// queue_count)` and returns the destination queue index.
///
/// Implementations must guarantee equal routing keys produce equal queue
/// indices as long as `queue_count` is stable (I5: same-session messages
/// land on the same queue, preserving their submission order).
pub type QueueSelector = Arc<dyn Fn(&str, &[u8], &str, usize) -> usize + Send + Sync>;

/// Default selector: a deterministic, uniformly-distributed hash of the
/// routing key, reduced modulo the queue count. Ignores `topic`/`payload`,
/// since §6 only requires the routing-key guarantee.
pub fn stable_hash_selector() -> QueueSelector {
    Arc::new(|_topic, _payload, routing_key, queue_count| {
        if queue_count == 0 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        routing_key.hash(&mut hasher);
        (hasher.finish() % queue_count as u64) as usize
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_routing_key_always_maps_to_the_same_queue() {
        let selector = stable_hash_selector();
        let a = selector("topic", b"payload-a", "session-42", 8);
        let b = selector("topic", b"payload-b", "session-42", 8);
        assert_eq!(a, b);
    }

    #[test]
    fn distributes_across_the_queue_count() {
        let selector = stable_hash_selector();
        let mut seen = std::collections::HashSet::new();
        for i in 0..64 {
            let key = format!("session-{i}");
            seen.insert(selector("topic", b"", &key, 8));
        }
        assert!(seen.len() > 1, "expected the hash to spread across queues");
    }

    #[test]
    fn zero_queues_never_panics() {
        let selector = stable_hash_selector();
        assert_eq!(selector("topic", b"", "key", 0), 0);
    }
}
