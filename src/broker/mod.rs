//! The pub/sub contract the core consumes (§6), plus an in-process
//! implementation usable by tests and demos without a real broker (§10.4).

mod in_memory;
mod selector;
mod traits;

pub use in_memory::InMemoryBroker;
pub use selector::{stable_hash_selector, QueueSelector};
pub use traits::{Broker, MessageHandler, Subscription};
