//! Wire-level message shapes: metadata carried as broker user-properties,
//! and the envelopes sent/received across the broker boundary (§5 wire
//! protocol).

mod envelope;
mod metadata;
mod response;

pub use envelope::RpcMessage;
pub use metadata::{MessageKind, Metadata};
pub use response::RpcResponse;
