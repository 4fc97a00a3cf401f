//! # topic-rpc — Request/Response and Streaming RPC on top of a Pub/Sub Broker
//!
//! A broker that only gives you topics, partitioned queues with per-queue
//! FIFO ordering, and string user-properties has no notion of request,
//! response, or correlation. This crate synthesizes those on top of such a
//! broker: callers get `sendSync`/`sendAsync` request/response calls and
//! `streamStart`/`streamSend`/`streamEnd`/`bidiSend` streaming calls, while
//! the broker underneath only ever sees opaque published bytes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use topic_rpc::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RpcError> {
//!     let broker = Arc::new(InMemoryBroker::new());
//!     let config = ClientConfig::default();
//!     let client = RpcClient::new(config, broker);
//!
//!     client.start().await?;
//!     let response = client.send_sync(b"ping".to_vec(), 5_000).await?;
//!     assert!(response.success);
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Core Components
//!
//! - [`correlation`] — maps outgoing request ids to pending waiters
//!   (synchronous blockers, cancellable futures, streaming handlers),
//!   enforces the concurrent-request cap, and fires timeouts.
//! - [`session`] — tracks active streaming sessions, enforces the
//!   concurrent-session cap, and evicts idle sessions.
//! - [`sender`] / [`receiver`] — the send/receive pipeline: one shared
//!   outbound request topic, one private per-client inbound response topic.
//! - [`client`] — the public [`client::RpcClient`] facade tying the above
//!   together with lifecycle management (`start`/`close`).
//!
//! # Ambient Infrastructure
//!
//! - [`config`] — a frozen, validated [`config::ClientConfig`] assembled
//!   through [`config::ClientConfigBuilder`].
//! - [`error`] — the closed [`error::RpcError`] taxonomy every public
//!   operation returns.
//! - [`metrics`] — a lock-free [`metrics::MetricsRegistry`] of counters,
//!   latency aggregates, and derived throughput statistics.
//! - [`broker`] — the [`broker::Broker`] trait a real binding implements,
//!   plus [`broker::InMemoryBroker`], a fully working in-process
//!   implementation used by this crate's own test suite and available to
//!   anyone evaluating the client without a real broker deployment.
//! - [`message`] — the wire envelope ([`message::RpcMessage`]) and its
//!   typed metadata ([`message::Metadata`]).
//!
//! # Non-goals
//!
//! At-most-once/exactly-once delivery, message persistence and crash
//! recovery, cross-sender fan-out, and server-side request handling are
//! all out of scope: this crate is the client half only. The broker
//! implementation and the business logic that replies to requests are
//! external collaborators.

pub mod broker;
pub mod client;
pub mod config;
pub mod correlation;
pub mod error;
pub mod ids;
pub mod message;
pub mod metrics;
pub mod prelude;
pub mod receiver;
pub mod sender;
pub mod session;

pub use client::RpcClient;
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use correlation::{AsyncResponse, CorrelationManager, StreamHandler};
pub use error::{BrokerError, RpcError};
pub use ids::{CorrelationId, SenderId, SessionId};
pub use message::{Metadata, MessageKind, RpcMessage, RpcResponse};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use session::{SessionManager, SessionView};
