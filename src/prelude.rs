//! Prelude module for convenient imports.
//!
//! Re-exports the types most callers need to start, drive, and shut down
//! an RPC client:
//!
//! ```rust,ignore
//! use topic_rpc::prelude::*;
//! ```
//!
//! # What's Included
//!
//! ## Client
//! - [`RpcClient`] - the request/response and streaming facade
//!
//! ## Configuration
//! - [`ClientConfig`] - frozen, validated client configuration
//! - [`ClientConfigBuilder`] - fluent builder for [`ClientConfig`]
//! - [`ConfigError`] - validation failure detail
//!
//! ## Broker
//! - [`Broker`] - the pub/sub contract a real binding implements
//! - [`InMemoryBroker`] - in-process implementation for tests and demos
//! - [`Subscription`] - a live subscription handle
//!
//! ## Messages
//! - [`RpcMessage`] - the wire envelope
//! - [`RpcResponse`] - a parsed, business-level response
//! - [`Metadata`] / [`MessageKind`] - typed view over broker user-properties
//!
//! ## Identifiers
//! - [`SenderId`] / [`CorrelationId`] / [`SessionId`]
//!
//! ## Streaming
//! - [`StreamHandler`] - callback trait for incremental streaming responses
//! - [`AsyncResponse`] - cancellable future returned by `sendAsync`
//!
//! ## Observability
//! - [`MetricsSnapshot`] - a point-in-time read of client metrics
//!
//! ## Errors
//! - [`RpcError`] - the closed error taxonomy every operation returns
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use topic_rpc::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RpcError> {
//!     let broker = Arc::new(InMemoryBroker::new());
//!     let client = RpcClient::new(ClientConfig::default(), broker);
//!     client.start().await?;
//!     let response = client.send_sync(b"ping".to_vec(), 5_000).await?;
//!     println!("success: {}", response.success);
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

// Client
pub use crate::client::RpcClient;

// Configuration
pub use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError};

// Broker
pub use crate::broker::{Broker, InMemoryBroker, Subscription};

// Messages
pub use crate::message::{MessageKind, Metadata, RpcMessage, RpcResponse};

// Identifiers
pub use crate::ids::{CorrelationId, SenderId, SessionId};

// Streaming
pub use crate::correlation::{AsyncResponse, StreamHandler};

// Observability
pub use crate::metrics::MetricsSnapshot;

// Errors
pub use crate::error::{BrokerError, RpcError};
