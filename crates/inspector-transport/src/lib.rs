//! inspector-transport - builds channels to MCP servers
//!
//! [`TransportFactory`] turns a [`TransportOptions`] description into one of
//! three transports:
//! - `stdio`: a local subprocess speaking over its stdin/stdout
//! - `sse`: a Server-Sent Events stream plus POSTed requests
//! - `http`: streamable HTTP
//!
//! The returned transport is not started; nothing is spawned or connected
//! until [`McpTransport::start`] is called.

pub mod environment;
pub mod error;
pub mod event_stream;
pub mod factory;
pub mod fetch;
pub mod options;
pub mod resolve;
pub mod transport;

pub use environment::Environment;
pub use error::{ErrorCategory, TransportCreationError, TransportError};
pub use factory::{Transport, TransportFactory};
pub use fetch::{AgentSelection, Fetcher};
pub use options::{TransportKind, TransportOptions};
pub use resolve::ResolvedExecutable;
pub use transport::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport, RequestInit,
    TimeoutConfig,
};
