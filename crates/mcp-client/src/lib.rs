//! MCP client layer for mcp-stress.
//!
//! Three transports carry JSON-RPC 2.0 to an MCP server:
//! - **Stdio**: spawn a child process, line-delimited JSON over stdin/stdout.
//! - **Sse**: legacy HTTP variant; responses travel back on a long-lived
//!   server-sent-event stream, requests POST to a discovered endpoint.
//! - **StreamableHttp**: each POST returns a JSON body or an inline SSE
//!   stream carrying the single response.
//!
//! All transports share the pending-request table, the error
//! classification, and the per-request latency measurement. The typed
//! [`McpClient`] sits on top of any of them.

pub mod client;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod sse;
pub mod sse_parser;
pub mod stdio;
pub mod streamable;
pub mod transport;

pub use client::McpClient;
pub use error::{RequestFailure, TransportError};
pub use sse::{SseConfig, SseTransport};
pub use stdio::{StdioConfig, StdioTransport};
pub use streamable::{StreamableConfig, StreamableTransport};
pub use transport::{McpTransport, Reply, TransportKind};
