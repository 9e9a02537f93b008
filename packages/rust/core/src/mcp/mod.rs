//! Model Context Protocol server over stdio.
//!
//! JSON-RPC 2.0 messages, one per line. The transport reads and writes lines,
//! the server handles the lifecycle methods and forwards `tools/call` to the
//! [`ContentService`](crate::ContentService).
//!
//! Targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::StdioTransport;
