//! Tool surface of plone-mcp.
//!
//! Ties the REST client and the block assembly engine together behind a set of
//! MCP tools, and serves them over a JSON-RPC 2.0 stdio transport.

pub mod mcp;
pub mod service;
pub mod tools;

pub use mcp::{McpServer, StdioTransport};
pub use service::ContentService;
pub use tools::{TOOL_NAMES, ToolDefinition, catalog};
