//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 over newline-delimited stdio, exposing the retrieval and clinical
//! note operations as tools.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

pub use errors::McpError;
pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::{ToolContext, register_tools};
