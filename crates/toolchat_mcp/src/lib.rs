//! MCP-backed tool gateway: spawns stdio servers, lists their tools and
//! routes calls by tool name.

pub mod bridge;
pub mod manager;

pub use bridge::McpGateway;
pub use manager::McpManager;
