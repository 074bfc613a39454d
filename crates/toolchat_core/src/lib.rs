//! Shared types for the tool-calling chat core: tool descriptors and outcomes,
//! the provider-neutral transcript view, errors and configuration.

pub mod config;
pub mod error;
pub mod tools;
pub mod turn;

pub use config::{AppConfig, BudgetConfig, LlmConfig, McpServerConfig, ProviderKind};
pub use error::{ChatError, ConfigError, ModelError};
pub use tools::{ParameterSchema, ToolCatalog, ToolDescriptor, ToolGateway, ToolInvocation, ToolOutcome};
pub use turn::{find_orphaned_calls, Turn};
