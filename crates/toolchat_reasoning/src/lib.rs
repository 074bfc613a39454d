//! Provider-agnostic tool-calling orchestration.
//!
//! Three adapters normalise the structured-call, inline function-call and
//! free-text tool protocols behind [`ProviderAdapter`]; [`create_adapter`]
//! picks one from configuration and [`ChatSession`] drives it.

pub mod adapters;
pub mod api_types;
pub mod budget;
pub mod factory;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod session;
pub mod text_tool_parser;
pub mod tool_registry;

pub use adapters::{
    AdapterOptions, FreeTextAdapter, InlineCallAdapter, ProviderAdapter, StructuredCallAdapter,
};
pub use budget::{ContextBudget, TrimReport, TrimStage};
pub use factory::create_adapter;
pub use session::ChatSession;
pub use tool_registry::ToolRegistry;
