//! Provider adapters: one tool-use protocol each, one common contract.

pub mod free_text;
pub mod inline;
pub mod structured;

pub use free_text::FreeTextAdapter;
pub use inline::InlineCallAdapter;
pub use structured::StructuredCallAdapter;

use crate::llm::CompletionParams;
use crate::tool_registry::ToolRegistry;
use async_trait::async_trait;
use serde_json::{Map, Value};
use toolchat_core::{ChatError, LlmConfig, ModelError, ProviderKind, ToolDescriptor, Turn};

/// Answer recorded when the tool-round cap stops a loop and the model gave no text.
pub const TOOL_ROUND_LIMIT_NOTICE: &str =
    "Stopped after reaching the tool-call limit for this message.";

/// Common contract of the three adapters.
///
/// Each adapter exclusively owns its transcript. `&mut self` on `send_message`
/// means one call in flight per adapter instance.
#[async_trait]
pub trait ProviderAdapter: Send {
    fn provider(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Run one user message through the model (and any tool calls) to a final answer.
    async fn send_message(&mut self, text: &str) -> Result<String, ChatError>;

    /// Replace the tool snapshot; visible to the next send.
    fn update_tools(&mut self, tools: Vec<ToolDescriptor>);

    fn tools(&self) -> &ToolRegistry;

    fn clear_history(&mut self);

    /// Provider-neutral copy of the transcript.
    fn history(&self) -> Vec<Turn>;
}

/// Settings every adapter takes from the LLM configuration.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub model: String,
    pub params: CompletionParams,
    pub max_tool_rounds: usize,
}

impl AdapterOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            params: CompletionParams::default(),
            max_tool_rounds: 16,
        }
    }
}

impl From<&LlmConfig> for AdapterOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model_name().to_string(),
            params: CompletionParams::from(config),
            max_tool_rounds: config.max_tool_rounds.max(1),
        }
    }
}

/// An unreadable body becomes the empty response so the session stays usable.
pub(crate) fn default_on_decode<T: Default>(result: Result<T, ModelError>) -> Result<T, ModelError> {
    match result {
        Err(ModelError::Decode(detail)) => {
            tracing::warn!("Unreadable response treated as an empty answer: {}", detail);
            Ok(T::default())
        }
        other => other,
    }
}

pub(crate) fn synthesize_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Tool arguments must be a JSON object; `null` counts as no arguments.
pub(crate) fn arguments_object(tool_name: &str, value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(format!(
            "arguments for '{}' must be a JSON object, got {}",
            tool_name,
            json_kind(&other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex;
    use toolchat_core::{ParameterSchema, ToolDescriptor, ToolGateway, ToolOutcome};

    /// Records every call; answers `fail_with` for the named tool, echoes arguments otherwise.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
        pub failing: Option<(String, String)>,
    }

    impl RecordingGateway {
        pub fn failing(tool: &str, reason: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: Some((tool.to_string(), reason.to_string())),
            }
        }

        pub fn names(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    #[async_trait]
    impl ToolGateway for RecordingGateway {
        async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            match &self.failing {
                Some((tool, reason)) if tool == name => ToolOutcome::failure(reason.clone()),
                _ => ToolOutcome::ok(Value::Object(arguments.clone())),
            }
        }
    }

    pub fn echo_tool() -> ToolDescriptor {
        ToolDescriptor::new(
            "echo",
            "Echo a message back",
            ParameterSchema::from_json_schema(&serde_json::json!({
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_synthesized_ids_are_unique() {
        let a = synthesize_call_id();
        let b = synthesize_call_id();
        assert!(a.starts_with("call_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_arguments_object() {
        assert!(arguments_object("t", json!({"a": 1})).is_ok());
        assert!(arguments_object("t", Value::Null).unwrap().is_empty());
        let err = arguments_object("t", json!([1, 2])).unwrap_err();
        assert!(err.contains("an array"));
    }

    #[test]
    fn test_options_from_config() {
        let config = LlmConfig {
            max_tool_rounds: 0,
            ..LlmConfig::default()
        };
        let options = AdapterOptions::from(&config);
        assert_eq!(options.max_tool_rounds, 1);
        assert_eq!(options.model, config.model_name());
    }
}
