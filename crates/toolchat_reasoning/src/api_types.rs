//! Wire types for the three model protocols.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use toolchat_core::{ParameterSchema, ToolDescriptor};

// ============================================================================
// Messages API: structured tool-call blocks (Anthropic)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Block kinds this core does not use (thinking, images, ...). Never sent back.
    #[serde(other)]
    Unsupported,
}

/// Tool definition in the Messages API dialect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: ParameterSchema,
}

impl From<&ToolDescriptor> for ToolSpec {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

// ============================================================================
// Chat Completions: inline function calls (OpenAI)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, ChatMessage::User { .. })
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ChatMessage::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Carries tool calls or a tool result.
    pub fn is_tool_bearing(&self) -> bool {
        matches!(self, ChatMessage::Tool { .. }) || !self.tool_calls().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments. Some compatible servers send an object; it is re-encoded.
    #[serde(default, deserialize_with = "string_or_json")]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Tool definition in the Chat Completions dialect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl From<&ToolDescriptor> for FunctionTool {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<FunctionTool>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

// ============================================================================
// Generate: plain prompt completion (Ollama)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_block_roundtrip_shape() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".into(),
            name: "echo".into(),
            input: json!({"message": "hi"}),
        };
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["type"], "tool_use");
        assert_eq!(v["input"]["message"], "hi");
    }

    #[test]
    fn test_unknown_block_kind_tolerated() {
        let resp: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "ok"}
            ],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(resp.content.len(), 2);
        assert_eq!(resp.content[0], ContentBlock::Unsupported);
    }

    #[test]
    fn test_empty_messages_response() {
        let resp: MessagesResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.content.is_empty());
    }

    #[test]
    fn test_tool_result_omits_absent_error_flag() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "t".into(),
            content: "fine".into(),
            is_error: None,
        };
        let v = serde_json::to_value(&block).unwrap();
        assert!(v.get("is_error").is_none());
    }

    #[test]
    fn test_chat_message_roles() {
        let v = serde_json::to_value(ChatMessage::Tool {
            tool_call_id: "call_1".into(),
            content: "42".into(),
        })
        .unwrap();
        assert_eq!(v, json!({"role": "tool", "tool_call_id": "call_1", "content": "42"}));

        let v = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(v, json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_tool_call_arguments_accept_object() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "call_1",
            "function": {"name": "echo", "arguments": {"message": "hi"}}
        }))
        .unwrap();
        assert_eq!(call.kind, "function");
        let parsed: Value = serde_json::from_str(&call.function.arguments).unwrap();
        assert_eq!(parsed["message"], "hi");
    }

    #[test]
    fn test_chat_response_null_tool_calls() {
        let resp: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "hey", "tool_calls": null}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert!(resp.choices[0].message.tool_calls.is_none());
    }

    #[test]
    fn test_function_tool_shape() {
        let tool = ToolDescriptor::new("echo", "Echo a message", ParameterSchema::default());
        let v = serde_json::to_value(FunctionTool::from(&tool)).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "echo");
        assert_eq!(v["function"]["parameters"]["type"], "object");
    }
}
