//! Tool abstraction types: shared between the provider adapters and the MCP gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Results longer than this are cut before being fed back to a model (~2K tokens).
pub const MAX_TOOL_RESULT_LEN: usize = 8192;

/// A callable tool as described by the tool provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

/// JSON Schema for tool parameters (always an object schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Value,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Value::Object(Map::new()),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    /// Build from a raw JSON schema object, keeping only `properties` and `required`.
    pub fn from_json_schema(schema: &Value) -> Self {
        let properties = schema
            .get("properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let required = schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            schema_type: "object".to_string(),
            properties,
            required,
        }
    }

    /// Property names paired with their declared type, in schema order.
    pub fn property_types(&self) -> Vec<(String, String)> {
        match self.properties.as_object() {
            Some(props) => props
                .iter()
                .map(|(name, spec)| {
                    let ty = spec
                        .get("type")
                        .and_then(|t| t.as_str())
                        .unwrap_or("any")
                        .to_string();
                    (name.clone(), ty)
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: ParameterSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A model's request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Result of a tool execution. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(reason.into()),
        }
    }

    /// Human-readable failure reason (empty for successes).
    pub fn reason(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    /// Text fed back to the model: the serialized value on success, the reason on failure.
    pub fn render_for_model(&self) -> String {
        let raw = if self.success {
            match &self.result {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "[no output]".to_string(),
                Some(other) => other.to_string(),
            }
        } else {
            match self.error.as_deref() {
                Some(reason) if !reason.is_empty() => reason.to_string(),
                _ => "tool execution failed".to_string(),
            }
        };
        truncate_tool_text(raw)
    }
}

/// Truncate overly long tool output on a UTF-8 boundary, preferring a newline cut.
fn truncate_tool_text(mut text: String) -> String {
    if text.len() <= MAX_TOOL_RESULT_LEN {
        return text;
    }
    let mut boundary = MAX_TOOL_RESULT_LEN;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    text.truncate(boundary);
    if let Some(last_newline) = text.rfind('\n') {
        text.truncate(last_newline);
    }
    text.push_str("\n... [truncated, output too long]");
    text
}

/// Executes tools on behalf of an adapter.
///
/// Implementations must never fail across this boundary: transport and tool
/// errors come back as `ToolOutcome::failure`.
#[async_trait::async_trait]
pub trait ToolGateway: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome;
}

/// Lists the tools a provider currently exposes.
#[async_trait::async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>>;
}
