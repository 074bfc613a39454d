//! Inline function-call adapter: tool calls ride on the assistant message as
//! a flat list with JSON-encoded argument strings. The only adapter that
//! enforces a context budget.

use super::{arguments_object, default_on_decode, synthesize_call_id, AdapterOptions, ProviderAdapter, TOOL_ROUND_LIMIT_NOTICE};
use crate::api_types::{ChatMessage, ChatRequest, ChatResponse, FunctionTool, ToolCall};
use crate::budget::ContextBudget;
use crate::llm::ChatClient;
use crate::prompts::PromptAssembler;
use crate::tool_registry::ToolRegistry;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use toolchat_core::{
    ChatError, ModelError, ProviderKind, ToolDescriptor, ToolGateway, ToolInvocation, ToolOutcome,
    Turn,
};

/// Prefix marking a failed tool result; the protocol has no error flag.
const TOOL_ERROR_PREFIX: &str = "Error: ";

pub struct InlineCallAdapter {
    client: Arc<dyn ChatClient>,
    gateway: Arc<dyn ToolGateway>,
    registry: ToolRegistry,
    function_tools: Vec<FunctionTool>,
    tool_cost: u32,
    budget: ContextBudget,
    options: AdapterOptions,
    transcript: Vec<ChatMessage>,
    /// Ids of tool calls whose outcome was a failure.
    failed_calls: HashSet<String>,
}

impl InlineCallAdapter {
    pub fn new(
        client: Arc<dyn ChatClient>,
        gateway: Arc<dyn ToolGateway>,
        tools: Vec<ToolDescriptor>,
        options: AdapterOptions,
        budget: ContextBudget,
    ) -> Self {
        let mut adapter = Self {
            client,
            gateway,
            registry: ToolRegistry::default(),
            function_tools: Vec::new(),
            tool_cost: 0,
            budget,
            options,
            transcript: Vec::new(),
            failed_calls: HashSet::new(),
        };
        adapter.update_tools(tools);
        adapter
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Fit the transcript to the budget, then send it behind the dated system prompt.
    async fn complete(&mut self) -> Result<ChatResponse, ChatError> {
        let system = PromptAssembler::dated_system_prompt(chrono::Local::now().date_naive());
        let preamble_cost = ContextBudget::estimate_text(&system);
        let available = self.budget.available(self.tool_cost, preamble_cost)?;
        let report = self.budget.fit(&mut self.transcript, available);
        if report.removed > 0 {
            let live: HashSet<&str> = self
                .transcript
                .iter()
                .filter_map(|m| match m {
                    ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                    _ => None,
                })
                .collect();
            self.failed_calls.retain(|id| live.contains(id.as_str()));
        }
        tracing::debug!(
            "Context estimate: {} tokens of {} available (tools {}, preamble {})",
            report.after,
            available,
            self.tool_cost,
            preamble_cost
        );

        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        messages.push(ChatMessage::System { content: system });
        messages.extend(self.transcript.iter().cloned());

        let request = ChatRequest {
            model: self.options.model.clone(),
            messages,
            tools: self.function_tools.clone(),
            max_tokens: self.options.params.max_tokens,
            temperature: self.options.params.temperature,
        };
        Ok(default_on_decode(self.client.create_chat_completion(&request).await)?)
    }

    async fn run_tool_calls(&mut self, calls: Vec<ToolCall>) {
        for call in calls {
            let name = call.function.name.clone();
            let outcome = match parse_arguments(&name, &call.function.arguments) {
                Ok(arguments) => {
                    tracing::info!("Tool call: {}", name);
                    self.gateway.call_tool(&name, &arguments).await
                }
                Err(reason) => ToolOutcome::failure(reason),
            };
            let content = if outcome.success {
                outcome.render_for_model()
            } else {
                tracing::warn!("Tool '{}' failed: {}", name, outcome.reason());
                self.failed_calls.insert(call.id.clone());
                format!("{}{}", TOOL_ERROR_PREFIX, outcome.render_for_model())
            };
            self.transcript.push(ChatMessage::Tool {
                tool_call_id: call.id,
                content,
            });
        }
    }
}

/// Decode a JSON-encoded argument string. Empty means no arguments.
fn parse_arguments(tool_name: &str, raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| format!("could not parse arguments for '{}': {}", tool_name, e))?;
    arguments_object(tool_name, value)
}

#[async_trait]
impl ProviderAdapter for InlineCallAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.options.model
    }

    async fn send_message(&mut self, text: &str) -> Result<String, ChatError> {
        tracing::info!(model = %self.options.model, "Inline-call send ({} chars)", text.len());
        self.transcript.push(ChatMessage::user(text));

        let mut recovered = false;
        let mut rounds = 0usize;
        loop {
            let response = match self.complete().await {
                Ok(response) => response,
                Err(ChatError::Model(ModelError::ContextOverflow(detail))) if !recovered => {
                    tracing::warn!(
                        "Provider rejected the prompt as too long ({}); clearing history and retrying once",
                        detail.chars().take(200).collect::<String>()
                    );
                    recovered = true;
                    self.transcript.clear();
                    self.failed_calls.clear();
                    self.transcript.push(ChatMessage::user(text));
                    continue;
                }
                Err(ChatError::Model(ModelError::ContextOverflow(_))) => {
                    tracing::error!("Prompt still too long after clearing history");
                    return Err(ChatError::ContextExhausted {
                        model: self.options.model.clone(),
                        ceiling: self.budget.ceiling(),
                    });
                }
                Err(e) => return Err(e),
            };

            let Some(choice) = response.choices.into_iter().next() else {
                tracing::warn!("Response carried no choices; treating as empty answer");
                return Ok(String::new());
            };
            tracing::debug!("finish_reason={:?}", choice.finish_reason);

            let content = choice.message.content.unwrap_or_default();
            let mut calls = choice.message.tool_calls.unwrap_or_default();
            if calls.is_empty() {
                if !content.is_empty() {
                    self.transcript.push(ChatMessage::assistant(content.clone()));
                }
                return Ok(content);
            }

            for call in calls.iter_mut() {
                if call.id.is_empty() {
                    call.id = synthesize_call_id();
                }
                call.kind = "function".to_string();
            }
            tracing::debug!("Tool-use round {}: {} call(s)", rounds + 1, calls.len());
            self.transcript.push(ChatMessage::Assistant {
                content: (!content.is_empty()).then(|| content.clone()),
                tool_calls: calls.clone(),
            });
            self.run_tool_calls(calls).await;

            rounds += 1;
            if rounds >= self.options.max_tool_rounds {
                tracing::warn!(
                    "Tool-use loop stopped after {} rounds without a final answer",
                    rounds
                );
                let answer = if content.trim().is_empty() {
                    TOOL_ROUND_LIMIT_NOTICE.to_string()
                } else {
                    content
                };
                self.transcript.push(ChatMessage::assistant(answer.clone()));
                return Ok(answer);
            }
        }
    }

    fn update_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.registry = ToolRegistry::new(tools);
        self.function_tools = self
            .registry
            .descriptors()
            .iter()
            .map(FunctionTool::from)
            .collect();
        self.tool_cost = if self.function_tools.is_empty() {
            0
        } else {
            ContextBudget::estimate_text(&serde_json::to_string(&self.function_tools).unwrap_or_default())
        };
        tracing::debug!(
            "Inline-call adapter now has {} tools (~{} tokens)",
            self.registry.len(),
            self.tool_cost
        );
    }

    fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    fn clear_history(&mut self) {
        self.transcript.clear();
        self.failed_calls.clear();
    }

    fn history(&self) -> Vec<Turn> {
        let mut names: HashMap<&str, &str> = HashMap::new();
        let mut turns = Vec::new();

        for message in &self.transcript {
            match message {
                ChatMessage::System { .. } => {}
                ChatMessage::User { content } => turns.push(Turn::user(content.clone())),
                ChatMessage::Assistant { content, tool_calls } => {
                    let tool_calls = tool_calls
                        .iter()
                        .map(|call| {
                            names.insert(call.id.as_str(), call.function.name.as_str());
                            ToolInvocation {
                                id: call.id.clone(),
                                name: call.function.name.clone(),
                                arguments: parse_arguments(&call.function.name, &call.function.arguments)
                                    .unwrap_or_default(),
                            }
                        })
                        .collect();
                    turns.push(Turn::Assistant {
                        text: content.clone().unwrap_or_default(),
                        tool_calls,
                    });
                }
                ChatMessage::Tool {
                    tool_call_id,
                    content,
                } => {
                    let outcome = if self.failed_calls.contains(tool_call_id) {
                        let reason = content.strip_prefix(TOOL_ERROR_PREFIX).unwrap_or(content.as_str());
                        ToolOutcome::failure(reason)
                    } else {
                        ToolOutcome::ok(Value::String(content.clone()))
                    };
                    turns.push(Turn::ToolResult {
                        call_id: tool_call_id.clone(),
                        tool_name: names
                            .get(tool_call_id.as_str())
                            .map(|n| n.to_string())
                            .unwrap_or_default(),
                        outcome,
                    });
                }
            }
        }
        turns
    }
}
