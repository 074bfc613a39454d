//! Structured-call adapter: tool requests arrive as typed `tool_use` content blocks.

use super::{arguments_object, default_on_decode, synthesize_call_id, AdapterOptions, ProviderAdapter, TOOL_ROUND_LIMIT_NOTICE};
use crate::api_types::{ContentBlock, Message, MessagesRequest, Role, ToolSpec};
use crate::llm::MessagesClient;
use crate::tool_registry::ToolRegistry;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use toolchat_core::{
    ChatError, ProviderKind, ToolDescriptor, ToolGateway, ToolInvocation, ToolOutcome, Turn,
};

pub struct StructuredCallAdapter {
    client: Arc<dyn MessagesClient>,
    gateway: Arc<dyn ToolGateway>,
    registry: ToolRegistry,
    tool_specs: Vec<ToolSpec>,
    options: AdapterOptions,
    transcript: Vec<Message>,
}

impl StructuredCallAdapter {
    pub fn new(
        client: Arc<dyn MessagesClient>,
        gateway: Arc<dyn ToolGateway>,
        tools: Vec<ToolDescriptor>,
        options: AdapterOptions,
    ) -> Self {
        let registry = ToolRegistry::new(tools);
        let tool_specs = registry.descriptors().iter().map(ToolSpec::from).collect();
        Self {
            client,
            gateway,
            registry,
            tool_specs,
            options,
            transcript: Vec::new(),
        }
    }

    fn request(&self) -> MessagesRequest {
        MessagesRequest {
            model: self.options.model.clone(),
            messages: self.transcript.clone(),
            max_tokens: self.options.params.max_tokens,
            temperature: self.options.params.temperature,
            tools: self.tool_specs.clone(),
        }
    }

    /// Run each requested tool in emitted order and build the matching result blocks.
    async fn run_tool_batch(&self, calls: Vec<(String, String, Value)>) -> Vec<ContentBlock> {
        let mut results = Vec::with_capacity(calls.len());
        for (id, name, input) in calls {
            let outcome = match arguments_object(&name, input) {
                Ok(arguments) => {
                    tracing::info!("Tool call: {}", name);
                    self.gateway.call_tool(&name, &arguments).await
                }
                Err(reason) => ToolOutcome::failure(reason),
            };
            if !outcome.success {
                tracing::warn!("Tool '{}' failed: {}", name, outcome.reason());
            }
            results.push(ContentBlock::ToolResult {
                tool_use_id: id,
                content: outcome.render_for_model(),
                is_error: (!outcome.success).then_some(true),
            });
        }
        results
    }
}

fn text_of(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl ProviderAdapter for StructuredCallAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.options.model
    }

    async fn send_message(&mut self, text: &str) -> Result<String, ChatError> {
        tracing::info!(model = %self.options.model, "Structured-call send ({} chars)", text.len());
        self.transcript.push(Message::user_text(text));

        let mut rounds = 0usize;
        loop {
            let response = default_on_decode(self.client.create_message(&self.request()).await)?;
            tracing::debug!("stop_reason={:?}", response.stop_reason);

            let mut blocks: Vec<ContentBlock> = response
                .content
                .into_iter()
                .filter(|b| !matches!(b, ContentBlock::Unsupported))
                .collect();

            let mut calls = Vec::new();
            for block in blocks.iter_mut() {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    if id.is_empty() {
                        *id = synthesize_call_id();
                    }
                    calls.push((id.clone(), name.clone(), input.clone()));
                }
            }

            let answer = text_of(&blocks);
            if calls.is_empty() {
                if !blocks.is_empty() {
                    self.transcript.push(Message {
                        role: Role::Assistant,
                        content: blocks,
                    });
                }
                return Ok(answer);
            }

            tracing::debug!("Tool-use round {}: {} call(s)", rounds + 1, calls.len());
            self.transcript.push(Message {
                role: Role::Assistant,
                content: blocks,
            });
            let results = self.run_tool_batch(calls).await;
            self.transcript.push(Message {
                role: Role::User,
                content: results,
            });

            rounds += 1;
            if rounds >= self.options.max_tool_rounds {
                tracing::warn!(
                    "Tool-use loop stopped after {} rounds without a final answer",
                    rounds
                );
                let answer = if answer.trim().is_empty() {
                    TOOL_ROUND_LIMIT_NOTICE.to_string()
                } else {
                    answer
                };
                self.transcript.push(Message {
                    role: Role::Assistant,
                    content: vec![ContentBlock::Text {
                        text: answer.clone(),
                    }],
                });
                return Ok(answer);
            }
        }
    }

    fn update_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.registry = ToolRegistry::new(tools);
        self.tool_specs = self.registry.descriptors().iter().map(ToolSpec::from).collect();
        tracing::debug!("Structured-call adapter now has {} tools", self.registry.len());
    }

    fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    fn clear_history(&mut self) {
        self.transcript.clear();
    }

    fn history(&self) -> Vec<Turn> {
        let mut names: HashMap<&str, &str> = HashMap::new();
        let mut turns = Vec::new();

        for message in &self.transcript {
            match message.role {
                Role::Assistant => {
                    let tool_calls = message
                        .content
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::ToolUse { id, name, input } => {
                                names.insert(id.as_str(), name.as_str());
                                Some(ToolInvocation {
                                    id: id.clone(),
                                    name: name.clone(),
                                    arguments: input.as_object().cloned().unwrap_or_default(),
                                })
                            }
                            _ => None,
                        })
                        .collect();
                    turns.push(Turn::Assistant {
                        text: text_of(&message.content),
                        tool_calls,
                    });
                }
                Role::User => {
                    for block in &message.content {
                        if let ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } = block
                        {
                            let outcome = if is_error.unwrap_or(false) {
                                ToolOutcome::failure(content.clone())
                            } else {
                                ToolOutcome::ok(Value::String(content.clone()))
                            };
                            turns.push(Turn::ToolResult {
                                call_id: tool_use_id.clone(),
                                tool_name: names
                                    .get(tool_use_id.as_str())
                                    .map(|n| n.to_string())
                                    .unwrap_or_default(),
                                outcome,
                            });
                        }
                    }
                    let text = text_of(&message.content);
                    if !text.is_empty() {
                        turns.push(Turn::user(text));
                    }
                }
            }
        }
        turns
    }
}
