//! Free-text adapter for local models with no native tool-calling.
//!
//! The model is told to answer with a `{"tool_name", "parameters"}` object when
//! it wants a tool. At most one tool runs per user message: there is no
//! reliable signal for a multi-step loop in plain completions.

use super::{default_on_decode, synthesize_call_id, AdapterOptions, ProviderAdapter};
use crate::api_types::{GenerateOptions, GenerateRequest};
use crate::llm::GenerateClient;
use crate::prompts::PromptAssembler;
use crate::text_tool_parser::{parse_tool_request, strip_reasoning_blocks};
use crate::tool_registry::ToolRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use toolchat_core::{ChatError, ProviderKind, ToolDescriptor, ToolGateway, ToolInvocation, Turn};

pub const EMPTY_FOLLOWUP_FALLBACK: &str =
    "The tool ran, but the model returned no follow-up response.";

pub struct FreeTextAdapter {
    client: Arc<dyn GenerateClient>,
    gateway: Arc<dyn ToolGateway>,
    registry: ToolRegistry,
    preamble: String,
    options: AdapterOptions,
    history_window: usize,
    history: Vec<Turn>,
}

impl FreeTextAdapter {
    pub fn new(
        client: Arc<dyn GenerateClient>,
        gateway: Arc<dyn ToolGateway>,
        tools: Vec<ToolDescriptor>,
        options: AdapterOptions,
        history_window: usize,
    ) -> Self {
        let registry = ToolRegistry::new(tools);
        let preamble = PromptAssembler::free_text_preamble(registry.descriptors());
        Self {
            client,
            gateway,
            registry,
            preamble,
            options,
            history_window,
            history: Vec::new(),
        }
    }

    fn request(&self, prompt: String) -> GenerateRequest {
        GenerateRequest {
            model: self.options.model.clone(),
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.options.params.max_tokens,
                temperature: self.options.params.temperature,
            },
        }
    }

    /// Preamble, the last `history_window` turns, then the new message.
    fn build_prompt(&self, text: &str) -> String {
        let skip = self.history.len().saturating_sub(self.history_window);
        let mut prompt = String::with_capacity(self.preamble.len() + text.len() + 256);
        prompt.push_str(&self.preamble);
        prompt.push_str("\n\n");
        for turn in &self.history[skip..] {
            match turn {
                Turn::User { text } => {
                    prompt.push_str("User: ");
                    prompt.push_str(text);
                }
                Turn::Assistant { text, .. } => {
                    prompt.push_str("Assistant: ");
                    prompt.push_str(text);
                }
                Turn::ToolResult {
                    tool_name, outcome, ..
                } => {
                    prompt.push_str(&format!(
                        "Tool '{}' returned: {}",
                        tool_name,
                        outcome.render_for_model()
                    ));
                }
            }
            prompt.push('\n');
        }
        prompt.push_str("User: ");
        prompt.push_str(text);
        prompt.push_str("\nAssistant:");
        prompt
    }
}

#[async_trait]
impl ProviderAdapter for FreeTextAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.options.model
    }

    async fn send_message(&mut self, text: &str) -> Result<String, ChatError> {
        tracing::info!(model = %self.options.model, "Free-text send ({} chars)", text.len());
        let prompt = self.build_prompt(text);
        tracing::debug!("Prompt length: {} chars", prompt.len());

        let completion = default_on_decode(self.client.generate(&self.request(prompt)).await)?;
        let completion = strip_reasoning_blocks(&completion.response);
        self.history.push(Turn::user(text));

        let Some(parsed) = parse_tool_request(&completion) else {
            self.history.push(Turn::assistant(completion.clone()));
            return Ok(completion);
        };

        let invocation = ToolInvocation {
            id: synthesize_call_id(),
            name: parsed.name,
            arguments: parsed.arguments,
        };
        tracing::info!("Tool call: {}", invocation.name);
        self.history.push(Turn::Assistant {
            text: completion,
            tool_calls: vec![invocation.clone()],
        });

        let outcome = self
            .gateway
            .call_tool(&invocation.name, &invocation.arguments)
            .await;
        if !outcome.success {
            tracing::warn!("Tool '{}' failed: {}", invocation.name, outcome.reason());
        }
        let rendered = outcome.render_for_model();
        self.history.push(Turn::ToolResult {
            call_id: invocation.id,
            tool_name: invocation.name.clone(),
            outcome,
        });

        let followup = PromptAssembler::tool_followup(&invocation.name, &rendered);
        let response = default_on_decode(self.client.generate(&self.request(followup)).await)?;
        let answer = strip_reasoning_blocks(&response.response);
        let answer = if answer.trim().is_empty() {
            EMPTY_FOLLOWUP_FALLBACK.to_string()
        } else {
            answer
        };
        self.history.push(Turn::assistant(answer.clone()));
        Ok(answer)
    }

    fn update_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.registry = ToolRegistry::new(tools);
        self.preamble = PromptAssembler::free_text_preamble(self.registry.descriptors());
        tracing::debug!("Free-text adapter now has {} tools", self.registry.len());
    }

    fn tools(&self) -> &ToolRegistry {
        &self.registry
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }

    fn history(&self) -> Vec<Turn> {
        self.history.clone()
    }
}
