use crate::api_types::{
    ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, MessagesRequest,
    MessagesResponse,
};
use async_trait::async_trait;
use toolchat_core::{LlmConfig, ModelError};

/// Sampling parameters shared by every request an adapter sends.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    /// Maximum tokens to generate; also reserved out of the context ceiling.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0). `None` leaves the provider default.
    pub temperature: Option<f32>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: Some(0.7),
        }
    }
}

impl From<&LlmConfig> for CompletionParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Messages API with structured tool-use blocks.
#[async_trait]
pub trait MessagesClient: Send + Sync {
    async fn create_message(&self, request: &MessagesRequest) -> Result<MessagesResponse, ModelError>;
}

/// Chat Completions API with inline function calls.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn create_chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError>;
}

/// Plain prompt-in, text-out generation.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ModelError>;
}
