use crate::api_types::{ChatRequest, ChatResponse};
use crate::llm::ChatClient;
use crate::retry::{with_retry, RetryConfig};
use reqwest::Client;
use toolchat_core::{ConfigError, ModelError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl OpenAiClient {
    /// `base_url` includes the version segment (e.g. `https://api.openai.com/v1`).
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: super::build_http_client(timeout_secs)?,
            api_key: api_key.into(),
            base_url,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiClient {
    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn create_chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            "OpenAI request: messages={}, tools={}, max_tokens={}",
            request.messages.len(),
            request.tools.len(),
            request.max_tokens
        );

        let response = with_retry(&self.retry, "OpenAI", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
        })
        .await?;

        let parsed: ChatResponse = super::decode_body("OpenAI", response).await?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }
        Ok(parsed)
    }
}
