use crate::api_types::{MessagesRequest, MessagesResponse};
use crate::llm::MessagesClient;
use crate::retry::{with_retry, RetryConfig};
use reqwest::Client;
use toolchat_core::{ConfigError, ModelError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl AnthropicClient {
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
impl MessagesClient for AnthropicClient {
    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn create_message(&self, request: &MessagesRequest) -> Result<MessagesResponse, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);

        if tracing::enabled!(tracing::Level::DEBUG) {
            // Tool definitions are the usual culprit when a request is rejected.
            let tools_json = serde_json::to_string(&request.tools).unwrap_or_default();
            tracing::debug!("Anthropic tools payload ({}): {}", request.tools.len(), tools_json);
        }
        tracing::debug!(
            "LLM params: max_tokens={}, temperature={:?}, messages={}",
            request.max_tokens,
            request.temperature,
            request.messages.len()
        );

        let response = with_retry(&self.retry, "Anthropic", || {
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(request)
                .send()
        })
        .await?;

        let parsed: MessagesResponse = super::decode_body("Anthropic", response).await?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Anthropic usage"
            );
        }
        Ok(parsed)
    }
}
