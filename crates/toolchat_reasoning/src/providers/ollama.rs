//! Ollama native generate endpoint.
//!
//! Local models are driven with a single prompt string; no tool schema is sent.

use crate::api_types::{GenerateRequest, GenerateResponse};
use crate::llm::GenerateClient;
use crate::retry::{with_retry, RetryConfig};
use reqwest::Client;
use toolchat_core::{ConfigError, ModelError};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl OllamaClient {
    /// Accepts either the server root or its OpenAI-compatible `/v1` path.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(base_url);
        if base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl {
                provider: toolchat_core::ProviderKind::Ollama,
            });
        }
        Ok(Self {
            client: super::build_http_client(timeout_secs)?,
            base_url,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

#[async_trait::async_trait]
impl GenerateClient for OllamaClient {
    #[tracing::instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        tracing::debug!("Ollama prompt length: {} chars", request.prompt.len());

        let response = with_retry(&self.retry, "Ollama", || {
            self.client.post(&url).json(request).send()
        })
        .await?;

        super::decode_body("Ollama", response).await
    }
}
