pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use mock::ScriptedClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use toolchat_core::{ConfigError, ModelError};

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Read a successful response body and decode it, logging a bounded preview.
///
/// A blank body decodes to `T::default()`, which every adapter reads as an empty answer.
pub(crate) async fn decode_body<T: DeserializeOwned + Default>(
    provider_name: &str,
    response: reqwest::Response,
) -> Result<T, ModelError> {
    let text = response
        .text()
        .await
        .map_err(|e| ModelError::Transport(format!("{provider_name}: {e}")))?;
    tracing::debug!(
        "{} raw response (first 2000 chars): {}",
        provider_name,
        text.chars().take(2000).collect::<String>()
    );
    if text.trim().is_empty() {
        tracing::warn!("{} returned an empty body", provider_name);
        return Ok(T::default());
    }
    serde_json::from_str(&text).map_err(|e| ModelError::Decode(format!("{provider_name}: {e}")))
}
