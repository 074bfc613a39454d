//! Adapter selection: the only place that branches on provider identity.

use crate::adapters::{
    AdapterOptions, FreeTextAdapter, InlineCallAdapter, ProviderAdapter, StructuredCallAdapter,
};
use crate::budget::ContextBudget;
use crate::providers::{AnthropicClient, OllamaClient, OpenAiClient};
use std::sync::Arc;
use toolchat_core::{ConfigError, LlmConfig, ProviderKind, ToolDescriptor, ToolGateway};

/// Validate `config` and build the matching adapter. Performs no network I/O.
pub fn create_adapter(
    config: &LlmConfig,
    tools: Vec<ToolDescriptor>,
    gateway: Arc<dyn ToolGateway>,
) -> Result<Box<dyn ProviderAdapter>, ConfigError> {
    validate_common(config)?;
    let options = AdapterOptions::from(config);
    let timeout = config.request_timeout_secs();

    let adapter: Box<dyn ProviderAdapter> = match config.provider {
        ProviderKind::Anthropic => {
            let api_key = require_credential(config)?;
            let client = AnthropicClient::new(api_key, config.base_url.as_deref(), timeout)?;
            Box::new(StructuredCallAdapter::new(Arc::new(client), gateway, tools, options))
        }
        ProviderKind::OpenAi => {
            let api_key = require_credential(config)?;
            let client = OpenAiClient::new(api_key, config.base_url.as_deref(), timeout)?;
            let budget = ContextBudget::new(
                config.context_window(),
                config.max_tokens,
                config.budget.clone(),
            );
            Box::new(InlineCallAdapter::new(
                Arc::new(client),
                gateway,
                tools,
                options,
                budget,
            ))
        }
        ProviderKind::Ollama => {
            let base_url = config
                .base_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .ok_or(ConfigError::MissingBaseUrl {
                    provider: ProviderKind::Ollama,
                })?;
            let client = OllamaClient::new(base_url, timeout)?;
            Box::new(FreeTextAdapter::new(
                Arc::new(client),
                gateway,
                tools,
                options,
                config.history_window,
            ))
        }
    };

    tracing::info!(
        "Created {} adapter for model {}",
        adapter.provider(),
        adapter.model()
    );
    Ok(adapter)
}

fn require_credential(config: &LlmConfig) -> Result<&str, ConfigError> {
    config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(ConfigError::MissingCredential {
            provider: config.provider,
        })
}

fn validate_common(config: &LlmConfig) -> Result<(), ConfigError> {
    if config.model_name().trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "model",
            reason: "must not be empty".into(),
        });
    }
    if config.max_tokens == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_tokens",
            reason: "must be greater than zero".into(),
        });
    }
    if let Some(t) = config.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(ConfigError::InvalidValue {
                field: "temperature",
                reason: format!("{t} is outside 0.0..=2.0"),
            });
        }
    }
    let b = &config.budget;
    if !(0.0..=1.0).contains(&b.narrow_threshold) {
        return Err(ConfigError::InvalidValue {
            field: "budget.narrow_threshold",
            reason: format!("{} is outside 0.0..=1.0", b.narrow_threshold),
        });
    }
    Ok(())
}
