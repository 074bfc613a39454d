//! Error taxonomy for the chat core.
//!
//! Per-tool failures are not here: they travel as `ToolOutcome` values.

use crate::config::ProviderKind;
use thiserror::Error;

/// Raised before any network call; never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{provider} requires an API key (set `api_key` or the provider's key variable)")]
    MissingCredential { provider: ProviderKind },

    #[error("{provider} requires a base URL pointing at a reachable server")]
    MissingBaseUrl { provider: ProviderKind },

    #[error("unknown provider '{0}' (expected anthropic, openai or ollama)")]
    UnknownProvider(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// A failed model call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request exceeds the model's context window: {0}")]
    ContextOverflow(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),
}

impl ModelError {
    /// Classify an unsuccessful HTTP response.
    ///
    /// Providers report oversized prompts as 400/413 with a recognisable message.
    pub fn from_status(status: u16, body: String) -> Self {
        if (status == 400 || status == 413) && is_context_overflow_message(&body) {
            ModelError::ContextOverflow(body)
        } else {
            ModelError::Api { status, body }
        }
    }
}

/// True when a provider error message says the prompt did not fit.
pub fn is_context_overflow_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context_length_exceeded")
        || lower.contains("context length")
        || lower.contains("maximum context")
        || lower.contains("context window")
        || lower.contains("too many tokens")
        || lower.contains("prompt is too long")
}

/// Everything `send` can surface to the caller. `Display` is a single readable line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    #[error("no provider is configured; connect one before sending messages")]
    NotConfigured,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error(
        "context window of {ceiling} tokens is too small for the current tools \
         (they need about {required} tokens before any conversation)"
    )]
    CeilingTooSmall { ceiling: u32, required: u32 },

    #[error(
        "the conversation no longer fits {model}'s {ceiling}-token context window, even after \
         clearing history; try a model with a larger context window"
    )]
    ContextExhausted { model: String, ceiling: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_classification() {
        let err = ModelError::from_status(
            400,
            r#"{"error":{"code":"context_length_exceeded","message":"This model's maximum context length is 8192 tokens"}}"#.into(),
        );
        assert!(matches!(err, ModelError::ContextOverflow(_)));
    }

    #[test]
    fn test_anthropic_overflow_message() {
        let err = ModelError::from_status(400, "prompt is too long: 210000 tokens > 200000 maximum".into());
        assert!(matches!(err, ModelError::ContextOverflow(_)));
    }

    #[test]
    fn test_plain_bad_request_is_api_error() {
        let err = ModelError::from_status(400, "invalid model".into());
        assert_eq!(
            err,
            ModelError::Api {
                status: 400,
                body: "invalid model".into()
            }
        );
    }

    #[test]
    fn test_server_error_never_overflow() {
        let err = ModelError::from_status(500, "context length".into());
        assert!(matches!(err, ModelError::Api { status: 500, .. }));
    }

    #[test]
    fn test_messages_are_single_line() {
        let errors = vec![
            ChatError::NotConfigured,
            ChatError::Config(ConfigError::MissingCredential {
                provider: ProviderKind::OpenAi,
            }),
            ChatError::CeilingTooSmall {
                ceiling: 1000,
                required: 4000,
            },
            ChatError::ContextExhausted {
                model: "gpt-4".into(),
                ceiling: 8192,
            },
        ];
        for e in errors {
            let s = e.to_string();
            assert!(!s.contains('\n'), "multi-line error: {s}");
        }
    }

    #[test]
    fn test_exhausted_names_ceiling() {
        let msg = ChatError::ContextExhausted {
            model: "gpt-4".into(),
            ceiling: 8192,
        }
        .to_string();
        assert!(msg.contains("8192"));
        assert!(msg.contains("larger context"));
    }
}
