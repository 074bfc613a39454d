use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub mcp_servers: Vec<McpServerConfig>,
}

impl AppConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`AppConfig::load`], with overrides taken from `lookup` instead of the environment.
    pub fn load_with<P, F>(path: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_overrides_from(lookup);
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup (the environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm = &mut self.llm;

        if let Some(v) = lookup("LLM_PROVIDER") {
            match v.parse() {
                Ok(kind) => llm.provider = kind,
                Err(e) => tracing::warn!("Ignoring LLM_PROVIDER: {}", e),
            }
        }
        if let Some(v) = lookup("LLM_MODEL") {
            llm.model = Some(v);
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            llm.base_url = Some(v);
        }
        if let Some(v) = lookup("LLM_MAX_TOKENS") {
            match v.parse() {
                Ok(n) => llm.max_tokens = n,
                Err(_) => tracing::warn!("Ignoring unparseable LLM_MAX_TOKENS={}", v),
            }
        }
        if let Some(v) = lookup("LLM_TEMPERATURE") {
            match v.parse() {
                Ok(n) => llm.temperature = Some(n),
                Err(_) => tracing::warn!("Ignoring unparseable LLM_TEMPERATURE={}", v),
            }
        }
        if let Some(v) = lookup("LLM_CONTEXT_WINDOW") {
            match v.parse() {
                Ok(n) => llm.context_window = Some(n),
                Err(_) => tracing::warn!("Ignoring unparseable LLM_CONTEXT_WINDOW={}", v),
            }
        }

        // Provider-specific fallbacks only fill gaps left by the file
        match llm.provider {
            ProviderKind::Anthropic => {
                if llm.api_key.is_none() {
                    llm.api_key = lookup("ANTHROPIC_API_KEY");
                }
            }
            ProviderKind::OpenAi => {
                if llm.api_key.is_none() {
                    llm.api_key = lookup("OPENAI_API_KEY");
                }
            }
            ProviderKind::Ollama => {
                if llm.base_url.is_none() {
                    llm.base_url = lookup("OLLAMA_BASE_URL");
                }
            }
        }
    }
}

// ============================================================================
// Provider identity
// ============================================================================

/// The three tool-calling protocol families the core speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ProviderKind {
    /// Hosted, structured tool-call blocks (Anthropic Messages API).
    #[default]
    Anthropic,
    /// Hosted, inline function calls with string arguments (OpenAI Chat Completions).
    OpenAi,
    /// Local free-text completion without native tool calling (Ollama).
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-sonnet-4-5",
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Ollama => "llama3.1",
        }
    }

    pub fn is_hosted(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = ConfigError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    /// Falls back to the provider's default model when unset.
    pub model: Option<String>,
    /// Mandatory for hosted providers.
    pub api_key: Option<String>,
    /// Optional for hosted providers, mandatory for the local one.
    pub base_url: Option<String>,
    /// Output tokens requested per call; also the reserve held back from the context window.
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Overrides the context window looked up from the model name.
    pub context_window: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    /// Upper bound on model round-trips inside one tool-use loop.
    pub max_tool_rounds: usize,
    /// Turns of history included in free-text prompts.
    pub history_window: usize,
    pub budget: BudgetConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            api_key: None,
            base_url: None,
            max_tokens: 1024,
            temperature: Some(0.7),
            context_window: None,
            request_timeout_secs: None,
            max_tool_rounds: 16,
            history_window: 10,
            budget: BudgetConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn model_name(&self) -> &str {
        match self.model.as_deref() {
            Some(m) if !m.trim().is_empty() => m,
            _ => self.provider.default_model(),
        }
    }

    /// Context window in tokens: explicit setting, else a lookup by model name.
    pub fn context_window(&self) -> u32 {
        self.context_window
            .unwrap_or_else(|| default_context_window(self.provider, self.model_name()))
    }

    /// Hosted providers answer quickly; local inference gets a much longer leash.
    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .unwrap_or(if self.provider.is_hosted() { 60 } else { 120 })
    }
}

/// Best-effort context window by model family.
pub fn default_context_window(provider: ProviderKind, model: &str) -> u32 {
    let model = model.to_ascii_lowercase();
    match provider {
        ProviderKind::Anthropic => 200_000,
        ProviderKind::Ollama => 8_192,
        ProviderKind::OpenAi => {
            if model.starts_with("gpt-4o")
                || model.starts_with("gpt-4.1")
                || model.starts_with("gpt-4-turbo")
                || model.starts_with("gpt-5")
                || model.starts_with('o')
            {
                128_000
            } else if model.starts_with("gpt-4-32k") {
                32_768
            } else if model.starts_with("gpt-4") {
                8_192
            } else if model.starts_with("gpt-3.5-turbo") {
                16_385
            } else {
                8_192
            }
        }
    }
}

/// Tunables for the context budget manager. None of the correctness guarantees
/// depend on the exact values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Fixed token overhead added to every turn.
    pub per_turn_overhead: u32,
    /// Extra tokens per tool call carried by a turn.
    pub per_call_overhead: u32,
    /// Stage 1: most recent turns always kept alongside tool-bearing turns.
    pub keep_recent: usize,
    /// Stage 2 kicks in above this fraction of the available budget.
    pub narrow_threshold: f32,
    /// Stage 2: most recent turns kept.
    pub narrow_recent: usize,
    /// Stage 2: most recent tool-bearing turns kept.
    pub narrow_tool_turns: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_turn_overhead: 4,
            per_call_overhead: 20,
            keep_recent: 4,
            narrow_threshold: 0.8,
            narrow_recent: 2,
            narrow_tool_turns: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub auto_connect: bool,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            auto_connect: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, ProviderKind::Anthropic);
        assert_eq!(cfg.llm.max_tokens, 1024);
        assert_eq!(cfg.llm.history_window, 10);
        assert_eq!(cfg.llm.budget.keep_recent, 4);
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[llm]
provider = "ollama"
model = "qwen2.5"
"#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Ollama);
        assert_eq!(cfg.llm.model_name(), "qwen2.5");
        assert_eq!(cfg.llm.max_tokens, 1024);
        assert_eq!(cfg.llm.request_timeout_secs(), 120);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[llm]
provider = "openai"
model = "gpt-4"
api_key = "sk-test"
base_url = "https://api.openai.com/v1"
max_tokens = 512
temperature = 0.2
context_window = 4096
max_tool_rounds = 4

[llm.budget]
keep_recent = 6
narrow_threshold = 0.5

[[mcp_servers]]
name = "fs"
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "."]
auto_connect = false
"#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.llm.context_window(), 4096);
        assert_eq!(cfg.llm.max_tool_rounds, 4);
        assert_eq!(cfg.llm.budget.keep_recent, 6);
        assert_eq!(cfg.llm.budget.narrow_recent, 2);
        assert_eq!(cfg.mcp_servers.len(), 1);
        assert_eq!(cfg.mcp_servers[0].args.len(), 3);
        assert!(!cfg.mcp_servers[0].auto_connect);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let toml_str = r#"
[llm]
provider = "deepseek"
"#;
        let err = toml::from_str::<AppConfig>(toml_str).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("gpt".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" local ".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(lookup_from(&[
            ("LLM_PROVIDER", "openai"),
            ("LLM_MODEL", "gpt-4o"),
            ("LLM_MAX_TOKENS", "2048"),
            ("OPENAI_API_KEY", "sk-env"),
            ("ANTHROPIC_API_KEY", "wrong-provider"),
        ]));
        assert_eq!(cfg.llm.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.llm.model_name(), "gpt-4o");
        assert_eq!(cfg.llm.max_tokens, 2048);
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(cfg.llm.context_window(), 128_000);
    }

    #[test]
    fn test_env_does_not_override_file_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key = Some("from-file".into());
        cfg.apply_overrides_from(lookup_from(&[("ANTHROPIC_API_KEY", "from-env")]));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_bad_env_values_ignored() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(lookup_from(&[
            ("LLM_PROVIDER", "mystery"),
            ("LLM_MAX_TOKENS", "lots"),
        ]));
        assert_eq!(cfg.llm.provider, ProviderKind::Anthropic);
        assert_eq!(cfg.llm.max_tokens, 1024);
    }

    #[test]
    fn test_ollama_base_url_from_env() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(lookup_from(&[
            ("LLM_PROVIDER", "ollama"),
            ("OLLAMA_BASE_URL", "http://localhost:11434"),
        ]));
        assert_eq!(cfg.llm.base_url.as_deref(), Some("http://localhost:11434"));
    }

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(default_context_window(ProviderKind::OpenAi, "gpt-4"), 8_192);
        assert_eq!(default_context_window(ProviderKind::OpenAi, "gpt-4-turbo"), 128_000);
        assert_eq!(default_context_window(ProviderKind::OpenAi, "gpt-3.5-turbo-0125"), 16_385);
        assert_eq!(default_context_window(ProviderKind::OpenAi, "o3-mini"), 128_000);
        assert_eq!(default_context_window(ProviderKind::Anthropic, "anything"), 200_000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\nprovider = \"openai\"\nmax_tokens = 300").unwrap();
        let cfg = AppConfig::load(file.path()).unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::OpenAi);
        assert_eq!(cfg.llm.max_tokens, 300);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let cfg = AppConfig::load_or_default("/nonexistent/toolchat.toml");
        assert_eq!(cfg.llm.max_tool_rounds, 16);
    }
}
