//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use saiten_core::engine::GraderConfig;
use saiten_core::prompt::{PromptBuilder, DEFAULT_EXAM_NAME};
use saiten_core::rules::{RuleEvaluator, RuleSetting};
use saiten_core::traits::LlmProvider;

use crate::ollama::{OllamaProvider, DEFAULT_BASE_URL as DEFAULT_OLLAMA_URL};
use crate::openai::OpenAiProvider;
use crate::retry::RetryingProvider;

const LMSTUDIO_URL: &str = "http://127.0.0.1:1234";
const CONFIG_FILE: &str = "saiten.toml";

/// Configuration for a single LLM transport.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Any OpenAI-compatible server, LM Studio included.
    #[serde(alias = "lmstudio")]
    OpenAI {
        #[serde(default = "default_api_key")]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn default_api_key() -> String {
    "dummy-key".to_string()
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

/// Transports available without any configuration.
fn builtin_providers() -> HashMap<String, ProviderConfig> {
    HashMap::from([
        (
            "lmstudio".to_string(),
            ProviderConfig::OpenAI {
                api_key: default_api_key(),
                base_url: Some(LMSTUDIO_URL.to_string()),
                org_id: None,
            },
        ),
        (
            "ollama".to_string(),
            ProviderConfig::Ollama {
                base_url: default_ollama_url(),
            },
        ),
    ])
}

/// Top-level saiten configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaitenConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for grading calls.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Max tokens for grading calls.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on one model call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Ask the backend for a JSON object.
    #[serde(default = "default_true")]
    pub json_mode: bool,
    /// Exam named in the grading instruction.
    #[serde(default)]
    pub exam_name: Option<String>,
    /// Optional system prompt for grading calls.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Rule overrides applied on top of the built-in rule set.
    #[serde(default)]
    pub rules: Vec<RuleSetting>,
}

fn default_provider() -> String {
    "lmstudio".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}

impl Default for SaitenConfig {
    fn default() -> Self {
        Self {
            providers: builtin_providers(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            json_mode: true,
            exam_name: None,
            system_prompt: None,
            rules: Vec::new(),
        }
    }
}

impl SaitenConfig {
    /// Parse a TOML document, filling in built-in providers.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: SaitenConfig = toml::from_str(content)?;
        for (name, provider) in builtin_providers() {
            config.providers.entry(name).or_insert(provider);
        }
        Ok(config)
    }

    /// Apply `SAITEN_*` overrides, reading variables through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = lookup("SAITEN_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("SAITEN_MODEL") {
            self.default_model = model;
        }

        if let Some(key) = lookup("SAITEN_OPENAI_KEY") {
            let entry = self
                .providers
                .entry("openai".into())
                .or_insert(ProviderConfig::OpenAI {
                    api_key: String::new(),
                    base_url: None,
                    org_id: None,
                });
            if let ProviderConfig::OpenAI { api_key, .. } = entry {
                *api_key = key;
            }
        }

        if let Some(url) = lookup("SAITEN_OLLAMA_URL") {
            if let Some(ProviderConfig::Ollama { base_url }) = self.providers.get_mut("ollama") {
                *base_url = url;
            }
        }
    }

    /// Resolve `${VAR}` references in every provider, reading through `lookup`.
    pub fn resolve_env_refs(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for provider in self.providers.values_mut() {
            *provider = resolve_provider_config(provider, &lookup);
        }
    }

    /// Orchestrator settings, with an optional model override.
    pub fn grader_config(&self, model: Option<&str>) -> GraderConfig {
        GraderConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
            json_mode: self.json_mode,
            system_prompt: self.system_prompt.clone(),
        }
    }

    /// The built-in rules with configured overrides applied.
    pub fn rule_evaluator(&self) -> RuleEvaluator {
        let mut evaluator = RuleEvaluator::new();
        evaluator.apply_settings(&self.rules);
        evaluator
    }

    /// Prompt builder for a problem set, which may name its own exam.
    pub fn prompt_builder(&self, set_exam: Option<&str>) -> PromptBuilder {
        PromptBuilder::new(
            set_exam
                .or(self.exam_name.as_deref())
                .unwrap_or(DEFAULT_EXAM_NAME),
        )
    }

    /// Build the named provider (or the default) wrapped in the retry policy.
    pub fn build_provider(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = name.unwrap_or(&self.default_provider);
        let config = self.providers.get(name).with_context(|| {
            let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            known.sort_unstable();
            format!(
                "unknown provider '{name}' (configured: {})",
                known.join(", ")
            )
        })?;

        let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(name, config)?);
        if self.max_retries == 0 {
            return Ok(provider);
        }
        Ok(Arc::new(RetryingProvider::new(
            provider,
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
        )))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = lookup(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(
    config: &ProviderConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key, lookup),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u, lookup)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o, lookup)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url, lookup),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `saiten.toml` in the current directory
/// 2. `~/.config/saiten/config.toml`
///
/// Environment variable overrides: `SAITEN_PROVIDER`, `SAITEN_MODEL`,
/// `SAITEN_OPENAI_KEY`, `SAITEN_OLLAMA_URL`.
pub fn load_config() -> Result<SaitenConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SaitenConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            SaitenConfig::from_toml_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SaitenConfig::default(),
    };

    let env = |name: &str| std::env::var(name).ok();
    config.apply_env_overrides(env);
    config.resolve_env_refs(env);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("saiten"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Box::new(
            OpenAiProvider::new(api_key, base_url.clone(), org_id.clone()).with_name(name),
        )),
        ProviderConfig::Ollama { base_url } => Ok(Box::new(OllamaProvider::new(base_url))),
    }
}

/// Starter configuration written by `saiten init`.
pub const STARTER_CONFIG: &str = r#"# saiten configuration

default_provider = "lmstudio"
default_model = "gpt-4o-mini"
temperature = 0.1
max_tokens = 1000
timeout_secs = 30
max_retries = 2
retry_delay_ms = 1000
json_mode = true
exam_name = "プロジェクトマネージャ試験"

[providers.lmstudio]
type = "lmstudio"
base_url = "http://127.0.0.1:1234"
api_key = "dummy-key"

[providers.ollama]
type = "ollama"
base_url = "http://127.0.0.1:11434"

# [providers.openai]
# type = "openai"
# api_key = "${OPENAI_API_KEY}"

# [[rules]]
# id = "sentence_structure_check"
# enabled = false
"#;
