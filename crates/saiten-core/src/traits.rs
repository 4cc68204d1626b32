//! The LLM transport seam.
//!
//! Implemented by the `saiten-providers` crate. The orchestrator only ever
//! talks to `dyn LlmProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::results::TokenUsage;

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that complete a grading instruction.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "lmstudio").
    fn name(&self) -> &str;

    /// Send one instruction and return the raw completion.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse>;

    /// List models the backend currently serves.
    async fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>>;
}

/// Request to complete a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g. "gpt-4o-mini").
    pub model: String,
    /// The rendered grading instruction.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Ask the backend to constrain output to a JSON object.
    #[serde(default)]
    pub json_mode: bool,
}

/// Raw completion returned by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Completion text, untrusted. Empty if the backend returned none.
    pub content: String,
    /// Model that actually produced the completion.
    pub model: String,
    pub token_usage: TokenUsage,
    /// Latency of the HTTP exchange in milliseconds.
    pub latency_ms: u64,
}

/// A model listed by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Context window in tokens, 0 if the backend does not say.
    #[serde(default)]
    pub max_context: u32,
}
