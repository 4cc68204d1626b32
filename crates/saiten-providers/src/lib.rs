//! saiten-providers — model transports for the grading pipeline.
//!
//! Implements the `LlmProvider` trait for OpenAI-compatible servers
//! (LM Studio included) and Ollama, plus a retry wrapper, a mock for tests
//! and the configuration layer that wires them together.

pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod retry;

pub use config::{create_provider, load_config, load_config_from, ProviderConfig, SaitenConfig};
pub use error::ProviderError;
pub use retry::RetryingProvider;
