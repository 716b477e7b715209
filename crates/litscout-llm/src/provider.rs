//! Provider trait, error taxonomy, and factory.

use std::sync::Arc;

use async_trait::async_trait;
use litscout_common::config::LlmConfig;
use serde_json::Value;
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("failed to parse model response: {0}")]
    Response(String),
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Uniform contract over text-generation backends.
///
/// The provider knows nothing about papers or search; it is a generic
/// completion interface. Callers own retry policy — the provider never
/// retries internally.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Free-form text completion. Returns an empty string when the model
    /// returns an empty response.
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError>;

    /// Structured completion. Always yields a JSON object; `schema` is a
    /// hint the backend may or may not honor.
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        schema: Option<&Value>,
    ) -> Result<Value, LlmError>;
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Build a provider from configuration. Keyed on the provider name.
pub fn create_provider(config: &LlmConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    if config.api_key.is_empty() {
        anyhow::bail!("API key required for provider '{}'", config.provider);
    }
    if config.model.is_empty() {
        anyhow::bail!("Model name required for provider '{}'", config.provider);
    }

    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "openai" => Arc::new(crate::backend::OpenAiProvider::new(config)?),
        "claude" => Arc::new(crate::backend::ClaudeProvider::new(config)?),
        "gemini" => Arc::new(crate::backend::GeminiProvider::new(config)?),
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    };
    Ok(provider)
}
