//! Concrete provider backends.
//!
//! Backends:
//!   OpenAiProvider — chat completions API, native JSON mode
//!   ClaudeProvider — Anthropic Messages API, JSON-only instruction appended
//!   GeminiProvider — generateContent API, response mime + schema hint
//!
//! All three converge on the same error taxonomy and speak raw HTTP via
//! reqwest; no vendor SDKs.

use std::time::Duration;

use async_trait::async_trait;
use litscout_common::config::LlmConfig;
use serde_json::{json, Value};

use crate::json::extract_json;
use crate::provider::{LlmError, LlmProvider};

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const JSON_INSTRUCTION: &str = "\n\nYou MUST respond with valid JSON only. \
     No markdown, no explanation, no extra text.";

// ── Shared helpers ────────────────────────────────────────────────────────────

fn build_http_client(timeout_s: u64) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_s))
        .build()?)
}

/// Read the body and map error statuses onto the taxonomy:
/// 401/403 → Auth, 429 → RateLimit, other 4xx/5xx → Api.
async fn read_checked(resp: reqwest::Response) -> Result<Value, LlmError> {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await?;
    if status < 400 {
        return Ok(body);
    }
    let message = body["error"]["message"]
        .as_str()
        .or_else(|| body["message"].as_str())
        .or_else(|| body[0]["error"]["message"].as_str())
        .unwrap_or("unknown API error")
        .to_string();
    match status {
        401 | 403 => Err(LlmError::Auth(message)),
        429 => Err(LlmError::RateLimit(message)),
        _ => Err(LlmError::Api { status, message }),
    }
}

// ── 1. OpenAI ─────────────────────────────────────────────────────────────────

pub struct OpenAiProvider {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_BASE.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_http_client(config.timeout_s)?,
        })
    }

    async fn chat(&self, system_prompt: &str, user_message: &str, json_mode: bool) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut body = json!({
            "model":       self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user",   "content": user_message},
            ],
            "temperature": self.temperature,
            "max_tokens":  self.max_tokens,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed = read_checked(resp).await?;
        Ok(parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        self.chat(system_prompt, user_message, false).await
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        _schema: Option<&Value>,
    ) -> Result<Value, LlmError> {
        let text = self.chat(system_prompt, user_message, true).await?;
        extract_json(&text)
    }
}

// ── 2. Claude ─────────────────────────────────────────────────────────────────

pub struct ClaudeProvider {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ClaudeProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_http_client(config.timeout_s)?,
        })
    }

    async fn messages(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model":      self.model,
            "system":     system_prompt,
            "messages":   [{"role": "user", "content": user_message}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let parsed = read_checked(resp).await?;
        Ok(parsed["content"]
            .as_array()
            .and_then(|blocks| blocks.first())
            .and_then(|b| b["text"].as_str())
            .unwrap_or("")
            .to_string())
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        self.messages(system_prompt, user_message).await
    }

    /// Claude has no native JSON mode; a JSON-only instruction is appended
    /// to the system prompt and the shared extractor does the rest.
    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        _schema: Option<&Value>,
    ) -> Result<Value, LlmError> {
        let system = format!("{system_prompt}{JSON_INSTRUCTION}");
        let text = self.messages(&system, user_message).await?;
        extract_json(&text)
    }
}

// ── 3. Gemini ─────────────────────────────────────────────────────────────────

pub struct GeminiProvider {
    model: String,
    api_key: String,
    base_url: String,
    temperature: f64,
    max_tokens: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_BASE.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: build_http_client(config.timeout_s)?,
        })
    }

    async fn generate(&self, system_prompt: &str, user_message: &str, schema: Option<&Value>, json_mode: bool) -> Result<String, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key,
        );

        let mut generation_config = json!({
            "temperature":     self.temperature,
            "maxOutputTokens": self.max_tokens,
        });
        if json_mode {
            generation_config["responseMimeType"] = json!("application/json");
            if let Some(schema) = schema {
                generation_config["responseSchema"] = schema.clone();
            }
        }

        let body = json!({
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "contents": [{"role": "user", "parts": [{"text": user_message}]}],
            "generationConfig": generation_config,
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        let parsed = read_checked(resp).await?;
        Ok(parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        self.generate(system_prompt, user_message, None, false).await
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_message: &str,
        schema: Option<&Value>,
    ) -> Result<Value, LlmError> {
        let text = self.generate(system_prompt, user_message, schema, true).await?;
        extract_json(&text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key: "sk-test".to_string(),
            base_url: base_url.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_openai_default_base_url() {
        let p = OpenAiProvider::new(&config(None)).unwrap();
        assert_eq!(p.base_url, "https://api.openai.com");
    }

    #[test]
    fn test_base_url_override() {
        let p = OpenAiProvider::new(&config(Some("http://localhost:1234/"))).unwrap();
        assert_eq!(p.base_url, "http://localhost:1234/");
    }

    #[test]
    fn test_claude_json_instruction_is_appended() {
        // The instruction itself must demand bare JSON
        assert!(JSON_INSTRUCTION.contains("valid JSON only"));
    }

    #[test]
    fn test_gemini_provider_builds() {
        let mut cfg = config(None);
        cfg.model = "gemini-1.5-pro".to_string();
        let p = GeminiProvider::new(&cfg).unwrap();
        assert_eq!(p.base_url, "https://generativelanguage.googleapis.com");
        assert_eq!(p.max_tokens, 4096);
    }
}
