//! Environment-driven configuration.
//!
//! All knobs are read from the process environment once at startup.
//! API keys follow the provider-prefixed convention (`OPENAI_API_KEY`,
//! `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, `SERPAPI_API_KEY`) with
//! `LLM_API_KEY` as a provider-agnostic fallback.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// One of "openai", "claude", "gemini".
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_s: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            temperature: 0.0,
            max_tokens: 4096,
            timeout_s: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSourceConfig {
    pub name: String,
    pub api_key: String,
    pub enabled: bool,
    pub rate_limit_rps: f64,
    pub timeout_s: u64,
    /// Per-run request ceiling. `None` = unlimited.
    pub max_calls: Option<u32>,
}

impl Default for SearchSourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            api_key: String::new(),
            enabled: true,
            rate_limit_rps: 1.0,
            timeout_s: 20,
            max_calls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub sources: BTreeMap<String, SearchSourceConfig>,
    pub default_max_results: usize,
    pub domain: String,
    pub relevance_batch_size: usize,
    pub relevance_max_concurrency: usize,
    pub dedup_enable_llm_pass: bool,
    pub dedup_llm_max_candidates: usize,
    pub session_decide_timeout_s: f64,
    pub session_poll_interval_s: f64,
    pub require_user_response: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            sources: BTreeMap::new(),
            default_max_results: 100,
            domain: "general".to_string(),
            relevance_batch_size: 10,
            relevance_max_concurrency: 3,
            dedup_enable_llm_pass: true,
            dedup_llm_max_candidates: 60,
            session_decide_timeout_s: 15.0,
            session_poll_interval_s: 0.05,
            require_user_response: true,
        }
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> AppConfig {
    let provider = env_or("LLM_PROVIDER", "openai");
    let api_key = provider_api_key(&provider);

    let llm = LlmConfig {
        model: env_or("LLM_MODEL", ""),
        base_url: std::env::var("LLM_BASE_URL").ok().filter(|v| !v.is_empty()),
        temperature: env_parse("LLM_TEMPERATURE", 0.0),
        max_tokens: env_parse("LLM_MAX_TOKENS", 4096),
        timeout_s: env_parse("LLM_TIMEOUT_S", 120),
        provider,
        api_key,
    };

    let mut sources = BTreeMap::new();
    if let Ok(serpapi_key) = std::env::var("SERPAPI_API_KEY") {
        if !serpapi_key.is_empty() {
            sources.insert(
                "serpapi_scholar".to_string(),
                SearchSourceConfig {
                    name: "serpapi_scholar".to_string(),
                    api_key: serpapi_key,
                    enabled: true,
                    rate_limit_rps: env_parse("SERPAPI_RATE_LIMIT_RPS", 1.0),
                    timeout_s: env_parse("SEARCH_TIMEOUT_S", 20),
                    max_calls: std::env::var("SERPAPI_MAX_CALLS")
                        .ok()
                        .and_then(|v| v.parse().ok()),
                },
            );
        }
    }

    AppConfig {
        llm,
        sources,
        default_max_results: env_parse("DEFAULT_MAX_RESULTS", 100),
        domain: env_or("DOMAIN", "general"),
        relevance_batch_size: env_parse("RELEVANCE_BATCH_SIZE", 10),
        relevance_max_concurrency: env_parse("RELEVANCE_MAX_CONCURRENCY", 3),
        dedup_enable_llm_pass: env_bool("DEDUP_ENABLE_LLM_PASS", true),
        dedup_llm_max_candidates: env_parse("DEDUP_LLM_MAX_CANDIDATES", 60),
        session_decide_timeout_s: env_parse("SESSION_DECIDE_TIMEOUT_S", 15.0),
        session_poll_interval_s: env_parse("SESSION_POLL_INTERVAL_S", 0.05),
        require_user_response: env_bool("REQUIRE_USER_RESPONSE", true),
    }
}

fn provider_api_key(provider: &str) -> String {
    let specific = match provider {
        "openai" => "OPENAI_API_KEY",
        "claude" => "ANTHROPIC_API_KEY",
        "gemini" => "GEMINI_API_KEY",
        _ => "LLM_API_KEY",
    };
    std::env::var(specific)
        .or_else(|_| std::env::var("LLM_API_KEY"))
        .unwrap_or_default()
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}
