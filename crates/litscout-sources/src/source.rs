//! Search source trait, error taxonomy, and factory.

use std::sync::Arc;

use async_trait::async_trait;
use litscout_common::config::SearchSourceConfig;
use litscout_common::models::{RawPaper, SearchStrategy};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SourceError {
    /// 401/403 from the provider. Never retried.
    #[error("authentication rejected by search provider (HTTP {0})")]
    Auth(u16),
    /// HTTP 200 carrying a provider-level error field, or an unexpected
    /// status. Permanent for the current request.
    #[error("search provider error: {0}")]
    Api(String),
    /// 429/5xx or transport failure, surfaced after retries ran out.
    #[error("transient search failure: {0}")]
    Transient(String),
    /// The per-run request ceiling was hit.
    #[error("search call budget exhausted (limit {0})")]
    CallLimit(u32),
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// A single external paper source.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Stable identifier used in strategies and config (e.g. "serpapi_scholar").
    fn source_name(&self) -> &str;

    /// Simple keyword search with optional filters.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        year_from: Option<i32>,
        year_to: Option<i32>,
        language: Option<&str>,
    ) -> Result<Vec<RawPaper>, SourceError>;

    /// Fan a per-query budget across all queries of a strategy.
    async fn search_advanced(&self, strategy: &SearchStrategy) -> Result<Vec<RawPaper>, SourceError>;
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Build a source adapter from configuration. Keyed on the source name.
pub fn create_source(config: &SearchSourceConfig) -> anyhow::Result<Arc<dyn SearchSource>> {
    match config.name.as_str() {
        "serpapi_scholar" => Ok(Arc::new(crate::scholar::SerpApiScholarSource::new(config)?)),
        other => anyhow::bail!("Unknown search source: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_unknown_source() {
        let cfg = SearchSourceConfig {
            name: "scopus".to_string(),
            ..Default::default()
        };
        let err = match create_source(&cfg) {
            Err(e) => e,
            Ok(_) => panic!("expected create_source to fail for unknown source"),
        };
        assert!(err.to_string().contains("Unknown search source"));
    }

    #[test]
    fn test_factory_builds_scholar() {
        let cfg = SearchSourceConfig {
            name: "serpapi_scholar".to_string(),
            api_key: "serp-key".to_string(),
            ..Default::default()
        };
        let source = create_source(&cfg).unwrap();
        assert_eq!(source.source_name(), "serpapi_scholar");
    }
}
