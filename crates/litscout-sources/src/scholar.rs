//! SerpAPI Google Scholar adapter.
//!
//! Endpoint: https://serpapi.com/search.json (engine=google_scholar)
//!
//! The provider caps pages at 20 results; larger requests are paged with
//! the `start` offset. Transient statuses (429/500/503) and transport
//! timeouts are retried with jittered exponential backoff; 401/403 abort
//! immediately. Mid-stream pagination failures degrade to the results
//! already collected.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use litscout_common::config::SearchSourceConfig;
use litscout_common::models::{Author, RawPaper, SearchStrategy};

use crate::source::{SearchSource, SourceError};

const SEARCH_URL: &str = "https://serpapi.com/search.json";
const PAGE_SIZE: usize = 20;
const SOURCE_NAME: &str = "serpapi_scholar";

static SEGMENT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+-\s+").expect("invalid segment regex"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(19|20)\d{2}$").expect("invalid year regex"));
static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\S+\.(?:com|org|edu|net)(?:\b|/|$)").expect("invalid hostname regex")
});
static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,9}/[^\s,;)}\]>]+").expect("invalid DOI regex"));

pub struct SerpApiScholarSource {
    api_key: String,
    client: reqwest::Client,
    min_interval: Duration,
    max_retries: u32,
    max_calls: Option<u32>,
    calls_made: AtomicU32,
    // Single coordination point for the rate limiter: the lock is held
    // across the pacing sleep so bursts cannot exceed the configured rate.
    last_request: Mutex<Option<Instant>>,
}

impl SerpApiScholarSource {
    pub fn new(config: &SearchSourceConfig) -> Result<Self, SourceError> {
        let rps = if config.rate_limit_rps > 0.0 { config.rate_limit_rps } else { 1.0 };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| SourceError::Transient(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            api_key: config.api_key.clone(),
            client,
            min_interval: Duration::from_secs_f64(1.0 / rps),
            max_retries: 3,
            max_calls: config.max_calls,
            calls_made: AtomicU32::new(0),
            last_request: Mutex::new(None),
        })
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Fetch one result page, retrying transient failures.
    async fn fetch_page(&self, params: &[(&str, String)]) -> Result<Value, SourceError> {
        if let Some(limit) = self.max_calls {
            if self.calls_made.fetch_add(1, Ordering::SeqCst) >= limit {
                return Err(SourceError::CallLimit(limit));
            }
        }

        self.pace().await;

        let mut last_error: Option<SourceError> = None;
        for attempt in 0..=self.max_retries {
            let resp = match self.client.get(SEARCH_URL).query(params).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let kind = if e.is_timeout() { "timed out" } else { "failed" };
                    last_error = Some(SourceError::Transient(format!("request {kind}: {e}")));
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = resp.status().as_u16();

            if status == 200 {
                let data: Value = resp
                    .json()
                    .await
                    .map_err(|e| SourceError::Api(format!("invalid response body: {e}")))?;
                if let Some(provider_error) = data.get("error").and_then(|v| v.as_str()) {
                    return Err(SourceError::Api(provider_error.to_string()));
                }
                return Ok(data);
            }

            if is_transient_status(status) {
                last_error = Some(SourceError::Transient(format!("transient HTTP {status}")));
                if attempt < self.max_retries {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
                break;
            }

            if status == 401 || status == 403 {
                return Err(SourceError::Auth(status));
            }

            return Err(SourceError::Api(format!("unexpected HTTP {status}")));
        }

        Err(last_error
            .unwrap_or_else(|| SourceError::Transient("request failed after retries".to_string())))
    }
}

#[async_trait]
impl SearchSource for SerpApiScholarSource {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        year_from: Option<i32>,
        year_to: Option<i32>,
        language: Option<&str>,
    ) -> Result<Vec<RawPaper>, SourceError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let page_size = PAGE_SIZE.min(max_results);
        let mut base_params: Vec<(&str, String)> = vec![
            ("engine", "google_scholar".to_string()),
            ("q", query.to_string()),
            ("api_key", self.api_key.clone()),
            ("num", page_size.to_string()),
        ];
        if let Some(y) = year_from {
            base_params.push(("as_ylo", y.to_string()));
        }
        if let Some(y) = year_to {
            base_params.push(("as_yhi", y.to_string()));
        }
        if let Some(lang) = language {
            base_params.push(("lr", format!("lang_{lang}")));
        }

        let mut papers: Vec<RawPaper> = Vec::new();
        let mut start = 0usize;

        while papers.len() < max_results {
            let mut page_params = base_params.clone();
            page_params.push(("start", start.to_string()));

            let data = match self.fetch_page(&page_params).await {
                Ok(data) => data,
                Err(e) => {
                    // Mid-stream failures return what we already have.
                    if !papers.is_empty() {
                        warn!(error = %e, collected = papers.len(), "pagination aborted, returning partial results");
                        papers.truncate(max_results);
                        return Ok(papers);
                    }
                    return Err(e);
                }
            };

            let organic = data["organic_results"].as_array().cloned().unwrap_or_default();
            if organic.is_empty() {
                break;
            }

            for raw in &organic {
                papers.push(parse_result(raw));
                if papers.len() >= max_results {
                    break;
                }
            }

            start += page_size;
        }

        papers.truncate(max_results);
        debug!(query, n = papers.len(), "scholar search complete");
        Ok(papers)
    }

    async fn search_advanced(&self, strategy: &SearchStrategy) -> Result<Vec<RawPaper>, SourceError> {
        if strategy.queries.is_empty() {
            return Ok(Vec::new());
        }

        let per_query = per_query_budget(strategy.filters.max_results, strategy.queries.len());

        let mut all_results: Vec<RawPaper> = Vec::new();
        for query in &strategy.queries {
            match self
                .search(
                    &query.boolean_query,
                    per_query,
                    strategy.filters.year_from,
                    strategy.filters.year_to,
                    strategy.filters.language.as_deref(),
                )
                .await
            {
                Ok(results) => all_results.extend(results),
                Err(e) => {
                    warn!(query = %query.boolean_query, error = %e, "query failed, dropping");
                }
            }
        }

        Ok(dedupe_fanout(all_results))
    }
}

// ── Retry helpers ─────────────────────────────────────────────────────────────

fn is_transient_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 503)
}

/// `min(16, 2^attempt)` seconds plus up to one second of jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = f64::min(16.0, 2f64.powi(attempt as i32));
    let jitter: f64 = rand::thread_rng().gen();
    Duration::from_secs_f64(base + jitter)
}

fn per_query_budget(max_results: usize, n_queries: usize) -> usize {
    (max_results / n_queries.max(1)).max(1)
}

// ── Result parsing ────────────────────────────────────────────────────────────

fn is_hostname(value: &str) -> bool {
    HOSTNAME_RE.is_match(value.trim())
}

/// Parse `publication_info.summary` into (authors, year, venue).
///
/// The summary is a loose "authors - year - venue" string; the year
/// anchors the split. Hostname-like venue tokens are provider artifacts
/// and get dropped. Never fails; unknown shapes yield empty parts.
fn parse_summary(summary: &str) -> (Vec<Author>, Option<i32>, Option<String>) {
    if summary.trim().is_empty() {
        return (Vec::new(), None, None);
    }

    let segments: Vec<&str> = SEGMENT_SPLIT
        .split(summary)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return (Vec::new(), None, None);
    }

    let year_index = segments.iter().position(|s| YEAR_RE.is_match(s));

    if let Some(idx) = year_index {
        let year = segments[idx].parse::<i32>().ok();
        let authors = split_authors(&segments[..idx].join(", "));
        let venue_parts: Vec<&str> = segments[idx + 1..]
            .iter()
            .copied()
            .filter(|s| !is_hostname(s))
            .collect();
        let venue = if venue_parts.is_empty() {
            None
        } else {
            Some(venue_parts.join(" - "))
        };
        return (authors, year, venue);
    }

    // No year: first segment is authors, last segment a venue candidate.
    let authors = split_authors(segments[0]);
    let venue = if segments.len() > 1 {
        let last = segments[segments.len() - 1];
        if is_hostname(last) { None } else { Some(last.to_string()) }
    } else {
        None
    };
    (authors, None, venue)
}

fn split_authors(joined: &str) -> Vec<Author> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Author::named)
        .collect()
}

/// First DOI in arbitrary text, with trailing punctuation trimmed.
fn extract_doi(text: &str) -> Option<String> {
    DOI_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')']).to_string())
}

/// Parse a single organic_result into a RawPaper. Never fails; a degenerate
/// payload still yields a record carrying the raw data.
fn parse_result(raw: &Value) -> RawPaper {
    let summary = raw["publication_info"]["summary"].as_str().unwrap_or("");
    let (authors, year, venue) = parse_summary(summary);

    let citation_count = raw["inline_links"]["cited_by"]["total"].as_u64().unwrap_or(0) as u32;

    // Prefer a PDF resource link over the generic result link.
    let full_text_url = raw["resources"]
        .as_array()
        .and_then(|resources| {
            resources
                .iter()
                .find(|r| r["file_format"].as_str() == Some("PDF") && r["link"].is_string())
                .and_then(|r| r["link"].as_str())
        })
        .or_else(|| raw["link"].as_str())
        .map(String::from);

    let doi = extract_doi(&format!(
        "{} {}",
        raw["link"].as_str().unwrap_or(""),
        raw["snippet"].as_str().unwrap_or(""),
    ));

    RawPaper {
        doi,
        title: raw["title"].as_str().unwrap_or("").to_string(),
        authors,
        snippet: raw["snippet"].as_str().map(String::from),
        year,
        venue,
        source: SOURCE_NAME.to_string(),
        citation_count,
        full_text_url,
        raw_data: raw.clone(),
        ..Default::default()
    }
}

// ── Fan-out dedup ─────────────────────────────────────────────────────────────

/// Drop duplicates across the per-query fan-out. Keyed by provider
/// result_id, then URL, then normalized title + year; first occurrence wins.
fn dedupe_fanout(papers: Vec<RawPaper>) -> Vec<RawPaper> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(papers.len());
    for paper in papers {
        let key = fanout_key(&paper);
        if seen.insert(key) {
            out.push(paper);
        }
    }
    out
}

fn fanout_key(paper: &RawPaper) -> String {
    if let Some(rid) = paper.raw_data.get("result_id").and_then(|v| v.as_str()) {
        return format!("rid:{rid}");
    }
    if let Some(url) = &paper.full_text_url {
        return format!("url:{url}");
    }
    format!("title:{}:{}", normalize_title(&paper.title), paper.year.unwrap_or(0))
}

fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
