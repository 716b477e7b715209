//! Relevance scoring stage: batched model calls under bounded concurrency.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use litscout_common::models::{PaperTag, ParsedIntent, RawPaper, ScoredPaper};
use litscout_llm::LlmProvider;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::prompts::RELEVANCE_SCORING_SYSTEM;

use super::Scoring;

const MAX_TITLE_LEN: usize = 200;
const MAX_SNIPPET_LEN: usize = 500;

pub struct RelevanceScorer {
    llm: Arc<dyn LlmProvider>,
    batch_size: usize,
    max_concurrency: usize,
}

impl RelevanceScorer {
    pub fn new(llm: Arc<dyn LlmProvider>, batch_size: usize, max_concurrency: usize) -> Self {
        Self {
            llm,
            batch_size: batch_size.max(1),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Score one batch. Degrades to default scores on any model fault so
    /// sibling batches keep their results.
    async fn score_batch(&self, batch: &[RawPaper], intent: &ParsedIntent) -> Vec<ScoredPaper> {
        let user_msg = format_batch(batch, intent);
        match self
            .llm
            .complete_json(RELEVANCE_SCORING_SYSTEM, &user_msg, None)
            .await
        {
            Ok(response) => parse_scores(batch, &response),
            Err(e) => {
                warn!(batch_len = batch.len(), error = %e, "scoring batch failed, using defaults");
                batch.iter().map(default_score).collect()
            }
        }
    }
}

#[async_trait]
impl Scoring for RelevanceScorer {
    async fn score(&self, papers: Vec<RawPaper>, intent: &ParsedIntent) -> Vec<ScoredPaper> {
        if papers.is_empty() {
            return Vec::new();
        }

        let batches: Vec<&[RawPaper]> = papers.chunks(self.batch_size).collect();

        if batches.len() <= 1 || self.max_concurrency == 1 {
            let mut all_scored = Vec::with_capacity(papers.len());
            for batch in &batches {
                all_scored.extend(self.score_batch(batch, intent).await);
            }
            return all_scored;
        }

        info!(
            papers = papers.len(),
            batches = batches.len(),
            concurrency = self.max_concurrency,
            "scoring in parallel batches"
        );

        // Batches complete in any order; indexed slots restore input order.
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let indexed = join_all(batches.iter().enumerate().map(|(idx, batch)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await;
                (idx, self.score_batch(batch, intent).await)
            }
        }))
        .await;

        let mut slots: Vec<Option<Vec<ScoredPaper>>> = vec![None; batches.len()];
        for (idx, scored) in indexed {
            slots[idx] = Some(scored);
        }

        let mut all_scored = Vec::with_capacity(papers.len());
        for (slot, batch) in slots.into_iter().zip(batches) {
            match slot {
                Some(scored) => all_scored.extend(scored),
                None => all_scored.extend(batch.iter().map(default_score)),
            }
        }
        all_scored
    }
}

// ── Formatting / parsing ──────────────────────────────────────────────────────

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn format_batch(batch: &[RawPaper], intent: &ParsedIntent) -> String {
    let mut lines = vec![
        format!("Research topic: {}", intent.topic),
        format!("Key concepts: {}", intent.concepts.join(", ")),
        String::new(),
        "Papers to score:".to_string(),
    ];
    for p in batch {
        lines.push(format!("- ID: {}", p.id));
        lines.push(format!("  Title: {}", truncate(&p.title, MAX_TITLE_LEN)));
        if let Some(snippet) = p.snippet.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("  Snippet: {}", truncate(snippet, MAX_SNIPPET_LEN)));
        }
        if let Some(year) = p.year {
            lines.push(format!("  Year: {year}"));
        }
        if let Some(venue) = &p.venue {
            lines.push(format!("  Venue: {venue}"));
        }
    }
    lines.join("\n")
}

/// Match response entries to input papers by id; clamp scores, filter
/// tags, and default anything the model skipped. Output keeps batch order.
fn parse_scores(batch: &[RawPaper], response: &Value) -> Vec<ScoredPaper> {
    let mut scored: std::collections::HashMap<&str, ScoredPaper> = std::collections::HashMap::new();

    for item in response["results"].as_array().into_iter().flatten() {
        let Some(pid) = item["paper_id"].as_str() else { continue };
        let Some(paper) = batch.iter().find(|p| p.id == pid) else { continue };
        if scored.contains_key(pid) {
            continue;
        }

        let score = item["relevance_score"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
        let reason = item["relevance_reason"].as_str().unwrap_or("").to_string();
        let tags: Vec<PaperTag> = item["tags"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|t| t.as_str())
            .filter_map(PaperTag::parse)
            .collect();

        scored.insert(
            &paper.id,
            ScoredPaper {
                paper: paper.clone(),
                relevance_score: score,
                relevance_reason: reason,
                tags,
            },
        );
    }

    batch
        .iter()
        .map(|p| scored.remove(p.id.as_str()).unwrap_or_else(|| default_score(p)))
        .collect()
}

fn default_score(paper: &RawPaper) -> ScoredPaper {
    ScoredPaper {
        paper: paper.clone(),
        relevance_score: 0.0,
        relevance_reason: "Scoring unavailable".to_string(),
        tags: Vec::new(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use litscout_common::models::{IntentType, SearchConstraints};
    use litscout_llm::LlmError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn intent() -> ParsedIntent {
        ParsedIntent {
            topic: "test topic".to_string(),
            concepts: vec!["alpha".to_string()],
            intent_type: IntentType::Method,
            constraints: SearchConstraints::default(),
        }
    }

    fn papers(n: usize) -> Vec<RawPaper> {
        (0..n)
            .map(|i| RawPaper {
                id: format!("p{i}"),
                title: format!("Paper {i}"),
                source: "test".to_string(),
                ..Default::default()
            })
            .collect()
    }

    /// Scores every requested paper 0.5 and counts calls + peak inflight.
    struct CountingLlm {
        calls: AtomicUsize,
        inflight: AtomicUsize,
        peak_inflight: AtomicUsize,
    }

    impl CountingLlm {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                inflight: AtomicUsize::new(0),
                peak_inflight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        async fn complete(&self, _s: &str, _u: &str) -> Result<String, LlmError> {
            Ok(String::new())
        }

        async fn complete_json(
            &self,
            _s: &str,
            user_message: &str,
            _schema: Option<&Value>,
        ) -> Result<Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_inflight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);

            let results: Vec<Value> = user_message
                .lines()
                .filter_map(|line| line.strip_prefix("- ID: "))
                .map(|pid| {
                    json!({
                        "paper_id": pid,
                        "relevance_score": 0.5,
                        "relevance_reason": "stub",
                        "tags": ["method"]
                    })
                })
                .collect();
            Ok(json!({"results": results}))
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        async fn complete(&self, _s: &str, _u: &str) -> Result<String, LlmError> {
            Err(LlmError::Response("down".to_string()))
        }
        async fn complete_json(
            &self,
            _s: &str,
            _u: &str,
            _schema: Option<&Value>,
        ) -> Result<Value, LlmError> {
            Err(LlmError::Response("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let llm = Arc::new(CountingLlm::new());
        let scorer = RelevanceScorer::new(llm.clone(), 10, 3);
        let out = scorer.score(Vec::new(), &intent()).await;
        assert!(out.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_count_is_ceil_of_batches() {
        let llm = Arc::new(CountingLlm::new());
        let scorer = RelevanceScorer::new(llm.clone(), 10, 3);
        let out = scorer.score(papers(25), &intent()).await;
        assert_eq!(out.len(), 25);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3); // ceil(25/10)
    }

    #[tokio::test]
    async fn test_inflight_never_exceeds_max_concurrency() {
        let llm = Arc::new(CountingLlm::new());
        let scorer = RelevanceScorer::new(llm.clone(), 1, 2);
        let out = scorer.score(papers(10), &intent()).await;
        assert_eq!(out.len(), 10);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 10);
        assert!(llm.peak_inflight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_output_order_matches_input_order() {
        let llm = Arc::new(CountingLlm::new());
        let scorer = RelevanceScorer::new(llm, 2, 4);
        let input = papers(9);
        let ids: Vec<String> = input.iter().map(|p| p.id.clone()).collect();
        let out = scorer.score(input, &intent()).await;
        let out_ids: Vec<String> = out.iter().map(|s| s.paper.id.clone()).collect();
        assert_eq!(ids, out_ids);
    }

    #[tokio::test]
    async fn test_model_failure_yields_defaults_with_full_length() {
        let scorer = RelevanceScorer::new(Arc::new(FailingLlm), 10, 3);
        let out = scorer.score(papers(12), &intent()).await;
        assert_eq!(out.len(), 12);
        assert!(out.iter().all(|s| s.relevance_score == 0.0));
        assert!(out.iter().all(|s| s.relevance_reason == "Scoring unavailable"));
    }

    #[test]
    fn test_parse_scores_clamps_and_filters() {
        let batch = papers(2);
        let response = json!({
            "results": [
                {"paper_id": "p0", "relevance_score": 7.5, "relevance_reason": "x", "tags": ["method", "bogus"]},
                {"paper_id": "p1", "relevance_score": -0.4, "relevance_reason": "y", "tags": []}
            ]
        });
        let out = parse_scores(&batch, &response);
        assert_eq!(out[0].relevance_score, 1.0);
        assert_eq!(out[0].tags, vec![PaperTag::Method]);
        assert_eq!(out[1].relevance_score, 0.0);
    }

    #[test]
    fn test_parse_scores_defaults_missing_papers() {
        let batch = papers(3);
        let response = json!({
            "results": [
                {"paper_id": "p1", "relevance_score": 0.8, "relevance_reason": "x", "tags": []}
            ]
        });
        let out = parse_scores(&batch, &response);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].relevance_reason, "Scoring unavailable");
        assert_eq!(out[1].relevance_score, 0.8);
        assert_eq!(out[2].relevance_reason, "Scoring unavailable");
    }

    #[test]
    fn test_parse_scores_ignores_unknown_and_duplicate_ids() {
        let batch = papers(1);
        let response = json!({
            "results": [
                {"paper_id": "ghost", "relevance_score": 0.9},
                {"paper_id": "p0", "relevance_score": 0.4},
                {"paper_id": "p0", "relevance_score": 0.9}
            ]
        });
        let out = parse_scores(&batch, &response);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].relevance_score, 0.4); // first wins
    }

    #[test]
    fn test_format_batch_truncates_long_fields() {
        let mut p = papers(1);
        p[0].title = "t".repeat(400);
        p[0].snippet = Some("s".repeat(900));
        let msg = format_batch(&p, &intent());
        let title_line = msg.lines().find(|l| l.contains("Title:")).unwrap();
        let snippet_line = msg.lines().find(|l| l.contains("Snippet:")).unwrap();
        assert!(title_line.len() < 220);
        assert!(snippet_line.len() < 520);
    }
}
