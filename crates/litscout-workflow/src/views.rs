//! Checkpoint serialization and human-readable formatting for snapshots.
//!
//! Everything leaving the session layer is plain JSON: enums become their
//! string values and timestamps are ISO-8601 strings. Result payloads are
//! truncated so a snapshot stays a sane size for a tool response.

use serde_json::{json, Value};

use litscout_common::models::Paper;

use crate::checkpoints::{Checkpoint, CheckpointKind, CheckpointPayload};

/// Papers included verbatim in a serialized result payload; anything past
/// this is summarized by `total_papers` + `truncated`.
pub const RESULT_PAYLOAD_MAX_PAPERS: usize = 30;

const QUESTION_DETAIL_PAPERS: usize = 15;

fn score_distribution(papers: &[Paper]) -> Value {
    let high = papers.iter().filter(|p| p.relevance_score >= 0.7).count();
    let medium = papers
        .iter()
        .filter(|p| p.relevance_score >= 0.3 && p.relevance_score < 0.7)
        .count();
    let low = papers.iter().filter(|p| p.relevance_score < 0.3).count();
    json!({"high": high, "medium": medium, "low": low})
}

/// Serialize a checkpoint payload for tool-caller consumption.
pub fn serialize_checkpoint_payload(checkpoint: &Checkpoint) -> Value {
    match &checkpoint.payload {
        CheckpointPayload::Strategy(payload) => {
            let c = &payload.intent.constraints;
            json!({
                "intent": {
                    "topic": payload.intent.topic,
                    "concepts": payload.intent.concepts,
                    "intent_type": payload.intent.intent_type.as_str(),
                    "constraints": {
                        "year_from": c.year_from,
                        "year_to": c.year_to,
                        "language": c.language,
                        "max_results": c.max_results,
                    },
                },
                "strategy": {
                    "queries": payload.strategy.queries.iter().map(|q| json!({
                        "keywords": q.keywords,
                        "boolean_query": q.boolean_query,
                    })).collect::<Vec<_>>(),
                    "sources": payload.strategy.sources,
                    "filters": {
                        "year_from": payload.strategy.filters.year_from,
                        "year_to": payload.strategy.filters.year_to,
                        "language": payload.strategy.filters.language,
                        "max_results": payload.strategy.filters.max_results,
                    },
                },
            })
        }
        CheckpointPayload::Result(payload) => {
            let all_papers = &payload.collection.papers;
            let truncated = all_papers.len() > RESULT_PAYLOAD_MAX_PAPERS;
            let shown: Vec<Value> = all_papers
                .iter()
                .take(RESULT_PAYLOAD_MAX_PAPERS)
                .map(|p| {
                    json!({
                        "id": p.id,
                        "doi": p.doi,
                        "title": p.title,
                        "authors": p.authors.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                        "year": p.year,
                        "venue": p.venue,
                        "relevance_score": p.relevance_score,
                        "relevance_reason": p.relevance_reason,
                        "tags": p.tags.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            json!({
                "papers": shown,
                "total_papers": all_papers.len(),
                "truncated": truncated,
                "score_distribution": score_distribution(all_papers),
                "facets": serde_json::to_value(&payload.collection.facets)
                    .unwrap_or_else(|_| json!({})),
                "accumulated_count": payload.accumulated_papers.len(),
            })
        }
    }
}

/// Render the checkpoint as a Markdown question for a human decider.
pub fn format_checkpoint_question(checkpoint: &Checkpoint) -> String {
    match &checkpoint.payload {
        CheckpointPayload::Strategy(payload) => {
            let queries_text = payload
                .strategy
                .queries
                .iter()
                .enumerate()
                .map(|(i, q)| format!("  {}. {}", i + 1, q.boolean_query))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "## Search Strategy Review\n\n\
                 **Topic:** {}\n\
                 **Concepts:** {}\n\
                 **Intent:** {}\n\n\
                 **Proposed queries:**\n{}\n\n\
                 **Sources:** {}\n\n\
                 Please choose an action:\n\
                 1. **Approve** - proceed with searching\n\
                 2. **Reject** - generate new queries with your feedback\n",
                payload.intent.topic,
                payload.intent.concepts.join(", "),
                payload.intent.intent_type.as_str(),
                queries_text,
                payload.strategy.sources.join(", "),
            )
        }
        CheckpointPayload::Result(payload) => {
            let papers = &payload.collection.papers;
            let n = papers.len();
            let shown = papers.len().min(QUESTION_DETAIL_PAPERS);

            let mut detail_lines = Vec::new();
            for (i, p) in papers.iter().take(shown).enumerate() {
                let mut line = format!(
                    "  {}. **[{:.2}]** {}\n     DOI: {} | Year: {} | Venue: {}",
                    i + 1,
                    p.relevance_score,
                    p.title,
                    p.doi.as_deref().unwrap_or("N/A"),
                    p.year.map(|y| y.to_string()).unwrap_or_else(|| "N/A".to_string()),
                    p.venue.as_deref().unwrap_or("N/A"),
                );
                if !p.tags.is_empty() {
                    let tags: Vec<&str> = p.tags.iter().map(|t| t.as_str()).collect();
                    line.push_str(&format!(" | Tags: {}", tags.join(", ")));
                }
                if !p.relevance_reason.is_empty() {
                    line.push_str(&format!("\n     Reason: {}", p.relevance_reason));
                }
                detail_lines.push(line);
            }

            let dist = score_distribution(papers);
            let dist_text = format!(
                "**Score distribution:** High (>=0.7): {}, Medium (0.3-0.7): {}, Low (<0.3): {}",
                dist["high"], dist["medium"], dist["low"],
            );

            let facets = &payload.collection.facets;
            let mut facet_parts = Vec::new();
            if !facets.by_venue.is_empty() {
                let venues: Vec<String> =
                    facets.by_venue.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                facet_parts.push(format!("**Venues:** {}", venues.join(", ")));
            }
            if !facets.top_authors.is_empty() {
                facet_parts.push(format!("**Top authors:** {}", facets.top_authors.join(", ")));
            }
            if !facets.key_themes.is_empty() {
                facet_parts.push(format!("**Key themes:** {}", facets.key_themes.join(", ")));
            }

            let more_text = if n > shown {
                format!("\n... and {} more papers\n", n - shown)
            } else {
                String::new()
            };

            let full_lines: Vec<String> = papers
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    format!(
                        "  {}. [{:.2}] {} | DOI: {}",
                        i + 1,
                        p.relevance_score,
                        p.title,
                        p.doi.as_deref().unwrap_or("-"),
                    )
                })
                .collect();

            format!(
                "## Search Results Review\n\n\
                 Found **{n} papers** (showing top {shown} in detail):\n\n\
                 {}\n{}\n{}\n\n{}\n\n\
                 **Complete paper list:**\n{}\n\n\
                 Please choose an action:\n\
                 1. **Approve** - accept results and finish\n\
                 2. **Reject** - search again with your feedback\n",
                detail_lines.join("\n"),
                more_text,
                dist_text,
                facet_parts.join("\n"),
                full_lines.join("\n"),
            )
        }
    }
}

/// Summary line used when no checkpoint detail is wanted.
pub fn checkpoint_summary(kind: CheckpointKind) -> &'static str {
    match kind {
        CheckpointKind::StrategyConfirmation => "Strategy ready for review",
        CheckpointKind::ResultReview => "Results ready for review",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
