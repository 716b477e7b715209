//! Query building stage: intent + iteration context → `SearchStrategy`.

use std::sync::Arc;

use async_trait::async_trait;
use litscout_common::models::{
    QueryBuilderInput, SearchConstraints, SearchQuery, SearchStrategy,
};
use litscout_llm::LlmProvider;
use tracing::warn;

use crate::prompts::domains::compose_prompt;
use crate::prompts::QUERY_BUILDING_SYSTEM;

use super::QueryBuilding;

const MAX_RESULTS_FLOOR: usize = 1;
const MAX_RESULTS_CEILING: usize = 200;

pub struct QueryBuilder {
    llm: Arc<dyn LlmProvider>,
    domain: String,
    available_sources: Vec<String>,
}

impl QueryBuilder {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        domain: impl Into<String>,
        available_sources: Vec<String>,
    ) -> Self {
        Self { llm, domain: domain.into(), available_sources }
    }

    fn format_user_message(&self, input: &QueryBuilderInput) -> String {
        let intent = &input.intent;
        let c = &intent.constraints;
        let mut parts = vec![
            format!("Topic: {}", intent.topic),
            format!("Concepts: {}", intent.concepts.join(", ")),
            format!("Intent type: {}", intent.intent_type.as_str()),
            format!(
                "Constraints: year_from={}, year_to={}, language={}, max_results={}",
                opt(c.year_from),
                opt(c.year_to),
                c.language.as_deref().unwrap_or("None"),
                c.max_results,
            ),
            format!("Available sources: {}", self.available_sources.join(", ")),
        ];

        if !input.previous_strategies.is_empty() {
            let summary: Vec<String> = input
                .previous_strategies
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let queries: Vec<&str> =
                        s.queries.iter().map(|q| q.boolean_query.as_str()).collect();
                    format!("  Strategy {}: {}", i + 1, queries.join("; "))
                })
                .collect();
            parts.push(format!(
                "Previous strategies (avoid repeating):\n{}",
                summary.join("\n")
            ));
        }

        if let Some(fb) = &input.user_feedback {
            let mut feedback_parts = Vec::new();
            if !fb.marked_relevant.is_empty() {
                feedback_parts.push(format!(
                    "  Papers marked relevant: {:?}",
                    fb.marked_relevant
                ));
            }
            if !fb.marked_irrelevant.is_empty() {
                feedback_parts.push(format!(
                    "  Papers marked irrelevant: {:?}",
                    fb.marked_irrelevant
                ));
            }
            if let Some(text) = fb.free_text_feedback.as_deref().filter(|t| !t.is_empty()) {
                feedback_parts.push(format!("  User comment: {text}"));
            }
            if !feedback_parts.is_empty() {
                parts.push(format!("User feedback:\n{}", feedback_parts.join("\n")));
            }
        }

        parts.join("\n")
    }

    /// Repair a model-produced strategy so downstream stages can rely on it.
    fn sanitize(&self, mut strategy: SearchStrategy, input: &QueryBuilderInput) -> SearchStrategy {
        strategy
            .sources
            .retain(|s| self.available_sources.contains(s));
        if strategy.sources.is_empty() {
            strategy.sources = self.available_sources.clone();
        }

        let f = &mut strategy.filters;
        if let (Some(from), Some(to)) = (f.year_from, f.year_to) {
            if from > to {
                f.year_from = Some(to);
                f.year_to = Some(from);
            }
        }
        f.max_results = f.max_results.clamp(MAX_RESULTS_FLOOR, MAX_RESULTS_CEILING);

        if strategy.queries.is_empty() {
            strategy.queries = vec![fallback_query(input)];
        }

        strategy
    }

    fn fallback_strategy(&self, input: &QueryBuilderInput) -> SearchStrategy {
        let c = &input.intent.constraints;
        SearchStrategy {
            queries: vec![fallback_query(input)],
            sources: self.available_sources.clone(),
            filters: SearchConstraints {
                year_from: c.year_from,
                year_to: c.year_to,
                language: c.language.clone(),
                max_results: c.max_results.clamp(MAX_RESULTS_FLOOR, MAX_RESULTS_CEILING),
            },
        }
    }
}

#[async_trait]
impl QueryBuilding for QueryBuilder {
    async fn build(&self, input: &QueryBuilderInput) -> SearchStrategy {
        let prompt = compose_prompt(QUERY_BUILDING_SYSTEM, &self.domain);
        let user_msg = self.format_user_message(input);

        match self.llm.complete_json(&prompt, &user_msg, None).await {
            Ok(raw) => match serde_json::from_value::<SearchStrategy>(raw) {
                Ok(strategy) => self.sanitize(strategy, input),
                Err(e) => {
                    warn!(error = %e, "strategy did not match schema, using fallback");
                    self.fallback_strategy(input)
                }
            },
            Err(e) => {
                warn!(error = %e, "query building model call failed, using fallback");
                self.fallback_strategy(input)
            }
        }
    }
}

/// Deterministic query: intent concepts AND-joined.
fn fallback_query(input: &QueryBuilderInput) -> SearchQuery {
    let concepts = if input.intent.concepts.is_empty() {
        vec![input.intent.topic.clone()]
    } else {
        input.intent.concepts.clone()
    };
    SearchQuery {
        boolean_query: concepts.join(" AND "),
        keywords: concepts,
        synonym_map: Vec::new(),
    }
}

fn opt(value: Option<i32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}
