//! Intent parsing stage: natural language → `ParsedIntent`.

use std::sync::Arc;

use async_trait::async_trait;
use litscout_common::models::ParsedIntent;
use litscout_llm::{LlmError, LlmProvider};

use crate::prompts::domains::compose_prompt;
use crate::prompts::INTENT_PARSING_SYSTEM;

use super::IntentParsing;

pub struct IntentParser {
    llm: Arc<dyn LlmProvider>,
    domain: String,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn LlmProvider>, domain: impl Into<String>) -> Self {
        Self { llm, domain: domain.into() }
    }
}

#[async_trait]
impl IntentParsing for IntentParser {
    async fn parse(&self, user_input: &str) -> Result<ParsedIntent, LlmError> {
        let prompt = compose_prompt(INTENT_PARSING_SYSTEM, &self.domain);
        let raw = self.llm.complete_json(&prompt, user_input, None).await?;
        let intent: ParsedIntent = serde_json::from_value(raw)
            .map_err(|e| LlmError::Response(format!("intent did not match schema: {e}")))?;
        validate(intent)
    }
}

/// A run cannot proceed without a topic and at least one concept; a
/// reversed year range is repaired rather than rejected.
fn validate(mut intent: ParsedIntent) -> Result<ParsedIntent, LlmError> {
    if intent.topic.trim().is_empty() {
        return Err(LlmError::Response("intent has an empty topic".to_string()));
    }
    intent.concepts.retain(|c| !c.trim().is_empty());
    if intent.concepts.is_empty() {
        return Err(LlmError::Response("intent has no concepts".to_string()));
    }
    let c = &mut intent.constraints;
    if let (Some(from), Some(to)) = (c.year_from, c.year_to) {
        if from > to {
            c.year_from = Some(to);
            c.year_to = Some(from);
        }
    }
    Ok(intent)
}
