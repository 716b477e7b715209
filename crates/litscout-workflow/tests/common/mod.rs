//! Shared scripted stand-ins for the engine and session test suites.
#![allow(dead_code)] // each test crate uses a different subset

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use litscout_common::models::{
    IntentType, ParsedIntent, QueryBuilderInput, RawPaper, ScoredPaper, SearchConstraints,
    SearchQuery, SearchStrategy,
};
use litscout_llm::LlmError;
use litscout_workflow::checkpoints::{Checkpoint, CheckpointHandler, Decision};
use litscout_workflow::stages::{IntentParsing, QueryBuilding, Scoring, Searching};

pub fn intent() -> ParsedIntent {
    ParsedIntent {
        topic: "test topic".to_string(),
        concepts: vec!["alpha".to_string(), "beta".to_string()],
        intent_type: IntentType::Survey,
        constraints: SearchConstraints::default(),
    }
}

pub fn strategy() -> SearchStrategy {
    SearchStrategy {
        queries: vec![SearchQuery {
            keywords: vec!["alpha".to_string(), "beta".to_string()],
            synonym_map: Vec::new(),
            boolean_query: "alpha AND beta".to_string(),
        }],
        sources: vec!["serpapi_scholar".to_string()],
        filters: SearchConstraints::default(),
    }
}

pub fn raw_paper(id: &str, title: &str) -> RawPaper {
    RawPaper {
        id: id.to_string(),
        title: title.to_string(),
        source: "test".to_string(),
        year: Some(2023),
        ..Default::default()
    }
}

// ── Stage stand-ins ───────────────────────────────────────────────────────────

pub struct FixedIntentParser;

#[async_trait]
impl IntentParsing for FixedIntentParser {
    async fn parse(&self, _user_input: &str) -> Result<ParsedIntent, LlmError> {
        Ok(intent())
    }
}

pub struct FailingIntentParser;

#[async_trait]
impl IntentParsing for FailingIntentParser {
    async fn parse(&self, _user_input: &str) -> Result<ParsedIntent, LlmError> {
        Err(LlmError::Response("unintelligible".to_string()))
    }
}

/// Returns the canned strategy and records every input it was given.
#[derive(Default)]
pub struct RecordingQueryBuilder {
    pub inputs: Mutex<Vec<QueryBuilderInput>>,
}

#[async_trait]
impl QueryBuilding for RecordingQueryBuilder {
    async fn build(&self, input: &QueryBuilderInput) -> SearchStrategy {
        self.inputs.lock().unwrap().push(input.clone());
        strategy()
    }
}

/// Pops one result set per call (repeats the last one when exhausted) and
/// records the strategy used for each call.
pub struct ScriptedSearcher {
    results: Mutex<VecDeque<Vec<RawPaper>>>,
    pub strategies: Mutex<Vec<SearchStrategy>>,
    pub delay: Option<Duration>,
}

impl ScriptedSearcher {
    pub fn new(results: Vec<Vec<RawPaper>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            strategies: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Searching for ScriptedSearcher {
    async fn search(&self, strategy: &SearchStrategy) -> Vec<RawPaper> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.strategies.lock().unwrap().push(strategy.clone());
        let mut results = self.results.lock().unwrap();
        if results.len() > 1 {
            results.pop_front().unwrap_or_default()
        } else {
            results.front().cloned().unwrap_or_default()
        }
    }
}

/// Scores papers from a fixed (id → score) table; unknown ids get 0.9.
pub struct TableScorer {
    pub scores: Vec<(&'static str, f64)>,
}

#[async_trait]
impl Scoring for TableScorer {
    async fn score(&self, papers: Vec<RawPaper>, _intent: &ParsedIntent) -> Vec<ScoredPaper> {
        papers
            .into_iter()
            .map(|p| {
                let score = self
                    .scores
                    .iter()
                    .find(|(id, _)| *id == p.id)
                    .map(|(_, s)| *s)
                    .unwrap_or(0.9);
                ScoredPaper {
                    paper: p,
                    relevance_score: score,
                    relevance_reason: "scripted".to_string(),
                    tags: Vec::new(),
                }
            })
            .collect()
    }
}

// ── Scripted decider ──────────────────────────────────────────────────────────

/// Answers checkpoints from a queue of decisions (approve once exhausted)
/// and records every checkpoint it saw.
#[derive(Default)]
pub struct ScriptedHandler {
    decisions: Mutex<VecDeque<Decision>>,
    pub calls: Mutex<Vec<Checkpoint>>,
}

impl ScriptedHandler {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckpointHandler for ScriptedHandler {
    async fn handle(&self, checkpoint: Checkpoint) -> anyhow::Result<Decision> {
        self.calls.lock().unwrap().push(checkpoint);
        let next = self.decisions.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(Decision::approve))
    }
}
