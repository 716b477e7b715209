//! Workflow engine: drives the six stages through checkpointed iterations.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use litscout_common::config::AppConfig;
use litscout_common::models::{
    Paper, PaperCollection, QueryBuilderInput, SearchStrategy, UserFeedback,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::checkpoints::{Checkpoint, CheckpointHandler, Decision, DecisionAction};
use crate::stages::{
    Deduplicating, Deduplicator, IntentParser, IntentParsing, Organizing, QueryBuilder,
    QueryBuilding, RelevanceScorer, ResultOrganizer, Scoring, Searcher, Searching,
};
use crate::state::WorkflowState;

/// Callback invoked at every phase transition with `(phase, details)`.
pub type ProgressReporter = Arc<dyn Fn(&str, Value) + Send + Sync>;

const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Orchestrates one run: intent parsing once, then up to `max_iterations`
/// passes of query-build → search → dedup → score → organize, framed by
/// the two checkpoints.
pub struct SearchWorkflow {
    intent_parser: Arc<dyn IntentParsing>,
    query_builder: Arc<dyn QueryBuilding>,
    searcher: Arc<dyn Searching>,
    deduplicator: Arc<dyn Deduplicating>,
    relevance_scorer: Arc<dyn Scoring>,
    result_organizer: Arc<dyn Organizing>,
    checkpoint_handler: Option<Arc<dyn CheckpointHandler>>,
    max_iterations: usize,
    enable_strategy_checkpoint: bool,
    progress_reporter: Option<ProgressReporter>,
}

impl SearchWorkflow {
    pub fn new(
        intent_parser: Arc<dyn IntentParsing>,
        query_builder: Arc<dyn QueryBuilding>,
        searcher: Arc<dyn Searching>,
        deduplicator: Arc<dyn Deduplicating>,
        relevance_scorer: Arc<dyn Scoring>,
        result_organizer: Arc<dyn Organizing>,
    ) -> Self {
        Self {
            intent_parser,
            query_builder,
            searcher,
            deduplicator,
            relevance_scorer,
            result_organizer,
            checkpoint_handler: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            enable_strategy_checkpoint: true,
            progress_reporter: None,
        }
    }

    pub fn with_checkpoint_handler(mut self, handler: Arc<dyn CheckpointHandler>) -> Self {
        self.checkpoint_handler = Some(handler);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_strategy_checkpoint(mut self, enabled: bool) -> Self {
        self.enable_strategy_checkpoint = enabled;
        self
    }

    pub fn with_progress_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Wire the concrete stages from configuration.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let llm = litscout_llm::create_provider(&config.llm)?;

        let mut sources = Vec::new();
        for source_cfg in config.sources.values().filter(|c| c.enabled) {
            sources.push(litscout_sources::create_source(source_cfg)?);
        }
        let available: Vec<String> =
            sources.iter().map(|s| s.source_name().to_string()).collect();

        Ok(Self::new(
            Arc::new(IntentParser::new(llm.clone(), &config.domain)),
            Arc::new(QueryBuilder::new(llm.clone(), &config.domain, available)),
            Arc::new(Searcher::new(sources)),
            Arc::new(Deduplicator::new(
                Some(llm.clone()),
                config.dedup_enable_llm_pass,
                config.dedup_llm_max_candidates,
            )),
            Arc::new(RelevanceScorer::new(
                llm,
                config.relevance_batch_size,
                config.relevance_max_concurrency,
            )),
            Arc::new(ResultOrganizer::default().with_max_results(config.default_max_results)),
        ))
    }

    fn report(&self, phase: &str, details: Value) {
        if let Some(reporter) = &self.progress_reporter {
            reporter(phase, details);
        }
    }

    pub async fn run(&self, user_input: &str) -> anyhow::Result<PaperCollection> {
        let run_id = Uuid::new_v4().to_string();
        let mut state = WorkflowState::new();

        self.report("intent_parsing", json!({}));
        let t0 = Instant::now();
        let intent = self
            .intent_parser
            .parse(user_input)
            .await
            .context("intent parsing failed")?;
        info!(elapsed_s = t0.elapsed().as_secs_f64(), "intent parsing complete");

        let mut last_collection: Option<PaperCollection> = None;

        while state.current_iteration < self.max_iterations {
            let iteration = state.current_iteration;
            self.report("query_building", json!({"iteration": iteration}));

            let qb_input = QueryBuilderInput {
                intent: intent.clone(),
                previous_strategies: state.previous_strategies(),
                user_feedback: state.latest_feedback(),
            };
            let t0 = Instant::now();
            let mut strategy = self.query_builder.build(&qb_input).await;
            info!(
                iteration,
                elapsed_s = t0.elapsed().as_secs_f64(),
                queries = strategy.queries.len(),
                "query building complete"
            );

            if self.enable_strategy_checkpoint {
                if let Some(handler) = &self.checkpoint_handler {
                    self.report(
                        "waiting_checkpoint",
                        json!({"checkpoint_kind": "strategy_confirmation", "iteration": iteration}),
                    );
                    let ckpt = Checkpoint::strategy_confirmation(
                        &run_id,
                        iteration,
                        intent.clone(),
                        strategy.clone(),
                    );
                    let decision = handler.handle(ckpt).await?;
                    match decision.action {
                        DecisionAction::Edit => {
                            strategy = validate_strategy(decision.revised_data)?;
                        }
                        DecisionAction::Reject => {
                            let feedback = coerce_feedback(&decision);
                            state.record_iteration(strategy, 0, Some(feedback));
                            self.report(
                                "iterating",
                                json!({"next_iteration": state.current_iteration}),
                            );
                            continue;
                        }
                        DecisionAction::Approve => {}
                    }
                }
            }

            self.report("searching", json!({"iteration": iteration}));
            let t0 = Instant::now();
            let raw = self.searcher.search(&strategy).await;
            info!(
                iteration,
                elapsed_s = t0.elapsed().as_secs_f64(),
                results = raw.len(),
                "search complete"
            );

            self.report(
                "deduplicating",
                json!({"iteration": iteration, "raw_count": raw.len()}),
            );
            let t0 = Instant::now();
            let raw_count = raw.len();
            let deduped = self.deduplicator.deduplicate(raw).await;
            info!(
                iteration,
                elapsed_s = t0.elapsed().as_secs_f64(),
                before = raw_count,
                after = deduped.len(),
                "deduplication complete"
            );

            self.report(
                "scoring",
                json!({"iteration": iteration, "candidate_count": deduped.len()}),
            );
            let t0 = Instant::now();
            let scored = self.relevance_scorer.score(deduped, &intent).await;
            info!(
                iteration,
                elapsed_s = t0.elapsed().as_secs_f64(),
                papers = scored.len(),
                "scoring complete"
            );

            self.report(
                "organizing",
                json!({"iteration": iteration, "scored_count": scored.len()}),
            );
            let collection = self
                .result_organizer
                .organize(scored, &strategy, user_input)
                .await;
            last_collection = Some(collection.clone());

            let decision = match &self.checkpoint_handler {
                Some(handler) => {
                    self.report(
                        "waiting_checkpoint",
                        json!({
                            "checkpoint_kind": "result_review",
                            "iteration": iteration,
                            "paper_count": collection.papers.len(),
                        }),
                    );
                    let ckpt = Checkpoint::result_review(
                        &run_id,
                        iteration,
                        collection.clone(),
                        state.accumulated_papers.clone(),
                    );
                    handler.handle(ckpt).await?
                }
                None => Decision::approve(),
            };

            if decision.action == DecisionAction::Approve {
                let paper_count = collection.papers.len();
                state.record_iteration(strategy, paper_count, None);
                state.is_complete = true;
                self.report(
                    "completed",
                    json!({"iteration": iteration, "paper_count": paper_count}),
                );
                return Ok(merge_accumulated(collection, &state.accumulated_papers));
            }

            // EDIT or REJECT: fold the decision into feedback and iterate.
            let feedback = coerce_feedback(&decision);
            accumulate_relevant(&mut state, &collection, &feedback);
            state.record_iteration(strategy, collection.papers.len(), Some(feedback));
            self.report("iterating", json!({"next_iteration": state.current_iteration}));
        }

        state.is_complete = true;
        self.report("completed", json!({"reason": "max_iterations_reached"}));
        Ok(match last_collection {
            Some(collection) => merge_accumulated(collection, &state.accumulated_papers),
            None => PaperCollection::empty(user_input),
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn validate_strategy(revised_data: Option<Value>) -> anyhow::Result<SearchStrategy> {
    let data = revised_data.context("EDIT decision carried no revised strategy")?;
    serde_json::from_value(data).context("revised data is not a valid search strategy")
}

/// A decision's `revised_data` becomes feedback when it parses as
/// `UserFeedback`; otherwise the note (or an empty string) does.
pub fn coerce_feedback(decision: &Decision) -> UserFeedback {
    if let Some(data) = &decision.revised_data {
        if data.is_object() {
            if let Ok(feedback) = serde_json::from_value::<UserFeedback>(data.clone()) {
                return feedback;
            }
        }
    }
    UserFeedback {
        free_text_feedback: Some(decision.note.clone().unwrap_or_default()),
        ..Default::default()
    }
}

/// Stash papers the decider marked relevant so they survive iteration.
fn accumulate_relevant(state: &mut WorkflowState, collection: &PaperCollection, feedback: &UserFeedback) {
    if feedback.marked_relevant.is_empty() {
        return;
    }
    let matching: Vec<Paper> = collection
        .papers
        .iter()
        .filter(|p| feedback.marked_relevant.contains(&p.id))
        .cloned()
        .collect();
    state.add_accumulated(matching);
}

/// Append accumulated papers not already present (by id) to the collection.
pub fn merge_accumulated(mut collection: PaperCollection, accumulated: &[Paper]) -> PaperCollection {
    if accumulated.is_empty() {
        return collection;
    }
    let current_ids: std::collections::HashSet<&str> =
        collection.papers.iter().map(|p| p.id.as_str()).collect();
    let extras: Vec<Paper> = accumulated
        .iter()
        .filter(|p| !current_ids.contains(p.id.as_str()))
        .cloned()
        .collect();
    collection.papers.extend(extras);
    collection
}

// ── Tests ─────────────────────────────────────────────────────────────────────
