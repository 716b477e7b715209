//! Workflow state carried across search iterations.

use litscout_common::models::{Paper, SearchStrategy, UserFeedback};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub strategy: SearchStrategy,
    pub result_count: usize,
    pub feedback: Option<UserFeedback>,
}

#[derive(Debug, Default, Serialize)]
pub struct WorkflowState {
    pub current_iteration: usize,
    pub history: Vec<IterationRecord>,
    /// Papers the decider marked relevant, deduplicated by id across
    /// iterations. First occurrence wins.
    pub accumulated_papers: Vec<Paper>,
    pub is_complete: bool,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_iteration(
        &mut self,
        strategy: SearchStrategy,
        result_count: usize,
        feedback: Option<UserFeedback>,
    ) {
        self.history.push(IterationRecord {
            iteration: self.current_iteration,
            strategy,
            result_count,
            feedback,
        });
        self.current_iteration += 1;
    }

    pub fn previous_strategies(&self) -> Vec<SearchStrategy> {
        self.history.iter().map(|r| r.strategy.clone()).collect()
    }

    /// Feedback attached to the most recent iteration, if any.
    pub fn latest_feedback(&self) -> Option<UserFeedback> {
        self.history.last().and_then(|r| r.feedback.clone())
    }

    pub fn add_accumulated(&mut self, papers: Vec<Paper>) {
        let mut existing: std::collections::HashSet<String> =
            self.accumulated_papers.iter().map(|p| p.id.clone()).collect();
        for paper in papers {
            if existing.insert(paper.id.clone()) {
                self.accumulated_papers.push(paper);
            }
        }
    }
}
