//! Checkpoint protocol: typed envelopes handed to an external decider.
//!
//! A checkpoint pairs a kind with a payload typed to that kind; the pairing
//! is total and exclusive by construction (enum variants). The decider
//! answers with a `Decision`.

use async_trait::async_trait;
use chrono::Utc;
use litscout_common::models::{Paper, PaperCollection, ParsedIntent, SearchStrategy};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    StrategyConfirmation,
    ResultReview,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKind::StrategyConfirmation => "strategy_confirmation",
            CheckpointKind::ResultReview => "result_review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Edit,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Edit => "edit",
            DecisionAction::Reject => "reject",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "approve" => Some(DecisionAction::Approve),
            "edit" => Some(DecisionAction::Edit),
            "reject" => Some(DecisionAction::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyPayload {
    pub intent: ParsedIntent,
    pub strategy: SearchStrategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultPayload {
    pub collection: PaperCollection,
    pub accumulated_papers: Vec<Paper>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CheckpointPayload {
    Strategy(StrategyPayload),
    Result(ResultPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub kind: CheckpointKind,
    pub payload: CheckpointPayload,
    pub run_id: String,
    pub iteration: usize,
    pub timestamp: String,
}

impl Checkpoint {
    pub fn strategy_confirmation(
        run_id: impl Into<String>,
        iteration: usize,
        intent: ParsedIntent,
        strategy: SearchStrategy,
    ) -> Self {
        Self {
            kind: CheckpointKind::StrategyConfirmation,
            payload: CheckpointPayload::Strategy(StrategyPayload { intent, strategy }),
            run_id: run_id.into(),
            iteration,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn result_review(
        run_id: impl Into<String>,
        iteration: usize,
        collection: PaperCollection,
        accumulated_papers: Vec<Paper>,
    ) -> Self {
        Self {
            kind: CheckpointKind::ResultReview,
            payload: CheckpointPayload::Result(ResultPayload { collection, accumulated_papers }),
            run_id: run_id.into(),
            iteration,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Stable identity for monotonic-advance checks in the session layer.
    pub fn signature(&self) -> String {
        format!("{}:{}:{}", self.run_id, self.iteration, self.kind.as_str())
    }

    /// The wire-facing checkpoint id.
    pub fn checkpoint_id(&self) -> String {
        format!("{}:{}", self.run_id, self.iteration)
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub action: DecisionAction,
    pub revised_data: Option<Value>,
    pub note: Option<String>,
}

impl Decision {
    pub fn approve() -> Self {
        Self { action: DecisionAction::Approve, revised_data: None, note: None }
    }

    pub fn edit(revised_data: Value) -> Self {
        Self { action: DecisionAction::Edit, revised_data: Some(revised_data), note: None }
    }

    pub fn reject(note: impl Into<String>) -> Self {
        Self { action: DecisionAction::Reject, revised_data: None, note: Some(note.into()) }
    }
}

/// The external decider. Implementations may block as long as they need;
/// the engine suspends until a decision arrives. Errors propagate out of
/// the run.
#[async_trait]
pub trait CheckpointHandler: Send + Sync {
    async fn handle(&self, checkpoint: Checkpoint) -> anyhow::Result<Decision>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_values() {
        assert_eq!(CheckpointKind::StrategyConfirmation.as_str(), "strategy_confirmation");
        assert_eq!(CheckpointKind::ResultReview.as_str(), "result_review");
    }

    #[test]
    fn test_action_parse_round_trip() {
        for action in [DecisionAction::Approve, DecisionAction::Edit, DecisionAction::Reject] {
            assert_eq!(DecisionAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(DecisionAction::parse("maybe"), None);
    }

    #[test]
    fn test_signature_and_checkpoint_id() {
        let ckpt = Checkpoint::result_review("run-1", 2, PaperCollection::empty("q"), Vec::new());
        assert_eq!(ckpt.signature(), "run-1:2:result_review");
        assert_eq!(ckpt.checkpoint_id(), "run-1:2");
    }

    #[test]
    fn test_kind_matches_payload_by_construction() {
        let ckpt = Checkpoint::result_review("r", 0, PaperCollection::empty("q"), Vec::new());
        assert_eq!(ckpt.kind, CheckpointKind::ResultReview);
        assert!(matches!(ckpt.payload, CheckpointPayload::Result(_)));
    }
}
