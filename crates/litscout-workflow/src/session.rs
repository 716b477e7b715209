//! Session layer: expose a running workflow to out-of-process callers.
//!
//! The engine expects a synchronous `handle(checkpoint) → decision`
//! contract; tool callers only have request/response. `CheckpointBridge`
//! converts between the two with a pair of coordinating signals: `handle`
//! parks the checkpoint and waits for `set_decision`, while the session
//! manager's wait loops watch for a pending checkpoint or completion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use litscout_common::config::AppConfig;
use litscout_common::models::PaperCollection;

use crate::checkpoints::{Checkpoint, CheckpointHandler, Decision};
use crate::engine::{ProgressReporter, SearchWorkflow};
use crate::views::{format_checkpoint_question, serialize_checkpoint_payload};

/// Responses too thin to count as a human decision when the session
/// requires one.
pub const TRIVIAL_RESPONSES: &[&str] =
    &["", "approve", "ok", "okay", "yes", "y", "proceed", "continue"];

pub fn is_trivial_response(response: &str) -> bool {
    TRIVIAL_RESPONSES.contains(&response.trim().to_lowercase().as_str())
}

// ── Checkpoint bridge ─────────────────────────────────────────────────────────

#[derive(Default)]
struct BridgeSlots {
    checkpoint: Option<Checkpoint>,
    decision: Option<Decision>,
    pending: bool,
}

/// Decider implementation that parks the pipeline at each checkpoint until
/// an external caller supplies a decision.
#[derive(Default)]
pub struct CheckpointBridge {
    slots: Mutex<BridgeSlots>,
    decision_ready: Notify,
}

impl CheckpointBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unblock `handle` with a decision.
    pub async fn set_decision(&self, decision: Decision) {
        {
            let mut slots = self.slots.lock().await;
            slots.decision = Some(decision);
        }
        self.decision_ready.notify_waiters();
    }

    pub async fn has_pending_checkpoint(&self) -> bool {
        self.slots.lock().await.pending
    }

    pub async fn current_checkpoint(&self) -> Option<Checkpoint> {
        self.slots.lock().await.checkpoint.clone()
    }

    /// Stable signature of the pending checkpoint, `None` when nothing is
    /// pending.
    pub async fn checkpoint_signature(&self) -> Option<String> {
        let slots = self.slots.lock().await;
        if slots.pending {
            slots.checkpoint.as_ref().map(|c| c.signature())
        } else {
            None
        }
    }
}

#[async_trait]
impl CheckpointHandler for CheckpointBridge {
    async fn handle(&self, checkpoint: Checkpoint) -> anyhow::Result<Decision> {
        {
            let mut slots = self.slots.lock().await;
            slots.checkpoint = Some(checkpoint);
            slots.decision = None;
            slots.pending = true;
        }
        loop {
            let notified = self.decision_ready.notified();
            {
                let mut slots = self.slots.lock().await;
                if let Some(decision) = slots.decision.take() {
                    slots.pending = false;
                    return Ok(decision);
                }
            }
            notified.await;
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct SessionState {
    phase: String,
    phase_details: Value,
    phase_updated_at: DateTime<Utc>,
    result: Option<PaperCollection>,
    error: Option<String>,
    is_complete: bool,
}

pub struct WorkflowSession {
    pub session_id: String,
    pub query: String,
    pub bridge: Arc<CheckpointBridge>,
    pub decide_wait_timeout: Duration,
    pub poll_interval: Duration,
    pub require_user_response: bool,
    state: StdMutex<SessionState>,
    started_at: std::time::Instant,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl WorkflowSession {
    fn new(query: &str, bridge: Arc<CheckpointBridge>, options: &SessionOptions) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            bridge,
            decide_wait_timeout: options.decide_wait_timeout,
            poll_interval: options.poll_interval,
            require_user_response: options.require_user_response,
            state: StdMutex::new(SessionState {
                phase: "created".to_string(),
                phase_details: json!({}),
                phase_updated_at: Utc::now(),
                result: None,
                error: None,
                is_complete: false,
            }),
            started_at: std::time::Instant::now(),
            task: StdMutex::new(None),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn update_progress(&self, phase: &str, details: Value) {
        let mut state = self.lock_state();
        state.phase = phase.to_string();
        state.phase_details = details;
        state.phase_updated_at = Utc::now();
    }

    pub fn is_complete(&self) -> bool {
        self.lock_state().is_complete
    }

    pub fn result(&self) -> Option<PaperCollection> {
        self.lock_state().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock_state().error.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn record_outcome(&self, outcome: anyhow::Result<PaperCollection>) {
        let mut state = self.lock_state();
        match outcome {
            Ok(collection) => {
                let paper_count = collection.papers.len();
                state.result = Some(collection);
                state.phase = "completed".to_string();
                state.phase_details = json!({"paper_count": paper_count});
            }
            Err(e) => {
                let message = format!("{e:#}");
                state.error = Some(message.clone());
                state.phase = "error".to_string();
                state.phase_details = json!({"message": message});
            }
        }
        state.phase_updated_at = Utc::now();
        state.is_complete = true;
    }
}

// ── Session manager ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub decide_wait_timeout: Duration,
    pub poll_interval: Duration,
    pub require_user_response: bool,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            decide_wait_timeout: Duration::from_secs_f64(
                config.session_decide_timeout_s.max(0.1),
            ),
            poll_interval: Duration::from_secs_f64(config.session_poll_interval_s.max(0.01)),
            require_user_response: config.require_user_response,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            decide_wait_timeout: Duration::from_secs_f64(15.0),
            poll_interval: Duration::from_millis(50),
            require_user_response: true,
        }
    }
}

/// Owns every live session. One writer (create/cleanup), many readers.
#[derive(Default)]
pub struct SessionManager {
    sessions: StdMutex<HashMap<String, Arc<WorkflowSession>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_sessions(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Arc<WorkflowSession>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a session and start its workflow from configuration.
    pub fn create(&self, query: &str, config: AppConfig) -> String {
        let options = SessionOptions::from_config(&config);
        self.spawn_session(query, options, move |bridge, reporter| {
            Ok(SearchWorkflow::from_config(&config)?
                .with_checkpoint_handler(bridge)
                .with_progress_reporter(reporter))
        })
    }

    /// Create a session around a caller-assembled workflow. The factory
    /// receives the session's bridge and progress reporter so the workflow
    /// pauses at this session's checkpoints.
    pub fn spawn_session<F>(&self, query: &str, options: SessionOptions, make_workflow: F) -> String
    where
        F: FnOnce(Arc<dyn CheckpointHandler>, ProgressReporter) -> anyhow::Result<SearchWorkflow>,
    {
        let bridge = Arc::new(CheckpointBridge::new());
        let session = Arc::new(WorkflowSession::new(query, bridge.clone(), &options));
        let session_id = session.session_id.clone();
        session.update_progress("starting", json!({}));

        let reporter: ProgressReporter = {
            let session = session.clone();
            Arc::new(move |phase: &str, details: Value| session.update_progress(phase, details))
        };
        let workflow = make_workflow(bridge as Arc<dyn CheckpointHandler>, reporter);

        let task = {
            let session = session.clone();
            tokio::spawn(async move {
                let outcome = match workflow {
                    Ok(workflow) => workflow.run(&session.query).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &outcome {
                    error!(session_id = %session.session_id, error = %e, "workflow failed");
                } else {
                    info!(session_id = %session.session_id, "workflow complete");
                }
                session.record_outcome(outcome);
            })
        };

        *session.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
        self.lock_sessions().insert(session_id.clone(), session);
        session_id
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<WorkflowSession>> {
        self.lock_sessions().get(session_id).cloned()
    }

    /// Cancel the background task (if still running) and drop the session.
    pub fn cleanup(&self, session_id: &str) {
        if let Some(session) = self.lock_sessions().remove(session_id) {
            let task = session.task.lock().unwrap_or_else(|p| p.into_inner()).take();
            if let Some(task) = task {
                if !task.is_finished() {
                    task.abort();
                }
            }
        }
    }

    /// Block until the session reaches a checkpoint, completes, or the
    /// timeout elapses.
    pub async fn wait_for_checkpoint_or_complete(
        &self,
        session_id: &str,
        timeout: Duration,
    ) -> Value {
        let Some(session) = self.get(session_id) else {
            return json!({"error": "Session not found"});
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if session.bridge.has_pending_checkpoint().await || session.is_complete() {
                return self.session_state(&session).await;
            }
            if tokio::time::Instant::now() >= deadline {
                return json!({"error": "Timeout waiting for workflow"});
            }
            tokio::time::sleep(session.poll_interval).await;
        }
    }

    /// After a decision, wait for a *new* checkpoint (distinct signature),
    /// completion, or timeout. A timeout while the pipeline is still
    /// running returns a processing snapshot rather than the stale
    /// checkpoint.
    pub async fn wait_after_decision(
        &self,
        session_id: &str,
        previous_signature: Option<&str>,
        timeout: Duration,
    ) -> Value {
        let Some(session) = self.get(session_id) else {
            return json!({"error": "Session not found"});
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if session.is_complete() {
                return self.session_state(&session).await;
            }
            let current = session.bridge.checkpoint_signature().await;
            if let Some(sig) = &current {
                if previous_signature != Some(sig.as_str()) {
                    return self.session_state(&session).await;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return self.session_state(&session).await;
            }
            tokio::time::sleep(session.poll_interval).await;
        }
    }

    /// Build the snapshot a tool caller sees.
    pub async fn session_state(&self, session: &WorkflowSession) -> Value {
        let mut snapshot = {
            let state = session.lock_state();
            json!({
                "session_id": session.session_id,
                "query": session.query,
                "is_complete": state.is_complete,
                "has_pending_checkpoint": false,
                "phase": state.phase,
                "phase_details": state.phase_details,
                "phase_updated_at": state.phase_updated_at.to_rfc3339(),
                "elapsed_s": (session.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
            })
        };

        let pending = session.bridge.has_pending_checkpoint().await;
        if pending {
            if let Some(ckpt) = session.bridge.current_checkpoint().await {
                snapshot["has_pending_checkpoint"] = json!(true);
                snapshot["checkpoint_kind"] = json!(ckpt.kind.as_str());
                snapshot["checkpoint_id"] = json!(ckpt.checkpoint_id());
                snapshot["iteration"] = json!(ckpt.iteration);
                snapshot["checkpoint_payload"] = serialize_checkpoint_payload(&ckpt);
                snapshot["user_action_required"] = json!(true);
                snapshot["user_question"] = json!(format_checkpoint_question(&ckpt));
                snapshot["user_options"] = json!(["approve", "edit", "reject"]);
                snapshot["summary"] = json!(crate::views::checkpoint_summary(ckpt.kind));
            }
        } else if !session.is_complete() {
            let phase = snapshot["phase"].as_str().unwrap_or("").to_string();
            snapshot["summary"] = json!(format!("Workflow processing ({phase})"));
        }

        if session.is_complete() {
            if let Some(result) = session.result() {
                snapshot["paper_count"] = json!(result.papers.len());
            }
        }
        if let Some(error) = session.error() {
            snapshot["error"] = json!(error);
        }

        snapshot
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoints::DecisionAction;
    use litscout_common::models::{IntentType, ParsedIntent, SearchConstraints, SearchStrategy};

    fn checkpoint(iteration: usize) -> Checkpoint {
        Checkpoint::strategy_confirmation(
            "run-1",
            iteration,
            ParsedIntent {
                topic: "t".to_string(),
                concepts: vec!["c".to_string()],
                intent_type: IntentType::Survey,
                constraints: SearchConstraints::default(),
            },
            SearchStrategy {
                queries: Vec::new(),
                sources: Vec::new(),
                filters: SearchConstraints::default(),
            },
        )
    }

    #[test]
    fn test_trivial_responses() {
        assert!(is_trivial_response(""));
        assert!(is_trivial_response("  OK  "));
        assert!(is_trivial_response("Approve"));
        assert!(!is_trivial_response("looks good but prefer newer papers"));
    }

    #[tokio::test]
    async fn test_bridge_blocks_until_decision() {
        let bridge = Arc::new(CheckpointBridge::new());
        assert!(!bridge.has_pending_checkpoint().await);

        let handler = bridge.clone();
        let pending = tokio::spawn(async move { handler.handle(checkpoint(0)).await });

        // Wait for handle() to park the checkpoint.
        while !bridge.has_pending_checkpoint().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(
            bridge.checkpoint_signature().await.as_deref(),
            Some("run-1:0:strategy_confirmation")
        );

        bridge.set_decision(Decision::approve()).await;
        let decision = pending.await.unwrap().unwrap();
        assert_eq!(decision.action, DecisionAction::Approve);
        assert!(!bridge.has_pending_checkpoint().await);
        assert!(bridge.checkpoint_signature().await.is_none());
    }

    #[tokio::test]
    async fn test_bridge_sequences_two_checkpoints() {
        let bridge = Arc::new(CheckpointBridge::new());

        for iteration in 0..2 {
            let handler = bridge.clone();
            let pending = tokio::spawn(async move { handler.handle(checkpoint(iteration)).await });
            while !bridge.has_pending_checkpoint().await {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            let sig = bridge.checkpoint_signature().await.unwrap();
            assert!(sig.starts_with(&format!("run-1:{iteration}")));
            bridge.set_decision(Decision::reject("next")).await;
            pending.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_decision_set_before_wait_is_not_lost() {
        let bridge = Arc::new(CheckpointBridge::new());
        // handle() stores the checkpoint, then yields before waiting; a
        // decision landing in that window must still be observed.
        let handler = bridge.clone();
        let pending = tokio::spawn(async move { handler.handle(checkpoint(0)).await });
        while !bridge.has_pending_checkpoint().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        bridge.set_decision(Decision::approve()).await;
        let decision = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("handle() must observe the decision")
            .unwrap()
            .unwrap();
        assert_eq!(decision.action, DecisionAction::Approve);
    }
}
