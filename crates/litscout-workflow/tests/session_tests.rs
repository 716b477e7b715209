//! Session-layer protocol tests: checkpoint bridging, monotonic advance,
//! processing snapshots, and cross-session isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use litscout_workflow::checkpoints::Decision;
use litscout_workflow::session::{SessionManager, SessionOptions};
use litscout_workflow::stages::{Deduplicator, ResultOrganizer};
use litscout_workflow::SearchWorkflow;

const WAIT: Duration = Duration::from_secs(5);

fn options() -> SessionOptions {
    SessionOptions {
        decide_wait_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
        require_user_response: false,
    }
}

/// Spawn a session whose workflow pauses at both checkpoints.
fn spawn(manager: &SessionManager, query: &str, search_delay: Option<Duration>) -> String {
    let searcher = {
        let s = ScriptedSearcher::new(vec![vec![
            raw_paper("p1", "First Fake Paper"),
            raw_paper("p2", "Second Fake Paper"),
        ]]);
        match search_delay {
            Some(delay) => Arc::new(s.with_delay(delay)),
            None => Arc::new(s),
        }
    };
    manager.spawn_session(query, options(), move |bridge, reporter| {
        Ok(SearchWorkflow::new(
            Arc::new(FixedIntentParser),
            Arc::new(RecordingQueryBuilder::default()),
            searcher,
            Arc::new(Deduplicator::new(None, false, 60)),
            Arc::new(TableScorer { scores: vec![("p1", 0.9), ("p2", 0.6)] }),
            Arc::new(ResultOrganizer::default()),
        )
        .with_checkpoint_handler(bridge)
        .with_progress_reporter(reporter))
    })
}

async fn decide(
    manager: &SessionManager,
    session_id: &str,
    decision: Decision,
) -> serde_json::Value {
    let session = manager.get(session_id).expect("session exists");
    let previous = session.bridge.checkpoint_signature().await;
    session.bridge.set_decision(decision).await;
    manager
        .wait_after_decision(session_id, previous.as_deref(), WAIT)
        .await
}

#[tokio::test]
async fn start_pauses_at_strategy_confirmation() {
    let manager = SessionManager::new();
    let id = spawn(&manager, "perovskite solar cells", None);

    let snapshot = manager.wait_for_checkpoint_or_complete(&id, WAIT).await;
    assert_eq!(snapshot["has_pending_checkpoint"], true);
    assert_eq!(snapshot["checkpoint_kind"], "strategy_confirmation");
    assert_eq!(snapshot["user_action_required"], true);
    assert_eq!(snapshot["is_complete"], false);
    assert!(snapshot["checkpoint_payload"]["strategy"]["queries"].is_array());
    assert!(snapshot["user_question"]
        .as_str()
        .unwrap()
        .contains("Search Strategy Review"));
}

#[tokio::test]
async fn approve_advances_to_result_review_with_new_id() {
    let manager = SessionManager::new();
    let id = spawn(&manager, "query", None);

    let first = manager.wait_for_checkpoint_or_complete(&id, WAIT).await;
    let first_id = first["checkpoint_id"].as_str().unwrap().to_string();

    let second = decide(&manager, &id, Decision::approve()).await;
    assert_eq!(second["has_pending_checkpoint"], true);
    assert_eq!(second["checkpoint_kind"], "result_review");
    // Monotonic advance: a decided checkpoint is never returned again.
    assert_ne!(second["checkpoint_id"].as_str().unwrap(), first_id);
}

#[tokio::test]
async fn approving_results_completes_with_paper_count() {
    let manager = SessionManager::new();
    let id = spawn(&manager, "query", None);

    manager.wait_for_checkpoint_or_complete(&id, WAIT).await;
    decide(&manager, &id, Decision::approve()).await;
    let final_snapshot = decide(&manager, &id, Decision::approve()).await;

    assert_eq!(final_snapshot["is_complete"], true);
    assert_eq!(final_snapshot["paper_count"], 2);
    assert!(final_snapshot.get("error").is_none());

    let session = manager.get(&id).unwrap();
    assert_eq!(session.result().unwrap().papers.len(), 2);
}

#[tokio::test]
async fn decide_timeout_returns_processing_snapshot() {
    let manager = SessionManager::new();
    let id = spawn(&manager, "query", Some(Duration::from_millis(400)));

    manager.wait_for_checkpoint_or_complete(&id, WAIT).await;

    // The search sleeps far longer than this wait; decide must come back
    // with a processing snapshot, not the stale strategy checkpoint.
    let session = manager.get(&id).unwrap();
    let previous = session.bridge.checkpoint_signature().await;
    session.bridge.set_decision(Decision::approve()).await;
    let snapshot = manager
        .wait_after_decision(&id, previous.as_deref(), Duration::from_millis(50))
        .await;

    assert_eq!(snapshot["is_complete"], false);
    assert_eq!(snapshot["has_pending_checkpoint"], false);
    assert!(snapshot["phase"].is_string());
    assert!(snapshot["summary"]
        .as_str()
        .unwrap()
        .starts_with("Workflow processing"));
}

// ── S6: concurrent sessions stay isolated ─────────────────────────────────────

#[tokio::test]
async fn concurrent_sessions_do_not_observe_each_other() {
    let manager = SessionManager::new();
    let id_a = spawn(&manager, "query A", None);
    let id_b = spawn(&manager, "query B", None);

    let snap_a = manager.wait_for_checkpoint_or_complete(&id_a, WAIT).await;
    let snap_b = manager.wait_for_checkpoint_or_complete(&id_b, WAIT).await;
    let first_b_id = snap_b["checkpoint_id"].as_str().unwrap().to_string();
    assert_ne!(
        snap_a["checkpoint_id"].as_str().unwrap(),
        first_b_id,
        "sessions must have distinct run ids"
    );

    // Advance A once; B's pending checkpoint is untouched.
    let advanced_a = decide(&manager, &id_a, Decision::approve()).await;
    let session_b = manager.get(&id_b).unwrap();
    let still_b = manager.session_state(&session_b).await;
    assert_eq!(still_b["checkpoint_id"].as_str().unwrap(), first_b_id);
    assert_eq!(still_b["checkpoint_kind"], "strategy_confirmation");

    // A's decide returned a new checkpoint or completion, never the old id.
    let advanced_id = advanced_a["checkpoint_id"].as_str();
    let complete = advanced_a["is_complete"] == true;
    assert!(
        complete || advanced_id != snap_a["checkpoint_id"].as_str(),
        "decide must not race-return the decided checkpoint"
    );
}

#[tokio::test]
async fn errors_are_reported_in_snapshots() {
    let manager = SessionManager::new();
    let id = manager.spawn_session("query", options(), |bridge, reporter| {
        Ok(SearchWorkflow::new(
            Arc::new(FailingIntentParser),
            Arc::new(RecordingQueryBuilder::default()),
            Arc::new(ScriptedSearcher::new(vec![Vec::new()])),
            Arc::new(Deduplicator::new(None, false, 60)),
            Arc::new(TableScorer { scores: Vec::new() }),
            Arc::new(ResultOrganizer::default()),
        )
        .with_checkpoint_handler(bridge)
        .with_progress_reporter(reporter))
    });

    let snapshot = manager.wait_for_checkpoint_or_complete(&id, WAIT).await;
    assert_eq!(snapshot["is_complete"], true);
    assert!(snapshot["error"].as_str().unwrap().contains("intent parsing failed"));
    assert_eq!(snapshot["phase"], "error");
}

#[tokio::test]
async fn cleanup_cancels_and_removes() {
    let manager = SessionManager::new();
    let id = spawn(&manager, "query", Some(Duration::from_secs(30)));

    manager.wait_for_checkpoint_or_complete(&id, WAIT).await;
    manager.cleanup(&id);
    assert!(manager.get(&id).is_none());
}

#[tokio::test]
async fn unknown_session_yields_error_snapshot() {
    let manager = SessionManager::new();
    let snapshot = manager
        .wait_for_checkpoint_or_complete("no-such-session", Duration::from_millis(10))
        .await;
    assert_eq!(snapshot["error"], "Session not found");
}
