//! Session tools: start, decide, inspect, and export paper searches.
//!
//! Every tool returns a JSON snapshot; failures surface as an `error`
//! field in the result, never as a protocol fault.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use litscout_common::config::AppConfig;
use litscout_common::export::{export_bibtex, export_json, export_markdown};
use litscout_workflow::checkpoints::{Decision, DecisionAction};
use litscout_workflow::session::is_trivial_response;
use litscout_workflow::SessionManager;

use super::AgentTool;

const START_WAIT: Duration = Duration::from_secs(120);

// ─────────────────────────────────────────────
//  search_papers
// ─────────────────────────────────────────────

pub struct SearchPapersTool {
    manager: Arc<SessionManager>,
    config: AppConfig,
}

impl SearchPapersTool {
    pub fn new(manager: Arc<SessionManager>, config: AppConfig) -> Self {
        Self { manager, config }
    }
}

#[async_trait]
impl AgentTool for SearchPapersTool {
    fn name(&self) -> &str {
        "search_papers"
    }

    fn description(&self) -> &str {
        "Search academic papers with human-in-the-loop checkpoints. \
         Returns a session_id and the first checkpoint (or results). \
         Present the checkpoint_payload for review before calling decide."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query":       { "type": "string", "description": "Natural language search query" },
                "domain":      { "type": "string", "default": "general", "enum": ["general", "materials_science"] },
                "max_results": { "type": "integer", "default": 100, "minimum": 1, "maximum": 200 }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, params: Value) -> Result<Value> {
        let Some(query) = params["query"].as_str().filter(|q| !q.trim().is_empty()) else {
            return Ok(json!({"error": "query is required"}));
        };

        let mut config = self.config.clone();
        if let Some(domain) = params["domain"].as_str() {
            config.domain = domain.to_string();
        }
        if let Some(max_results) = params["max_results"].as_u64() {
            config.default_max_results = max_results as usize;
        }

        let session_id = self.manager.create(query, config);
        let mut state = self
            .manager
            .wait_for_checkpoint_or_complete(&session_id, START_WAIT)
            .await;
        state["session_id"] = json!(session_id);
        Ok(state)
    }
}

// ─────────────────────────────────────────────
//  decide
// ─────────────────────────────────────────────

pub struct DecideTool {
    manager: Arc<SessionManager>,
}

impl DecideTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AgentTool for DecideTool {
    fn name(&self) -> &str {
        "decide"
    }

    fn description(&self) -> &str {
        "Answer a pending checkpoint: approve to continue, edit to supply \
         revised data, or reject to iterate with feedback. Requires the \
         user's verbatim response; trivial responses are refused."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id":    { "type": "string" },
                "action":        { "type": "string", "enum": ["approve", "edit", "reject"] },
                "user_response": { "type": "string", "description": "The user's verbatim response" },
                "data":          { "type": "object", "description": "Revised strategy or feedback fields" },
                "note":          { "type": "string" }
            },
            "required": ["session_id", "action"]
        })
    }

    async fn invoke(&self, params: Value) -> Result<Value> {
        let session_id = params["session_id"].as_str().unwrap_or_default();
        let Some(session) = self.manager.get(session_id) else {
            return Ok(json!({"error": "Session not found"}));
        };
        if session.is_complete() {
            return Ok(json!({"error": "Session already complete"}));
        }
        if !session.bridge.has_pending_checkpoint().await {
            return Ok(json!({"error": "No pending checkpoint"}));
        }

        let raw_action = params["action"].as_str().unwrap_or_default();
        let Some(action) = DecisionAction::parse(raw_action) else {
            return Ok(json!({
                "error": format!("Invalid action '{raw_action}'. Must be one of: approve, edit, reject")
            }));
        };

        if session.require_user_response {
            let response = params["user_response"].as_str().unwrap_or("");
            if is_trivial_response(response) {
                return Ok(json!({
                    "error": "user_response is required. Present the checkpoint to the user \
                              and include their verbatim response; trivial responses like \
                              'ok' or 'yes' are not accepted.",
                    "hint": "Show the user_question from the checkpoint and ask for their decision.",
                }));
            }
        }

        let previous = session.bridge.checkpoint_signature().await;
        let decision = Decision {
            action,
            revised_data: params.get("data").filter(|d| !d.is_null()).cloned(),
            note: params["note"].as_str().map(String::from),
        };
        session.bridge.set_decision(decision).await;

        Ok(self
            .manager
            .wait_after_decision(session_id, previous.as_deref(), session.decide_wait_timeout)
            .await)
    }
}

// ─────────────────────────────────────────────
//  get_session
// ─────────────────────────────────────────────

pub struct GetSessionTool {
    manager: Arc<SessionManager>,
}

impl GetSessionTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AgentTool for GetSessionTool {
    fn name(&self) -> &str {
        "get_session"
    }

    fn description(&self) -> &str {
        "Poll a search session: phase, elapsed time, and pending checkpoint \
         data when the pipeline is paused."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "session_id": { "type": "string" } },
            "required": ["session_id"]
        })
    }

    async fn invoke(&self, params: Value) -> Result<Value> {
        let session_id = params["session_id"].as_str().unwrap_or_default();
        match self.manager.get(session_id) {
            Some(session) => Ok(self.manager.session_state(&session).await),
            None => Ok(json!({"error": "Session not found"})),
        }
    }
}

// ─────────────────────────────────────────────
//  export_results
// ─────────────────────────────────────────────

pub struct ExportResultsTool {
    manager: Arc<SessionManager>,
}

impl ExportResultsTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AgentTool for ExportResultsTool {
    fn name(&self) -> &str {
        "export_results"
    }

    fn description(&self) -> &str {
        "Export the results of a completed session as json, bibtex, or markdown."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "format":     { "type": "string", "enum": ["json", "bibtex", "markdown"], "default": "markdown" }
            },
            "required": ["session_id"]
        })
    }

    async fn invoke(&self, params: Value) -> Result<Value> {
        let session_id = params["session_id"].as_str().unwrap_or_default();
        let Some(session) = self.manager.get(session_id) else {
            return Ok(json!({"error": "Session not found"}));
        };
        if !session.is_complete() {
            return Ok(json!({"error": "Session not complete yet"}));
        }
        let Some(collection) = session.result() else {
            return Ok(json!({
                "error": session.error().unwrap_or_else(|| "No results available".to_string())
            }));
        };

        let format = params["format"].as_str().unwrap_or("markdown");
        let content = match format {
            "json" => export_json(&collection)?,
            "bibtex" => export_bibtex(&collection),
            "markdown" => export_markdown(&collection),
            other => {
                return Ok(json!({
                    "error": format!("Unknown format '{other}'. Must be one of: json, bibtex, markdown")
                }));
            }
        };
        Ok(Value::String(content))
    }
}

// ─────────────────────────────────────────────
//  Tests
// ─────────────────────────────────────────────
