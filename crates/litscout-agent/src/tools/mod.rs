//! Tool registration scaffold.
//!
//! The agent exposes the session layer as host-callable tools. Each tool
//! declares a JSON-schema parameter block and is invoked by name through
//! a central `ToolRegistry`.
//!
//! Tool lifecycle:
//!   1. Implement `AgentTool` for your type.
//!   2. Register with `ToolRegistry::register`.
//!   3. The host invokes tools via `ToolRegistry::invoke(name, params)`.

pub mod session_tools;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use litscout_common::config::AppConfig;
use litscout_workflow::SessionManager;

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn invoke(&self, params: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are a wiring bug.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            panic!("Duplicate tool name: {name}");
        }
    }

    pub async fn invoke(&self, name: &str, params: Value) -> Result<Value> {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(params).await,
            None => anyhow::bail!("Unknown tool: {name}"),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Name + description + schema for every registered tool.
    pub fn manifest(&self) -> Value {
        let mut tools: Vec<Value> = self
            .tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters_schema(),
                })
            })
            .collect();
        tools.sort_by_key(|t| t["name"].as_str().unwrap_or("").to_string());
        serde_json::json!({ "tools": tools })
    }
}

/// Build the default registry wired to one session manager.
pub fn build_default_registry(manager: Arc<SessionManager>, config: AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(session_tools::SearchPapersTool::new(
        manager.clone(),
        config,
    )));
    registry.register(Arc::new(session_tools::DecideTool::new(manager.clone())));
    registry.register(Arc::new(session_tools::GetSessionTool::new(manager.clone())));
    registry.register(Arc::new(session_tools::ExportResultsTool::new(manager)));
    tracing::info!(tools = registry.len(), "tool registry ready");
    registry
}

// ─────────────────────────────────────────────
//  Tests
// ─────────────────────────────────────────────
