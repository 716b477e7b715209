//! litscout-workflow — The paper search pipeline and its session layer.
//!
//! Six stages (intent parsing, query building, search, dedup, scoring,
//! organizing) driven by an iterative engine with two human-in-the-loop
//! checkpoints, wrapped in a session manager that exposes the run to
//! out-of-process callers.

pub mod checkpoints;
pub mod engine;
pub mod prompts;
pub mod session;
pub mod stages;
pub mod state;
pub mod views;

pub use engine::SearchWorkflow;
pub use session::SessionManager;

use litscout_common::config::AppConfig;
use litscout_common::models::PaperCollection;

/// One-call convenience: run the full pipeline with auto-approve.
pub async fn search(query: &str, config: &AppConfig) -> anyhow::Result<PaperCollection> {
    let workflow = SearchWorkflow::from_config(config)?;
    workflow.run(query).await
}
