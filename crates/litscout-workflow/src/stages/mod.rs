//! Pipeline stages.
//!
//! Each stage is a pure async transformation whose input type matches the
//! prior stage's output. The engine receives all six injected behind these
//! traits; anything implementing them can stand in (the test suites use
//! scripted stand-ins).

pub mod dedup;
pub mod intent;
pub mod organize;
pub mod query;
pub mod score;
pub mod search;

use async_trait::async_trait;
use litscout_common::models::{
    PaperCollection, ParsedIntent, QueryBuilderInput, RawPaper, ScoredPaper, SearchStrategy,
};
use litscout_llm::LlmError;

pub use dedup::Deduplicator;
pub use intent::IntentParser;
pub use organize::ResultOrganizer;
pub use query::QueryBuilder;
pub use score::RelevanceScorer;
pub use search::Searcher;

/// Natural language → structured research intent. The only stage whose
/// failure is fatal to a run.
#[async_trait]
pub trait IntentParsing: Send + Sync {
    async fn parse(&self, user_input: &str) -> Result<ParsedIntent, LlmError>;
}

/// Intent (+ iteration context) → search strategy. Never fails: a model
/// fault degrades to a deterministic fallback strategy.
#[async_trait]
pub trait QueryBuilding: Send + Sync {
    async fn build(&self, input: &QueryBuilderInput) -> SearchStrategy;
}

/// Strategy → raw papers across all selected sources. Partial success is
/// returned; per-source failures are logged and dropped.
#[async_trait]
pub trait Searching: Send + Sync {
    async fn search(&self, strategy: &SearchStrategy) -> Vec<RawPaper>;
}

/// Raw papers → deduplicated papers.
#[async_trait]
pub trait Deduplicating: Send + Sync {
    async fn deduplicate(&self, papers: Vec<RawPaper>) -> Vec<RawPaper>;
}

/// Papers + intent → scored papers. Output length always equals input
/// length; failed batches degrade to default scores.
#[async_trait]
pub trait Scoring: Send + Sync {
    async fn score(&self, papers: Vec<RawPaper>, intent: &ParsedIntent) -> Vec<ScoredPaper>;
}

/// Scored papers → final collection (filter, sort, facets, metadata).
#[async_trait]
pub trait Organizing: Send + Sync {
    async fn organize(
        &self,
        scored: Vec<ScoredPaper>,
        strategy: &SearchStrategy,
        original_query: &str,
    ) -> PaperCollection;
}
