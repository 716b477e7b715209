//! Search stage: fan a strategy out across the configured sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use litscout_common::models::{RawPaper, SearchStrategy};
use litscout_sources::SearchSource;
use tracing::warn;

use super::Searching;

pub struct Searcher {
    sources: BTreeMap<String, Arc<dyn SearchSource>>,
}

impl Searcher {
    pub fn new(sources: Vec<Arc<dyn SearchSource>>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|s| (s.source_name().to_string(), s))
                .collect(),
        }
    }
}

#[async_trait]
impl Searching for Searcher {
    async fn search(&self, strategy: &SearchStrategy) -> Vec<RawPaper> {
        if strategy.queries.is_empty() || self.sources.is_empty() {
            return Vec::new();
        }

        // Resolve requested sources against the configured set; an empty
        // intersection falls back to every configured source. Dispatch in
        // source-name order so concatenation is stable.
        let mut selected: Vec<&Arc<dyn SearchSource>> = strategy
            .sources
            .iter()
            .filter_map(|name| self.sources.get(name))
            .collect();
        if selected.is_empty() {
            selected = self.sources.values().collect();
        }
        selected.sort_by_key(|s| s.source_name().to_string());
        selected.dedup_by_key(|s| s.source_name().to_string());

        let results = join_all(
            selected
                .iter()
                .map(|source| source.search_advanced(strategy)),
        )
        .await;

        let mut all_papers = Vec::new();
        for (source, result) in selected.iter().zip(results) {
            match result {
                Ok(papers) => all_papers.extend(papers),
                Err(e) => {
                    warn!(source = source.source_name(), error = %e, "source failed, dropping");
                }
            }
        }
        all_papers
    }
}
