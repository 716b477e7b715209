//! Deduplication stage: two-pass duplicate folding.
//!
//! Pass 1 groups exact matches (DOI, provider result_id, full-text URL,
//! normalized title) with a union-find over paper ids. Pass 2 optionally
//! asks the model to group semantic duplicates among the remainder and
//! falls back silently when it misbehaves. Each group collapses to its
//! richest member.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use litscout_common::models::RawPaper;
use serde_json::json;
use tracing::{debug, warn};

use litscout_llm::LlmProvider;

use crate::prompts::DEDUP_SYSTEM;

use super::Deduplicating;

pub struct Deduplicator {
    llm: Option<Arc<dyn LlmProvider>>,
    enable_llm_pass: bool,
    llm_max_candidates: usize,
}

impl Deduplicator {
    pub fn new(
        llm: Option<Arc<dyn LlmProvider>>,
        enable_llm_pass: bool,
        llm_max_candidates: usize,
    ) -> Self {
        Self {
            llm,
            enable_llm_pass,
            llm_max_candidates: llm_max_candidates.max(2),
        }
    }

    /// Group papers by exact keys. Returns (groups, ungrouped), both in
    /// first-occurrence order so the pass is deterministic.
    fn algorithm_pass(&self, papers: &[RawPaper]) -> (Vec<Vec<RawPaper>>, Vec<RawPaper>) {
        let mut uf = UnionFind::new(papers.iter().map(|p| p.id.clone()));

        let mut doi_map: HashMap<String, &str> = HashMap::new();
        for p in papers {
            if let Some(doi) = &p.doi {
                let key = doi.to_lowercase().trim().to_string();
                match doi_map.get(&key) {
                    Some(first) => uf.union(first, &p.id),
                    None => {
                        doi_map.insert(key, &p.id);
                    }
                }
            }
        }

        let mut rid_map: HashMap<String, &str> = HashMap::new();
        for p in papers {
            if let Some(rid) = p.raw_data.get("result_id").and_then(|v| v.as_str()) {
                match rid_map.get(rid) {
                    Some(first) => uf.union(first, &p.id),
                    None => {
                        rid_map.insert(rid.to_string(), &p.id);
                    }
                }
            }
        }

        let mut url_map: HashMap<String, &str> = HashMap::new();
        for p in papers {
            if let Some(url) = &p.full_text_url {
                let key = url.trim().to_string();
                match url_map.get(&key) {
                    Some(first) => uf.union(first, &p.id),
                    None => {
                        url_map.insert(key, &p.id);
                    }
                }
            }
        }

        let mut title_map: HashMap<String, &str> = HashMap::new();
        for p in papers {
            let key = normalize_title(&p.title);
            match title_map.get(&key) {
                Some(first) => uf.union(first, &p.id),
                None => {
                    title_map.insert(key, &p.id);
                }
            }
        }

        // Collect members per root, in input order.
        let mut order: Vec<String> = Vec::new();
        let mut by_root: HashMap<String, Vec<RawPaper>> = HashMap::new();
        for p in papers {
            let root = uf.find(&p.id);
            if !by_root.contains_key(&root) {
                order.push(root.clone());
            }
            by_root.entry(root).or_default().push(p.clone());
        }

        let mut groups = Vec::new();
        let mut ungrouped = Vec::new();
        for root in order {
            let members = by_root.remove(&root).unwrap_or_default();
            if members.len() > 1 {
                groups.push(members);
            } else {
                ungrouped.extend(members);
            }
        }
        (groups, ungrouped)
    }

    /// Ask the model to group semantic duplicates. On any fault the input
    /// comes back untouched.
    async fn llm_pass(
        &self,
        llm: &Arc<dyn LlmProvider>,
        papers: Vec<RawPaper>,
    ) -> (Vec<Vec<RawPaper>>, Vec<RawPaper>) {
        let entries: Vec<serde_json::Value> = papers
            .iter()
            .map(|p| json!({"id": p.id, "title": p.title, "year": p.year}))
            .collect();
        let user_msg = match serde_json::to_string(&entries) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "could not serialize dedup candidates, skipping model pass");
                return (Vec::new(), papers);
            }
        };

        let response = match llm.complete_json(DEDUP_SYSTEM, &user_msg, None).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dedup model call failed, skipping model pass");
                return (Vec::new(), papers);
            }
        };

        let mut paper_map: HashMap<String, RawPaper> =
            papers.iter().map(|p| (p.id.clone(), p.clone())).collect();
        let mut groups: Vec<Vec<RawPaper>> = Vec::new();

        for group_ids in response["groups"].as_array().into_iter().flatten() {
            let Some(ids) = group_ids.as_array() else { continue };
            if ids.len() < 2 {
                continue;
            }
            let members: Vec<RawPaper> = ids
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|id| paper_map.remove(id))
                .collect();
            if members.len() > 1 {
                groups.push(members);
            } else {
                // Half-claimed group: give the lone member back.
                for m in members {
                    paper_map.insert(m.id.clone(), m);
                }
            }
        }

        let remaining: Vec<RawPaper> = papers
            .iter()
            .filter_map(|p| paper_map.remove(&p.id))
            .collect();
        (groups, remaining)
    }
}

#[async_trait]
impl Deduplicating for Deduplicator {
    async fn deduplicate(&self, papers: Vec<RawPaper>) -> Vec<RawPaper> {
        if papers.len() <= 1 {
            return papers;
        }

        let (mut groups, mut ungrouped) = self.algorithm_pass(&papers);

        if let Some(llm) = &self.llm {
            if self.enable_llm_pass && ungrouped.len() > 1 {
                if ungrouped.len() <= self.llm_max_candidates {
                    let (llm_groups, remaining) = self.llm_pass(llm, ungrouped).await;
                    groups.extend(llm_groups);
                    ungrouped = remaining;
                } else {
                    debug!(
                        candidates = ungrouped.len(),
                        limit = self.llm_max_candidates,
                        "skipping semantic dedup pass"
                    );
                }
            }
        }

        let mut result: Vec<RawPaper> = groups.into_iter().map(merge_group).collect();
        result.extend(ungrouped);
        result
    }
}

// ── Union-find over paper ids ─────────────────────────────────────────────────

struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    fn new(ids: impl Iterator<Item = String>) -> Self {
        Self {
            parent: ids.map(|id| (id.clone(), id)).collect(),
        }
    }

    fn find(&mut self, id: &str) -> String {
        let mut current = id.to_string();
        loop {
            let parent = self.parent[&current].clone();
            if parent == current {
                return current;
            }
            // Path halving
            let grandparent = self.parent[&parent].clone();
            self.parent.insert(current, grandparent.clone());
            current = parent;
        }
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }
}

// ── Merging ───────────────────────────────────────────────────────────────────

/// Lowercase, strip punctuation, collapse whitespace. Idempotent.
fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn richness(p: &RawPaper) -> (usize, u32) {
    let filled = [
        p.doi.is_some(),
        p.snippet.is_some(),
        p.abstract_text.is_some(),
        p.year.is_some(),
        p.venue.is_some(),
        p.full_text_url.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();
    (filled, p.citation_count)
}

/// Collapse a duplicate group to one record: the member with the most
/// filled primary fields wins (citation count breaks ties), missing
/// fields are filled from the rest, and the citation count becomes the
/// group maximum.
fn merge_group(mut group: Vec<RawPaper>) -> RawPaper {
    if group.len() == 1 {
        return group.remove(0);
    }

    group.sort_by(|a, b| richness(b).cmp(&richness(a)));
    let mut best = group[0].clone();

    for other in &group[1..] {
        if best.doi.is_none() {
            best.doi = other.doi.clone();
        }
        if best.snippet.is_none() {
            best.snippet = other.snippet.clone();
        }
        if best.abstract_text.is_none() {
            best.abstract_text = other.abstract_text.clone();
        }
        if best.year.is_none() {
            best.year = other.year;
        }
        if best.venue.is_none() {
            best.venue = other.venue.clone();
        }
        if best.full_text_url.is_none() {
            best.full_text_url = other.full_text_url.clone();
        }
        best.citation_count = best.citation_count.max(other.citation_count);
    }

    best
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use litscout_llm::LlmError;
    use serde_json::Value;

    fn paper(id: &str, title: &str) -> RawPaper {
        RawPaper {
            id: id.to_string(),
            title: title.to_string(),
            source: "test".to_string(),
            ..Default::default()
        }
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(None, false, 60)
    }

    #[tokio::test]
    async fn test_no_duplicates_passes_through() {
        let papers = vec![paper("a", "First Paper"), paper("b", "Second Paper")];
        let out = dedup().deduplicate(papers).await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_doi_grouping_is_case_insensitive() {
        let mut a = paper("a", "Title One");
        a.doi = Some("10.1000/ABC".to_string());
        let mut b = paper("b", "Title Two Entirely Different");
        b.doi = Some("10.1000/abc".to_string());
        let out = dedup().deduplicate(vec![a, b]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_normalized_title_grouping() {
        let a = paper("a", "Deep Learning: A Survey!");
        let b = paper("b", "deep learning   a survey");
        let out = dedup().deduplicate(vec![a, b]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_result_id_grouping() {
        let mut a = paper("a", "Alpha Title");
        a.raw_data = json!({"result_id": "r9"});
        let mut b = paper("b", "Beta Title");
        b.raw_data = json!({"result_id": "r9"});
        let out = dedup().deduplicate(vec![a, b]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_transitive_grouping() {
        // a~b share a DOI, b~c share a title: all three collapse.
        let mut a = paper("a", "One Thing");
        a.doi = Some("10.1/x".to_string());
        let mut b = paper("b", "Shared Title");
        b.doi = Some("10.1/x".to_string());
        let c = paper("c", "shared title");
        let out = dedup().deduplicate(vec![a, b, c]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_output_never_exceeds_input() {
        let papers: Vec<RawPaper> =
            (0..20).map(|i| paper(&format!("p{i}"), &format!("Title {i}"))).collect();
        let out = dedup().deduplicate(papers.clone()).await;
        assert!(out.len() <= papers.len());
    }

    #[test]
    fn test_merge_prefers_richest_and_takes_max_citations() {
        let mut sparse = paper("a", "Title");
        sparse.citation_count = 500;
        let mut rich = paper("b", "Title");
        rich.doi = Some("10.1/x".to_string());
        rich.year = Some(2020);
        rich.venue = Some("Nature".to_string());
        rich.citation_count = 3;

        let merged = merge_group(vec![sparse, rich]);
        assert_eq!(merged.id, "b");
        assert_eq!(merged.citation_count, 500);
        assert_eq!(merged.year, Some(2020));
    }

    #[test]
    fn test_merge_fills_missing_fields() {
        let mut a = paper("a", "Title");
        a.doi = Some("10.1/x".to_string());
        a.year = Some(2020);
        let mut b = paper("b", "Title");
        b.snippet = Some("a snippet".to_string());

        let merged = merge_group(vec![a, b]);
        assert_eq!(merged.doi.as_deref(), Some("10.1/x"));
        assert_eq!(merged.snippet.as_deref(), Some("a snippet"));
    }

    #[test]
    fn test_normalize_title_idempotent() {
        let once = normalize_title("Graph Neural Networks: Methods & Applications");
        assert_eq!(normalize_title(&once), once);
    }

    // ── Semantic pass ──

    struct GroupingLlm(Value);

    #[async_trait]
    impl LlmProvider for GroupingLlm {
        async fn complete(&self, _s: &str, _u: &str) -> Result<String, LlmError> {
            Ok(String::new())
        }
        async fn complete_json(
            &self,
            _s: &str,
            _u: &str,
            _schema: Option<&Value>,
        ) -> Result<Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenLlm;

    #[async_trait]
    impl LlmProvider for BrokenLlm {
        async fn complete(&self, _s: &str, _u: &str) -> Result<String, LlmError> {
            Err(LlmError::Response("garbled".to_string()))
        }
        async fn complete_json(
            &self,
            _s: &str,
            _u: &str,
            _schema: Option<&Value>,
        ) -> Result<Value, LlmError> {
            Err(LlmError::Response("garbled".to_string()))
        }
    }

    #[tokio::test]
    async fn test_llm_pass_groups_semantic_duplicates() {
        let llm = Arc::new(GroupingLlm(json!({
            "groups": [["a", "b"]],
            "singles": ["c"]
        })));
        let d = Deduplicator::new(Some(llm), true, 60);
        let out = d
            .deduplicate(vec![
                paper("a", "GNNs for molecules"),
                paper("b", "Graph neural networks for molecular systems"),
                paper("c", "Unrelated work"),
            ])
            .await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_exact_pass() {
        let d = Deduplicator::new(Some(Arc::new(BrokenLlm)), true, 60);
        let out = d
            .deduplicate(vec![paper("a", "Title A"), paper("b", "Title B")])
            .await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_pass_skipped_above_candidate_limit() {
        // BrokenLlm would taint the result if it were consulted; over the
        // limit it must not be.
        let d = Deduplicator::new(Some(Arc::new(BrokenLlm)), true, 2);
        let papers: Vec<RawPaper> =
            (0..5).map(|i| paper(&format!("p{i}"), &format!("Title {i}"))).collect();
        let out = d.deduplicate(papers).await;
        assert_eq!(out.len(), 5);
    }
}
