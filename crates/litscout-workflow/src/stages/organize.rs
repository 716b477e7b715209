//! Result organizing stage: filter, sort, facet, and wrap scored papers.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use litscout_common::models::{
    Facets, Paper, PaperCollection, ScoredPaper, SearchMetadata, SearchStrategy,
};

use super::Organizing;

const DEFAULT_MIN_RELEVANCE: f64 = 0.3;
const THEME_SCORE_FLOOR: f64 = 0.5;
const TOP_AUTHORS: usize = 10;
const KEY_THEMES: usize = 8;
const MIN_THEME_WORD_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "in", "of", "on", "for", "and", "or", "to", "is", "are", "was", "were",
    "with", "by", "from", "at", "as", "its", "this", "that", "these", "those", "it", "be",
    "been", "has", "have", "had", "not", "but", "also", "can", "will", "may", "would", "could",
    "should", "into", "between", "their", "our", "them", "they", "than", "more", "most",
    "about", "over", "under", "such", "when", "where", "which", "what", "how", "other", "some",
    "all", "any", "each", "very", "only", "then", "so", "no", "via", "using",
];

pub struct ResultOrganizer {
    min_relevance: f64,
    max_results: Option<usize>,
}

impl ResultOrganizer {
    pub fn new(min_relevance: f64) -> Self {
        Self { min_relevance, max_results: None }
    }

    /// Cap the organized collection; facets are built over the capped set.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

impl Default for ResultOrganizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RELEVANCE)
    }
}

#[async_trait]
impl Organizing for ResultOrganizer {
    async fn organize(
        &self,
        scored: Vec<ScoredPaper>,
        strategy: &SearchStrategy,
        original_query: &str,
    ) -> PaperCollection {
        let total_found = scored.len();

        let mut kept: Vec<ScoredPaper> = scored
            .into_iter()
            .filter(|p| p.relevance_score >= self.min_relevance)
            .collect();
        sort_papers(&mut kept);

        let mut papers: Vec<Paper> = kept.iter().map(Paper::from_scored).collect();
        if let Some(cap) = self.max_results {
            papers.truncate(cap);
        }

        let facets = build_facets(&papers);

        PaperCollection {
            metadata: SearchMetadata::new(original_query, strategy.clone(), total_found),
            papers,
            facets,
        }
    }
}

/// Total order: score desc, citations desc, year desc, title asc
/// (case-folded). Title breaks every remaining tie.
fn sort_papers(papers: &mut [ScoredPaper]) {
    papers.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.paper.citation_count.cmp(&a.paper.citation_count))
            .then_with(|| b.paper.year.unwrap_or(0).cmp(&a.paper.year.unwrap_or(0)))
            .then_with(|| a.paper.title.to_lowercase().cmp(&b.paper.title.to_lowercase()))
    });
}

fn build_facets(papers: &[Paper]) -> Facets {
    let mut facets = Facets::default();

    for p in papers {
        if let Some(year) = p.year {
            *facets.by_year.entry(year).or_insert(0) += 1;
        }
        if let Some(venue) = p.venue.as_deref().filter(|v| !v.trim().is_empty()) {
            *facets.by_venue.entry(title_case(venue.trim())).or_insert(0) += 1;
        }
    }

    let author_names = papers
        .iter()
        .flat_map(|p| p.authors.iter().map(|a| a.name.clone()));
    facets.top_authors = top_by_count(author_names, TOP_AUTHORS);

    let theme_words = papers
        .iter()
        .filter(|p| p.relevance_score >= THEME_SCORE_FLOOR)
        .flat_map(|p| {
            p.title
                .to_lowercase()
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
                .filter(|w| w.len() >= MIN_THEME_WORD_LEN && !STOPWORDS.contains(&w.as_str()))
                .collect::<Vec<_>>()
        });
    facets.key_themes = top_by_count(theme_words, KEY_THEMES);

    facets
}

/// Highest count first; ties keep first-encountered order.
fn top_by_count(items: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut ranked: Vec<String> = Vec::new();
    for item in items {
        match counts.get_mut(&item) {
            Some(count) => *count += 1,
            None => {
                ranked.push(item.clone());
                counts.insert(item, 1);
            }
        }
    }
    // Stable sort on count alone, so equal counts stay in encounter order.
    ranked.sort_by(|a, b| counts[b].cmp(&counts[a]));
    ranked.truncate(limit);
    ranked
}

/// Case-normalize a venue: first letter of each word uppercased.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
