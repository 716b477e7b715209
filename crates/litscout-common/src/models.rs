//! Core data models for the paper search pipeline.
//!
//! Single source of truth for every record that crosses a stage boundary:
//! parsed intent, search strategies, raw/scored/final papers, facets, and
//! the final collection.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Enums ─────────────────────────────────────────────────────────────────────

/// What kind of answer the researcher is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Survey,
    Method,
    Dataset,
    Baseline,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Survey   => "survey",
            IntentType::Method   => "method",
            IntentType::Dataset  => "dataset",
            IntentType::Baseline => "baseline",
        }
    }
}

/// Closed tag vocabulary applied by the relevance scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperTag {
    Method,
    Review,
    Empirical,
    Theoretical,
    Dataset,
}

impl PaperTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperTag::Method      => "method",
            PaperTag::Review      => "review",
            PaperTag::Empirical   => "empirical",
            PaperTag::Theoretical => "theoretical",
            PaperTag::Dataset     => "dataset",
        }
    }

    /// Parse a tag emitted by the model; unknown strings are dropped by
    /// the caller rather than failing the whole batch.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "method"      => Some(PaperTag::Method),
            "review"      => Some(PaperTag::Review),
            "empirical"   => Some(PaperTag::Empirical),
            "theoretical" => Some(PaperTag::Theoretical),
            "dataset"     => Some(PaperTag::Dataset),
            _ => None,
        }
    }
}

// ── Intent parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConstraints {
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize { 100 }

impl Default for SearchConstraints {
    fn default() -> Self {
        Self {
            year_from: None,
            year_to: None,
            language: None,
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub topic: String,
    pub concepts: Vec<String>,
    pub intent_type: IntentType,
    #[serde(default)]
    pub constraints: SearchConstraints,
}

// ── Query building ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymMap {
    pub keyword: String,
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub synonym_map: Vec<SynonymMap>,
    pub boolean_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub queries: Vec<SearchQuery>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub filters: SearchConstraints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFeedback {
    #[serde(default)]
    pub marked_relevant: Vec<String>,
    #[serde(default)]
    pub marked_irrelevant: Vec<String>,
    #[serde(default)]
    pub free_text_feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryBuilderInput {
    pub intent: ParsedIntent,
    #[serde(default)]
    pub previous_strategies: Vec<SearchStrategy>,
    #[serde(default)]
    pub user_feedback: Option<UserFeedback>,
}

// ── Raw search results ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub author_id: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), author_id: None }
    }
}

/// A paper as returned by a search source, before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPaper {
    #[serde(default = "fresh_id")]
    pub id: String,
    #[serde(default)]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
    pub source: String,
    #[serde(default)]
    pub citation_count: u32,
    #[serde(default)]
    pub full_text_url: Option<String>,
    #[serde(default)]
    pub bibtex: Option<String>,
    /// Provider payload kept verbatim for dedup keys and debugging.
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for RawPaper {
    fn default() -> Self {
        Self {
            id: fresh_id(),
            doi: None,
            title: String::new(),
            authors: Vec::new(),
            abstract_text: None,
            snippet: None,
            year: None,
            venue: None,
            source: String::new(),
            citation_count: 0,
            full_text_url: None,
            bibtex: None,
            raw_data: serde_json::Value::Null,
        }
    }
}

// ── Scored results ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPaper {
    pub paper: RawPaper,
    /// Clamped into [0.0, 1.0] by the scorer.
    pub relevance_score: f64,
    pub relevance_reason: String,
    #[serde(default)]
    pub tags: Vec<PaperTag>,
}

// ── Final output ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facets {
    #[serde(default)]
    pub by_year: BTreeMap<i32, usize>,
    #[serde(default)]
    pub by_venue: BTreeMap<String, usize>,
    #[serde(default)]
    pub top_authors: Vec<String>,
    #[serde(default)]
    pub key_themes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub query: String,
    pub search_strategy: SearchStrategy,
    pub total_found: usize,
    pub timestamp: String,
}

impl SearchMetadata {
    pub fn new(query: impl Into<String>, search_strategy: SearchStrategy, total_found: usize) -> Self {
        Self {
            query: query.into(),
            search_strategy,
            total_found,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Output projection of a scored paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    #[serde(default)]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
    pub source: String,
    #[serde(default)]
    pub citation_count: u32,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub relevance_reason: String,
    #[serde(default)]
    pub tags: Vec<PaperTag>,
    #[serde(default)]
    pub full_text_url: Option<String>,
    #[serde(default)]
    pub bibtex: Option<String>,
}

impl Paper {
    /// Straight field mapping from a scored paper.
    pub fn from_scored(sp: &ScoredPaper) -> Self {
        let p = &sp.paper;
        Self {
            id: p.id.clone(),
            doi: p.doi.clone(),
            title: p.title.clone(),
            authors: p.authors.clone(),
            abstract_text: p.abstract_text.clone(),
            year: p.year,
            venue: p.venue.clone(),
            source: p.source.clone(),
            citation_count: p.citation_count,
            relevance_score: sp.relevance_score,
            relevance_reason: sp.relevance_reason.clone(),
            tags: sp.tags.clone(),
            full_text_url: p.full_text_url.clone(),
            bibtex: p.bibtex.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperCollection {
    pub metadata: SearchMetadata,
    pub papers: Vec<Paper>,
    #[serde(default)]
    pub facets: Facets,
}

impl PaperCollection {
    /// Empty collection for runs that never produced results.
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            metadata: SearchMetadata::new(
                query,
                SearchStrategy {
                    queries: Vec::new(),
                    sources: Vec::new(),
                    filters: SearchConstraints::default(),
                },
                0,
            ),
            papers: Vec::new(),
            facets: Facets::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
