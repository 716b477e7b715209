//! Export renderings for a `PaperCollection`: JSON, BibTeX, and Markdown.

use crate::models::{Author, Paper, PaperCollection};

/// Serialize the collection to pretty-printed JSON.
pub fn export_json(collection: &PaperCollection) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(collection)
}

/// Render one `@article` entry per paper with collision-free citation keys.
pub fn export_bibtex(collection: &PaperCollection) -> String {
    if collection.papers.is_empty() {
        return String::new();
    }
    let mut seen_keys = std::collections::HashSet::new();
    let entries: Vec<String> = collection
        .papers
        .iter()
        .map(|paper| {
            let key = make_bibtex_key(paper, &mut seen_keys);
            format_bibtex_entry(paper, &key)
        })
        .collect();
    entries.join("\n\n")
}

/// Render a numbered Markdown table of the collection.
pub fn export_markdown(collection: &PaperCollection) -> String {
    let mut lines = vec![
        "| # | Title | Authors | Year | Venue | Score |".to_string(),
        "|---|-------|---------|------|-------|-------|".to_string(),
    ];
    for (i, paper) in collection.papers.iter().enumerate() {
        let authors = format_authors_short(&paper.authors);
        let year = paper.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
        let venue = paper.venue.as_deref().unwrap_or("-");
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {:.2} |",
            i + 1,
            paper.title,
            authors,
            year,
            venue,
            paper.relevance_score,
        ));
    }
    lines.join("\n")
}

// ── BibTeX helpers ────────────────────────────────────────────────────────────

fn escape_bibtex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str(r"\&"),
            '%' => out.push_str(r"\%"),
            '_' => out.push_str(r"\_"),
            '#' => out.push_str(r"\#"),
            _ => out.push(ch),
        }
    }
    out
}

/// Citation key: first-author surname + year + first title word, with an
/// alphabetic suffix on collision.
fn make_bibtex_key(paper: &Paper, seen: &mut std::collections::HashSet<String>) -> String {
    let name = paper
        .authors
        .first()
        .and_then(|a| a.name.split_whitespace().last())
        .unwrap_or("unknown")
        .to_lowercase();

    let year = paper.year.map(|y| y.to_string()).unwrap_or_else(|| "nd".to_string());

    let first_word = paper
        .title
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or("untitled")
        .to_lowercase();

    let base: String = format!("{name}_{year}_{first_word}")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();

    let mut key = base.clone();
    let mut suffix = b'a';
    while seen.contains(&key) {
        key = format!("{}_{}", base, suffix as char);
        suffix += 1;
    }
    seen.insert(key.clone());
    key
}

fn format_bibtex_entry(paper: &Paper, key: &str) -> String {
    let mut lines = vec![format!("@article{{{key},")];

    if paper.authors.is_empty() {
        lines.push("  author = {Unknown},".to_string());
    } else {
        let author_str = paper
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(" and ");
        lines.push(format!("  author = {{{}}},", escape_bibtex(&author_str)));
    }

    // Double braces preserve capitalization
    lines.push(format!("  title = {{{{{}}}}},", escape_bibtex(&paper.title)));

    if let Some(year) = paper.year {
        lines.push(format!("  year = {{{year}}},"));
    }
    if let Some(venue) = &paper.venue {
        lines.push(format!("  journal = {{{}}},", escape_bibtex(venue)));
    }
    if let Some(doi) = &paper.doi {
        lines.push(format!("  doi = {{{doi}}},"));
    }
    if let Some(url) = &paper.full_text_url {
        lines.push(format!("  url = {{{url}}},"));
    }

    lines.push("}".to_string());
    lines.join("\n")
}

fn format_authors_short(authors: &[Author]) -> String {
    if authors.is_empty() {
        return "-".to_string();
    }
    if authors.len() <= 3 {
        return authors.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ");
    }
    format!("{} et al.", authors[0].name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
