//! litscout-sources — External scholar-search adapters.
//!
//! Each source adapter translates the internal query format into the
//! provider's API syntax, obeys its paging and rate-limit semantics, and
//! normalizes responses into `RawPaper` records.

pub mod scholar;
pub mod source;

pub use scholar::SerpApiScholarSource;
pub use source::{create_source, SearchSource, SourceError};
