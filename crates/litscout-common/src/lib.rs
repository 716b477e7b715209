//! litscout-common — Shared data models, configuration, and exporters.
//!
//! Every other litscout crate imports its value types from here. The
//! models are plain serde records with no behavior beyond small
//! constructors and projections; the pipeline logic lives downstream.

pub mod config;
pub mod export;
pub mod models;

pub use config::{load_config, AppConfig, LlmConfig, SearchSourceConfig};
pub use models::{Paper, PaperCollection, ParsedIntent, RawPaper, SearchStrategy};
