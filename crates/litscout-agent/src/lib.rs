//! litscout-agent — Tool surface for hosting the paper search workflow.
//!
//! Hosts register the four session tools (`search_papers`, `decide`,
//! `get_session`, `export_results`) through `tools::build_default_registry`
//! and drive them by name. The `litscout` binary in this crate is a thin
//! dev CLI over the same pipeline.

pub mod tools;
