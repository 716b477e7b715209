//! litscout — dev CLI for the paper search pipeline.
//!
//! Usage: litscout <query words...>
//!
//! Runs the full pipeline with auto-approve (no checkpoints) and prints
//! the Markdown export to stdout. Tool hosting goes through
//! `litscout_agent::tools::build_default_registry`; this binary is the
//! quickest way to exercise a configured environment end to end.

use litscout_common::config::load_config;
use litscout_common::export::export_markdown;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("litscout=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("Usage: litscout <query>");
        std::process::exit(1);
    }
    let query = args.join(" ");

    let config = load_config();
    match litscout_workflow::search(&query, &config).await {
        Ok(collection) => {
            println!("{}", export_markdown(&collection));
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
