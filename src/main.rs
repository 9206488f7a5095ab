//! # PontoView News
//!
//! Builds the news playlist shown on PontoView signage panels. Headlines are
//! collected from RSS/Atom feeds, Google News search feeds and official-site
//! listing pages, enriched from the article pages, filtered for freshness and
//! sensitive topics, then interleaved by scope and written as one JSON file.
//!
//! ## Usage
//!
//! ```sh
//! pontoview_news -c data/news_sources.yaml -o data/news.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Collecting**: Fetch every source concurrently and parse its entries
//! 2. **Enriching**: Follow each entry to its article page for image and date
//! 3. **Filtering**: Drop blocklisted, stale and duplicate items
//! 4. **Interleaving**: Merge local, state, national and health buckets
//! 5. **Output**: Write `{generatedAt, items, stats}` atomically
//!
//! Source and article failures are recorded in the output's `stats` and never
//! abort the run. The process exits non-zero only when the output cannot be
//! written.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dates;
mod enrich;
mod fetcher;
mod filter;
mod interleave;
mod models;
mod outputs;
mod parsers;
mod pipeline;
mod utils;

use cli::Cli;
use config::Config;
use fetcher::Fetcher;
use outputs::json::write_payload;
use pipeline::Pipeline;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news build starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // --- Configuration: a broken file degrades to built-in defaults ---
    let (config, config_failure) = Config::load_or_default(&args);
    info!(
        sources = config.sources.len(),
        max_items = config.max_items,
        max_age_days = config.max_age_days,
        output = %config.output.display(),
        "Configuration resolved"
    );

    // Early check: ensure the output location is writable
    if let Err(e) = ensure_writable_dir(&config.output).await {
        error!(
            path = %config.output.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = match Fetcher::new(&config.user_agent, config.timeout()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return Err(e.into());
        }
    };

    // ---- Collect, filter, interleave ----
    let pipeline = Pipeline::new(config, fetcher);
    let mut payload = pipeline.run(Utc::now()).await;
    if let Some(failure) = config_failure {
        payload.stats.failures.insert(0, failure);
    }

    // ---- Output ----
    let output = &pipeline.config().output;
    if let Err(e) = write_payload(&payload, output).await {
        error!(path = %output.display(), error = %e, "Failed to write news payload");
        return Err(e);
    }

    info!(
        items = payload.items.len(),
        produced = payload.stats.produced,
        failures = payload.stats.failures.len(),
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Finished"
    );
    Ok(())
}
