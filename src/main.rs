//! # Market Feeds
//!
//! Turns financial-news websites and JSON APIs that publish no feed of their
//! own into RSS 2.0 files, one per configured source.
//!
//! ## Usage
//!
//! ```sh
//! market_feeds -o ./feeds
//! market_feeds -c sources.yaml -o ./feeds -s capital-market --retries 3
//! ```
//!
//! ## Architecture
//!
//! Each source runs through the same pipeline:
//! 1. **Fetching**: Request the upstream page or API (with warm-up and 403 fallbacks)
//! 2. **Extraction**: Pull raw records out of the HTML cards or the JSON article list
//! 3. **Normalization**: Map records to canonical items via the source's field table
//! 4. **Deduplication**: Drop repeated guids, keeping the first occurrence
//! 5. **Output**: Render RSS 2.0 and replace the source's feed file atomically
//!
//! Sources run one after another; a failing source is logged and leaves its
//! previous feed file untouched.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dedup;
mod error;
mod http;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod scrapers;
mod utils;

use cli::Cli;
use config::Config;
use http::{HttpFetcher, RetryFetch};
use pipeline::run_all;
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
    info!("market_feeds starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.output_dir, ?args.sources, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref()).await?;
    if let Some(secs) = args.timeout_secs {
        config.client.timeout_secs = secs;
    }
    let sources = config.select(&args.sources)?;

    if args.list {
        for source in &sources {
            println!("{}\t{}", source.id, source.output);
        }
        return Ok(());
    }

    let output_dir = args.output_dir.to_string_lossy().into_owned();
    if let Err(e) = ensure_writable_dir(&output_dir).await {
        error!(
            path = %output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let fetcher = HttpFetcher::new(&config.client)?;
    let now = Utc::now();
    info!(sources = sources.len(), retries = args.retries, "Generating feeds");

    let summary = if args.retries > 0 {
        let fetcher = RetryFetch::new(fetcher, args.retries, StdDuration::from_secs(1));
        run_all(&fetcher, &sources, &args.output_dir, now).await
    } else {
        run_all(&fetcher, &sources, &args.output_dir, now).await
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        written = summary.written,
        kept_previous = summary.kept_previous,
        failed = summary.failed.len(),
        items = summary.items,
        duplicates = summary.duplicates,
        fallbacks = summary.fallbacks,
        "Execution complete"
    );

    if !summary.failed.is_empty() {
        warn!(failed = ?summary.failed, "Some sources failed");
        if args.strict {
            return Err(format!("{} source(s) failed: {}", summary.failed.len(), summary.failed.join(", ")).into());
        }
    }
    Ok(())
}
