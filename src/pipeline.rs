//! Feed generation: one source end to end, and the multi-source runner.
//!
//! [`run_source`] fetches, extracts, normalizes, dedups, caps and renders a
//! single source. [`run_all`] drives the configured sources one after another
//! and writes each feed, isolating failures so that one broken upstream never
//! touches another source's file.

use crate::config::{RequestConfig, SourceConfig};
use crate::dedup::dedup_by_guid;
use crate::error::FeedError;
use crate::http::{Fetch, FetchRequest};
use crate::models::Channel;
use crate::normalize::{NormalizeStats, Normalizer};
use crate::outputs::{file, rss};
use crate::scrapers::Extractor;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// A rendered feed plus the counts behind it.
#[derive(Debug, Clone)]
pub struct FeedOutput {
    pub xml: String,
    /// Items in the rendered feed.
    pub items: usize,
    /// Items dropped as duplicates.
    pub duplicates: usize,
    pub stats: NormalizeStats,
}

/// Fetch the primary URL, then each fallback in order while the upstream
/// keeps answering HTTP 403.
async fn fetch_with_fallbacks<F: Fetch>(fetcher: &F, request: &RequestConfig) -> Result<String, FeedError> {
    let mut result = fetcher
        .fetch(&FetchRequest::from_config(request, &request.url))
        .await;
    for url in &request.fallback_urls {
        match &result {
            Err(e) if e.is_forbidden() => {
                warn!(url = %url, "Upstream forbade the request; trying fallback URL");
                result = fetcher.fetch(&FetchRequest::from_config(request, url)).await;
            }
            _ => break,
        }
    }
    result
}

/// Produce the feed for one source.
///
/// `now` is the generation time: it stamps `lastBuildDate` and stands in for
/// every missing or unparsable item date. Fetch and document failures abort
/// the source; per-item problems only show up in the returned stats.
#[instrument(level = "info", skip_all, fields(source = %source.id))]
pub async fn run_source<F: Fetch>(
    fetcher: &F,
    source: &SourceConfig,
    now: DateTime<Utc>,
) -> Result<FeedOutput, FeedError> {
    let extractor = Extractor::for_source(source)?;
    let normalizer = Normalizer::new(source, now)?;

    if let Some(url) = &source.request.warm_up {
        if let Err(e) = fetcher.fetch(&FetchRequest::get(url)).await {
            debug!(url = %url, error = %e, "Warm-up request failed; continuing");
        }
    }

    let body = fetch_with_fallbacks(fetcher, &source.request).await?;
    let records = extractor.extract(&body)?;
    let (items, stats) = normalizer.normalize_all(records);

    let mut items = dedup_by_guid(items);
    let duplicates = stats.items - items.len();
    if let Some(max) = source.max_items {
        items.truncate(max);
    }

    let channel = Channel::from_config(&source.channel, now);
    let xml = rss::render(&channel, &items)?;

    info!(
        extracted = stats.records,
        kept = items.len(),
        duplicates,
        undated = stats.undated,
        "Source processed"
    );
    if stats.skipped_no_link + stats.title_fallbacks + stats.date_fallbacks > 0 {
        warn!(
            skipped_no_link = stats.skipped_no_link,
            title_fallbacks = stats.title_fallbacks,
            date_fallbacks = stats.date_fallbacks,
            "Some records needed fallbacks"
        );
    }

    Ok(FeedOutput {
        items: items.len(),
        xml,
        duplicates,
        stats,
    })
}

/// What happened to one source's output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written {
        items: usize,
        duplicates: usize,
        /// Placeholder titles plus generation-time dates.
        fallbacks: usize,
    },
    /// The run produced no items and the source keeps its previous feed.
    KeptPrevious,
    Failed,
}

/// Per-run totals across all sources.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub kept_previous: usize,
    /// Ids of the sources that failed.
    pub failed: Vec<String>,
    pub items: usize,
    pub duplicates: usize,
    pub fallbacks: usize,
}

impl RunSummary {
    fn record(&mut self, source_id: &str, outcome: Outcome) {
        match outcome {
            Outcome::Written {
                items,
                duplicates,
                fallbacks,
            } => {
                self.written += 1;
                self.items += items;
                self.duplicates += duplicates;
                self.fallbacks += fallbacks;
            }
            Outcome::KeptPrevious => self.kept_previous += 1,
            Outcome::Failed => self.failed.push(source_id.to_string()),
        }
    }
}

async fn run_and_write<F: Fetch>(
    fetcher: &F,
    source: &SourceConfig,
    output_dir: &Path,
    now: DateTime<Utc>,
) -> Outcome {
    let output = match run_source(fetcher, source, now).await {
        Ok(output) => output,
        Err(e) => {
            error!(source = %source.id, error = %e, "Source failed; previous feed left untouched");
            return Outcome::Failed;
        }
    };
    if output.items == 0 && source.keep_previous_on_empty {
        warn!(source = %source.id, "No items; keeping previous feed");
        return Outcome::KeptPrevious;
    }
    match file::write_feed(output_dir, &source.output, &output.xml).await {
        Ok(_) => Outcome::Written {
            items: output.items,
            duplicates: output.duplicates,
            fallbacks: output.stats.title_fallbacks + output.stats.date_fallbacks,
        },
        Err(e) => {
            error!(source = %source.id, error = %e, "Failed to write feed");
            Outcome::Failed
        }
    }
}

/// Run every source in order, writing each feed into `output_dir`.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn run_all<F: Fetch>(
    fetcher: &F,
    sources: &[&SourceConfig],
    output_dir: &Path,
    now: DateTime<Utc>,
) -> RunSummary {
    let outcomes: Vec<Outcome> = stream::iter(sources.iter().copied())
        .then(|source| run_and_write(fetcher, source, output_dir, now))
        .collect()
        .await;

    let mut summary = RunSummary::default();
    for (source, outcome) in sources.iter().zip(outcomes) {
        summary.record(&source.id, outcome);
    }
    summary
}
