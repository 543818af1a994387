//! Record extraction from upstream documents.
//!
//! Each source is either an HTML listing page or a JSON API. Both turn a
//! response body into a single-pass sequence of [`RawRecord`]s:
//!
//! | Kind | Module | Records keyed by |
//! |------|--------|------------------|
//! | HTML cards | [`html`] | `title`, `link`, `summary`, `date`, `time`, `image` |
//! | JSON API | [`json`] | whatever the upstream article object uses |
//!
//! Neither fails for "nothing found"; they return no records. Only a body
//! that cannot be understood at all is an error.

pub mod html;
pub mod json;

use crate::config::{DocumentConfig, SourceConfig};
use crate::error::FeedError;
use crate::models::RawRecord;
use html::HtmlExtractor;
use json::JsonExtractor;

/// The extractor configured for one source.
#[derive(Debug)]
pub enum Extractor {
    Html(HtmlExtractor),
    Json(JsonExtractor),
}

impl Extractor {
    pub fn for_source(source: &SourceConfig) -> Result<Self, FeedError> {
        Ok(match &source.document {
            DocumentConfig::Html(selectors) => {
                Extractor::Html(HtmlExtractor::new(selectors, source.base_url())?)
            }
            DocumentConfig::Json(layout) => Extractor::Json(JsonExtractor::new(layout)),
        })
    }

    /// Extract records from a response body, in document order.
    pub fn extract(&self, body: &str) -> Result<std::vec::IntoIter<RawRecord>, FeedError> {
        let records = match self {
            Extractor::Html(html) => html.extract(body),
            Extractor::Json(json) => json.extract(body)?,
        };
        Ok(records.into_iter())
    }
}
