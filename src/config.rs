//! Source catalogue and client configuration.
//!
//! Every upstream is described by a [`SourceConfig`] entry rather than by
//! code: where to fetch, how to find the records in the document, which keys
//! carry which logical field, how to build links and guids, and which date
//! formats to try. The built-in catalogue lives in `config/sources.yaml` and
//! is compiled into the binary; `--config` replaces it wholesale.

use crate::error::FeedError;
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Built-in source catalogue.
pub const BUILTIN_SOURCES: &str = include_str!("../config/sources.yaml");

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    pub sources: Vec<SourceConfig>,
}

/// HTTP client settings threaded explicitly into the fetcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Headers sent with every request, before per-source headers.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 20,
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One upstream and the feed generated from it.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier, used for `--source` filtering and logs.
    pub id: String,
    /// Output file name, relative to the output directory.
    pub output: String,
    pub channel: ChannelConfig,
    pub request: RequestConfig,
    pub document: DocumentConfig,
    #[serde(default)]
    pub fields: FieldMapping,
    #[serde(default)]
    pub link: LinkRule,
    #[serde(default)]
    pub guid: GuidRule,
    #[serde(default)]
    pub dates: DateConfig,
    #[serde(default)]
    pub defaults: Placeholders,
    /// Builds the title from record fields, e.g. `"{symbol} by {client}"`.
    #[serde(default)]
    pub title_template: Option<String>,
    /// Labelled extras appended to the item description.
    #[serde(default)]
    pub details: Vec<DetailField>,
    /// Base for relative image paths; falls back to the link base.
    #[serde(default)]
    pub image_base: Option<String>,
    /// Use the title as summary when no summary field is present.
    #[serde(default)]
    pub summary_from_title: bool,
    #[serde(default)]
    pub max_items: Option<usize>,
    /// Do not overwrite the previous feed when a run yields no items.
    #[serde(default)]
    pub keep_previous_on_empty: bool,
}

impl SourceConfig {
    /// Base URL used to resolve relative links and fill `{base}`.
    pub fn base_url(&self) -> &str {
        self.link.base.as_deref().unwrap_or(&self.request.url)
    }
}

/// The `<channel>` header of the generated feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en-us".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    pub url: String,
    #[serde(default)]
    pub method: Method,
    /// JSON body for POST requests.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Alternates tried in order when the primary answers HTTP 403.
    #[serde(default)]
    pub fallback_urls: Vec<String>,
    /// Page fetched first to collect cookies; its failure is ignored.
    #[serde(default)]
    pub warm_up: Option<String>,
}

/// How records are located in the upstream document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentConfig {
    Html(HtmlSelectors),
    Json(JsonLayout),
}

/// CSS selectors for card-based HTML pages.
///
/// Every field list holds candidates tried in order against the card; the
/// first matching element wins.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSelectors {
    /// Restricts the search to the first element matching this selector.
    #[serde(default)]
    pub container: Option<String>,
    pub card: String,
    /// Empty means the card's own text.
    #[serde(default)]
    pub title: Vec<String>,
    /// Elements whose `href` is the link. Empty means the card's own `href`.
    #[serde(default)]
    pub link: Vec<String>,
    #[serde(default)]
    pub summary: Vec<String>,
    #[serde(default)]
    pub date: Vec<String>,
    #[serde(default)]
    pub time: Vec<String>,
    /// Elements whose `src` is the image.
    #[serde(default)]
    pub image: Vec<String>,
    /// Cards whose title is shorter than this are navigation junk.
    #[serde(default)]
    pub min_title_len: usize,
}

/// Where the article list sits inside a JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonLayout {
    /// Dotted paths tried in order. Empty means the document root.
    #[serde(default)]
    pub lists: Vec<String>,
    /// Concatenate every list found instead of stopping at the first.
    #[serde(default)]
    pub merge: bool,
    /// Dotted path to a flag that must be truthy for the document to count.
    #[serde(default)]
    pub success_flag: Option<String>,
    /// Key whose presence marks a JSON object embedded in an HTML page.
    #[serde(default)]
    pub embedded_marker: Option<String>,
}

/// Candidate keys per logical field, tried in priority order.
///
/// A field left out of the configuration falls back to its own name, which is
/// also the key HTML extraction stores it under.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub title: Vec<String>,
    pub id: Vec<String>,
    pub link: Vec<String>,
    pub summary: Vec<String>,
    pub category: Vec<String>,
    pub subcategory: Vec<String>,
    pub date: Vec<String>,
    pub time: Vec<String>,
    pub image: Vec<String>,
    /// Short label prefixed to the title as `[TAG] title`.
    pub tag: Vec<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        let own = |name: &str| vec![name.to_string()];
        Self {
            title: own("title"),
            id: own("id"),
            link: own("link"),
            summary: own("summary"),
            category: own("category"),
            subcategory: Vec::new(),
            date: own("date"),
            time: own("time"),
            image: own("image"),
            tag: Vec::new(),
        }
    }
}

/// How an item's link is obtained.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkRule {
    /// Base for relative links and the `{base}` placeholder.
    pub base: Option<String>,
    /// Template with `{base}`, `{slug}`, `{id}` and `{title}` placeholders.
    /// Without one, the mapped `link` field is used.
    pub template: Option<String>,
}

/// Which stable identifier becomes the item `<guid>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuidRule {
    /// The link itself, `isPermaLink="true"`.
    #[default]
    Link,
    /// The mapped id with an optional prefix.
    Id {
        #[serde(default)]
        prefix: String,
    },
    /// SHA-256 hex digest of the link.
    Hash,
    /// Rendered from record fields, e.g. `"{symbol}-{deal_date}"`.
    Template { template: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// chrono format strings, or `rfc3339`, `iso8601`, `rfc2822`.
    pub formats: Vec<String>,
    /// Offset that naive upstream times are expressed in, e.g. `+05:30`.
    pub utc_offset: String,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            formats: vec!["rfc3339".to_string()],
            utc_offset: "+00:00".to_string(),
        }
    }
}

impl DateConfig {
    pub fn offset(&self) -> Result<FixedOffset, FeedError> {
        parse_offset(&self.utc_offset)
    }
}

/// Placeholders substituted for absent fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Placeholders {
    pub title: String,
    pub category: String,
    /// Id used when a template needs `{id}` and the record has none.
    pub id: Option<String>,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            category: "News".to_string(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailField {
    pub label: String,
    pub keys: Vec<String>,
    /// Shown when none of `keys` has a value.
    #[serde(default)]
    pub default: Option<String>,
}

/// Parse `+HH:MM`, `-HHMM` or `Z` into a fixed offset.
pub fn parse_offset(text: &str) -> Result<FixedOffset, FeedError> {
    let t = text.trim();
    let bad = || FeedError::Config(format!("invalid UTC offset {text:?}"));
    if t.eq_ignore_ascii_case("z") || t.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(bad);
    }
    let (sign, rest) = match t.chars().next() {
        Some('+') => (1, &t[1..]),
        Some('-') => (-1, &t[1..]),
        _ => return Err(bad()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| bad())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| bad())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, FeedError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn builtin() -> Result<Self, FeedError> {
        Self::from_yaml(BUILTIN_SOURCES)
    }

    /// Load from `path`, or the built-in catalogue when `None`.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, FeedError> {
        match path {
            Some(p) => {
                let text = tokio::fs::read_to_string(p).await?;
                let config = Self::from_yaml(&text)?;
                info!(sources = config.sources.len(), path = %p.display(), "Loaded source configuration");
                Ok(config)
            }
            None => {
                let config = Self::builtin()?;
                info!(sources = config.sources.len(), "Using built-in source catalogue");
                Ok(config)
            }
        }
    }

    fn validate(&self) -> Result<(), FeedError> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(FeedError::Config(format!("duplicate source id {:?}", source.id)));
            }
            if source.output.trim().is_empty() || source.output.contains('/') {
                return Err(FeedError::Config(format!(
                    "source {:?}: output must be a bare file name",
                    source.id
                )));
            }
            source.dates.offset()?;
            if source.link.template.is_none() && source.fields.link.is_empty() {
                return Err(FeedError::Config(format!(
                    "source {:?} has neither a link template nor a link field",
                    source.id
                )));
            }
            if let GuidRule::Template { template } = &source.guid {
                if template.trim().is_empty() {
                    return Err(FeedError::Config(format!(
                        "source {:?} has an empty guid template",
                        source.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sources whose id is in `ids`, or all of them when `ids` is empty.
    pub fn select<'a>(&'a self, ids: &[String]) -> Result<Vec<&'a SourceConfig>, FeedError> {
        if ids.is_empty() {
            return Ok(self.sources.iter().collect());
        }
        ids.iter()
            .map(|id| {
                self.sources
                    .iter()
                    .find(|s| &s.id == id)
                    .ok_or_else(|| FeedError::Config(format!("unknown source {id:?}")))
            })
            .collect()
    }
}
