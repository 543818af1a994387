//! Raw record to canonical item mapping.
//!
//! A [`Normalizer`] applies one source's field-mapping table to each raw
//! record: candidate keys are tried in order and the first present, non-empty
//! value wins. Missing optional fields become placeholders, unparsable dates
//! become the generation time, and both are counted in [`NormalizeStats`]
//! instead of failing the batch. The one thing never substituted is the
//! link: a record without one is dropped.

use crate::config::{DateConfig, GuidRule, SourceConfig};
use crate::error::FeedError;
use crate::models::{CanonicalItem, RawRecord, first_text, lookup, value_text};
use crate::utils::{collapse_whitespace, resolve_url, slugify};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_.]+)(?:\|([^{}]*))?\}").unwrap());

/// Characters of the id that go into an `{id_token}`.
const ID_TOKEN_LEN: usize = 12;

/// Per-run diagnostic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub records: usize,
    pub items: usize,
    /// Records dropped because no link could be built.
    pub skipped_no_link: usize,
    /// Items that received the placeholder title.
    pub title_fallbacks: usize,
    /// Items whose date text did not match any format.
    pub date_fallbacks: usize,
    /// Items without any date text.
    pub undated: usize,
}

/// Values available to `{...}` placeholders besides record fields.
struct TemplateVars<'a> {
    base: &'a str,
    slug: &'a str,
    id: Option<&'a str>,
    title: &'a str,
}

/// Base64 of the first twelve characters of an id, the access token some
/// upstreams expect next to it. Empty for shorter ids.
pub fn id_token(id: &str) -> String {
    if id.chars().count() < ID_TOKEN_LEN {
        return String::new();
    }
    let head: String = id.chars().take(ID_TOKEN_LEN).collect();
    STANDARD.encode(head.as_bytes())
}

/// Fill `{name}` placeholders from `vars`, falling back to record lookups.
///
/// `{name|fallback}` renders `fallback` when the value is empty. With
/// `encode`, everything except `{base}` and `{slug}` is URL-encoded so the
/// result can be used as a link. Unknown placeholders render empty.
fn render_template(template: &str, record: &RawRecord, vars: &TemplateVars<'_>, encode: bool) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            let (value, raw) = match name {
                "base" => (vars.base.to_string(), true),
                "slug" => (vars.slug.to_string(), true),
                "id" => (vars.id.unwrap_or_default().to_string(), false),
                "id_token" => (vars.id.map(id_token).unwrap_or_default(), false),
                "title" => (vars.title.to_string(), false),
                path => (
                    lookup(record, path).and_then(value_text).unwrap_or_default(),
                    false,
                ),
            };
            let value = match caps.get(2) {
                Some(fallback) if value.is_empty() => fallback.as_str().to_string(),
                _ => value,
            };
            if encode && !raw {
                urlencoding::encode(&value).into_owned()
            } else {
                value
            }
        })
        .into_owned()
}

fn localize(naive: NaiveDateTime, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_with_format(text: &str, format: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    match format {
        "rfc3339" => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        "rfc2822" => DateTime::parse_from_rfc2822(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        "iso8601" => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                    .iter()
                    .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                    .and_then(|naive| localize(naive, offset))
            })
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .and_then(|naive| localize(naive, offset))
            }),
        pattern => NaiveDateTime::parse_from_str(text, pattern)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, pattern)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .and_then(|naive| localize(naive, offset)),
    }
}

/// Parse upstream date text with the first matching format.
///
/// Formats are chrono patterns (date-time or date-only) or one of the
/// keywords `rfc3339`, `iso8601` and `rfc2822`. Naive results are read in
/// `offset` and converted to UTC.
pub fn parse_published(text: &str, formats: &[String], offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|format| parse_with_format(text, format, offset))
}

/// SHA-256 hex digest, used as an opaque guid.
pub fn hash_guid(link: &str) -> String {
    format!("{:x}", Sha256::digest(link.as_bytes()))
}

/// Maps raw records of one source to canonical items.
#[derive(Debug)]
pub struct Normalizer<'a> {
    source: &'a SourceConfig,
    offset: FixedOffset,
    now: DateTime<Utc>,
}

impl<'a> Normalizer<'a> {
    /// `now` is the generation time, used for every date fallback.
    pub fn new(source: &'a SourceConfig, now: DateTime<Utc>) -> Result<Self, FeedError> {
        Ok(Self {
            source,
            offset: source.dates.offset()?,
            now,
        })
    }

    fn dates(&self) -> &DateConfig {
        &self.source.dates
    }

    /// Normalize every record, in order, skipping those without a link.
    #[instrument(level = "debug", skip_all, fields(source = %self.source.id))]
    pub fn normalize_all<I>(&self, records: I) -> (Vec<CanonicalItem>, NormalizeStats)
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut stats = NormalizeStats::default();
        let mut items = Vec::new();
        for record in records {
            stats.records += 1;
            if let Some(item) = self.normalize(&record, &mut stats) {
                items.push(item);
            }
        }
        stats.items = items.len();
        (items, stats)
    }

    /// Normalize one record, or `None` when no link can be built for it.
    pub fn normalize(&self, record: &RawRecord, stats: &mut NormalizeStats) -> Option<CanonicalItem> {
        let source = self.source;
        let fields = &source.fields;
        let base = source.base_url();
        let id = first_text(record, &fields.id).or_else(|| source.defaults.id.clone());

        let untemplated = TemplateVars {
            base,
            slug: "",
            id: id.as_deref(),
            title: "",
        };
        let title = match &source.title_template {
            Some(template) => collapse_whitespace(&render_template(template, record, &untemplated, false)),
            None => first_text(record, &fields.title)
                .map(|t| collapse_whitespace(&t))
                .unwrap_or_default(),
        };
        let title = if title.is_empty() {
            stats.title_fallbacks += 1;
            source.defaults.title.clone()
        } else {
            title
        };
        let slug = slugify(&title);

        let vars = TemplateVars {
            base,
            slug: &slug,
            id: id.as_deref(),
            title: &title,
        };
        let link = match &source.link.template {
            Some(template) => {
                if template.contains("{id}") && id.is_none() {
                    None
                } else {
                    resolve_url(base, &render_template(template, record, &vars, true))
                }
            }
            None => first_text(record, &fields.link).and_then(|href| resolve_url(base, &href)),
        };
        let Some(link) = link.filter(|l| !l.is_empty()) else {
            stats.skipped_no_link += 1;
            debug!(source = %source.id, title = %title, "Dropping record without a usable link");
            return None;
        };

        let display_title = match first_text(record, &fields.tag) {
            Some(tag) => format!("[{}] {}", collapse_whitespace(&tag), title),
            None => title.clone(),
        };

        let summary = first_text(record, &fields.summary)
            .map(|s| collapse_whitespace(&s))
            .or_else(|| source.summary_from_title.then(|| title.clone()))
            .unwrap_or_default();

        let section = first_text(record, &fields.category)
            .map(|c| collapse_whitespace(&c))
            .unwrap_or_else(|| source.defaults.category.clone());
        let category = match first_text(record, &fields.subcategory) {
            Some(sub) => format!("{} - {}", section, collapse_whitespace(&sub)),
            None => section,
        };

        let published_at = self.published_at(record, stats);

        let image_base = source.image_base.as_deref().unwrap_or(base);
        let image_url = first_text(record, &fields.image).and_then(|src| resolve_url(image_base, &src));

        let details = source
            .details
            .iter()
            .filter_map(|d| {
                first_text(record, &d.keys)
                    .or_else(|| d.default.clone())
                    .map(|v| (d.label.clone(), collapse_whitespace(&v)))
            })
            .collect();

        let (guid, guid_is_permalink) = match &source.guid {
            GuidRule::Link => (link.clone(), true),
            GuidRule::Id { prefix } => match &id {
                Some(id) => (format!("{prefix}{id}"), false),
                None => (hash_guid(&link), false),
            },
            GuidRule::Hash => (hash_guid(&link), false),
            GuidRule::Template { template } => {
                let rendered = render_template(template, record, &vars, false);
                let rendered = rendered.trim();
                if rendered.is_empty() {
                    (hash_guid(&link), false)
                } else {
                    (rendered.to_string(), false)
                }
            }
        };

        Some(CanonicalItem {
            title: display_title,
            link,
            summary,
            category,
            published_at,
            image_url,
            details,
            guid,
            guid_is_permalink,
        })
    }

    fn published_at(&self, record: &RawRecord, stats: &mut NormalizeStats) -> DateTime<Utc> {
        let fields = &self.source.fields;
        let Some(date) = first_text(record, &fields.date) else {
            stats.undated += 1;
            return self.now;
        };
        let formats = &self.dates().formats;
        let parsed = match first_text(record, &fields.time) {
            Some(time) => parse_published(&format!("{date} {time}"), formats, &self.offset)
                .or_else(|| parse_published(&date, formats, &self.offset)),
            None => parse_published(&date, formats, &self.offset),
        };
        parsed.unwrap_or_else(|| {
            stats.date_fallbacks += 1;
            debug!(source = %self.source.id, date = %date, "Unparsable date; using generation time");
            self.now
        })
    }
}
