//! Data models shared by the extraction, normalization and rendering stages.
//!
//! - [`RawRecord`]: one upstream entry, untyped, keyed however the source likes
//! - [`CanonicalItem`]: the source-agnostic feed item
//! - [`Channel`]: the feed header

use crate::config::ChannelConfig;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// One upstream entry as a map of source-specific keys to untyped values.
///
/// JSON sources yield the article object unchanged; HTML sources store
/// strings under `title`, `link`, `summary`, `date`, `time` and `image`.
pub type RawRecord = serde_json::Map<String, Value>;

/// Look up a dotted path (`stock.code`) in a record.
///
/// Each segment indexes an object by key, or an array by position.
pub fn lookup<'a>(record: &'a RawRecord, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a value as display text, or `None` when it counts as absent.
///
/// Null, blank strings and empty arrays are absent. Booleans read as
/// `Yes`/`No`, arrays of scalars are joined with `", "`.
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_object())
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// First present, non-empty value among `keys`, in priority order.
pub fn first_text(record: &RawRecord, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| lookup(record, key))
        .find_map(value_text)
}

/// The normalized, source-agnostic representation of one news entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalItem {
    pub title: String,
    /// Absolute URL; never empty.
    pub link: String,
    pub summary: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    /// Labelled extras rendered under the summary.
    pub details: Vec<(String, String)>,
    pub guid: String,
    pub guid_is_permalink: bool,
}

impl CanonicalItem {
    /// Key used for deduplication: the guid, or the link when it is empty.
    pub fn dedup_key(&self) -> &str {
        if self.guid.is_empty() { &self.link } else { &self.guid }
    }
}

/// The `<channel>` header of a generated feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub last_build: DateTime<Utc>,
}

impl Channel {
    pub fn from_config(config: &ChannelConfig, last_build: DateTime<Utc>) -> Self {
        Self {
            title: config.title.clone(),
            link: config.link.clone(),
            description: config.description.clone(),
            language: config.language.clone(),
            last_build,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_lookup_nested_path() {
        let r = record(json!({"stock": {"code": "PNGJL", "name": "PN Gadgil"}}));
        assert_eq!(lookup(&r, "stock.code"), Some(&json!("PNGJL")));
        assert_eq!(lookup(&r, "stock.isin"), None);
        assert_eq!(lookup(&r, "stock.code.deeper"), None);
    }

    #[test]
    fn test_lookup_array_index() {
        let r = record(json!({"tags": ["ipo", "sme"]}));
        assert_eq!(lookup(&r, "tags.1"), Some(&json!("sme")));
        assert_eq!(lookup(&r, "tags.x"), None);
    }

    #[test]
    fn test_value_text_absent_values() {
        assert_eq!(value_text(&json!(null)), None);
        assert_eq!(value_text(&json!("   ")), None);
        assert_eq!(value_text(&json!([])), None);
        assert_eq!(value_text(&json!({"a": 1})), None);
    }

    #[test]
    fn test_value_text_scalars() {
        assert_eq!(value_text(&json!(123)), Some("123".to_string()));
        assert_eq!(value_text(&json!(true)), Some("Yes".to_string()));
        assert_eq!(value_text(&json!(" x ")), Some("x".to_string()));
        assert_eq!(
            value_text(&json!(["Order win", "", 42])),
            Some("Order win, 42".to_string())
        );
    }

    #[test]
    fn test_first_text_skips_empty_candidates() {
        let r = record(json!({"Heading": "", "heading": "Lower case wins"}));
        let keys = vec!["Heading".to_string(), "heading".to_string()];
        assert_eq!(first_text(&r, &keys), Some("Lower case wins".to_string()));
    }

    #[test]
    fn test_dedup_key_falls_back_to_link() {
        let item = CanonicalItem {
            title: "t".to_string(),
            link: "https://x/1".to_string(),
            summary: String::new(),
            category: "News".to_string(),
            published_at: Utc::now(),
            image_url: None,
            details: Vec::new(),
            guid: String::new(),
            guid_is_permalink: false,
        };
        assert_eq!(item.dedup_key(), "https://x/1");
    }
}
