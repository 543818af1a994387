//! JSON API extraction.
//!
//! Upstream APIs disagree on where the article list lives (`data`,
//! `data.Articlelist.Articles`, `body.main`, ...), sometimes double-encode it
//! as a JSON string, and in one case only ship it inside an HTML page. The
//! extractor tries the configured candidate paths in order and degrades to an
//! empty list rather than failing when none of them resolves.

use crate::config::JsonLayout;
use crate::error::FeedError;
use crate::models::RawRecord;
use crate::utils::truncate_for_log;
use serde_json::Value;
use tracing::{debug, instrument, warn};

#[derive(Debug)]
pub struct JsonExtractor {
    layout: JsonLayout,
}

/// Parse a value that may be a JSON document encoded as a string.
fn decode_nested(value: Value) -> Value {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(inner @ (Value::Array(_) | Value::Object(_))) => inner,
            _ => Value::String(s),
        },
        other => other,
    }
}

/// Resolve a dotted path, decoding string-encoded JSON along the way.
fn resolve_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root.clone();
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match decode_nested(current) {
            Value::Object(mut map) => map.remove(segment)?,
            Value::Array(mut items) => {
                let idx = segment.parse::<usize>().ok()?;
                if idx >= items.len() {
                    return None;
                }
                items.swap_remove(idx)
            }
            _ => return None,
        };
    }
    Some(decode_nested(current))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "ok" | "success"),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Cut the balanced `{...}` object that contains `"marker": [` out of a page.
///
/// Only a marker whose value is an array counts, so an earlier object-valued
/// key of the same name is passed over.
/// Scans backwards from the marker for each candidate opening brace and
/// forwards for its matching close, honouring string literals and escapes.
pub fn find_embedded_object(page: &str, marker: &str) -> Option<String> {
    let needle = format!("\"{marker}\"");
    let bytes = page.as_bytes();
    let mut search_from = 0;
    while let Some(rel) = page[search_from..].find(&needle) {
        let marker_at = search_from + rel;
        search_from = marker_at + needle.len();
        let after = page[search_from..].trim_start();
        let Some(value) = after.strip_prefix(':') else {
            continue;
        };
        if !value.trim_start().starts_with('[') {
            continue;
        }
        let mut open = page[..marker_at].rfind('{');
        while let Some(start) = open {
            if let Some(end) = matching_brace(bytes, start) {
                if end > marker_at {
                    let candidate = &page[start..=end];
                    if serde_json::from_str::<Value>(candidate).is_ok() {
                        return Some(candidate.to_string());
                    }
                }
            }
            open = page[..start].rfind('{');
        }
    }
    None
}

/// Index of the `}` closing the `{` at `start`.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl JsonExtractor {
    pub fn new(layout: &JsonLayout) -> Self {
        Self {
            layout: layout.clone(),
        }
    }

    fn parse_document(&self, body: &str) -> Result<Value, FeedError> {
        match serde_json::from_str::<Value>(body) {
            Ok(doc) => Ok(decode_nested(doc)),
            Err(e) => {
                if let Some(marker) = &self.layout.embedded_marker {
                    if let Some(embedded) = find_embedded_object(body, marker) {
                        debug!(marker = %marker, bytes = embedded.len(), "Recovered JSON embedded in page");
                        return serde_json::from_str(&embedded)
                            .map_err(|e| FeedError::MalformedDocument(e.to_string()));
                    }
                }
                warn!(
                    error = %e,
                    body_preview = %truncate_for_log(body, 200),
                    "Response is not JSON"
                );
                Err(FeedError::MalformedDocument(e.to_string()))
            }
        }
    }

    /// Extract article objects from a JSON body.
    ///
    /// Errors only when the body is not JSON at all or the success flag is
    /// falsy; a document without any article list yields no records.
    #[instrument(level = "debug", skip_all)]
    pub fn extract(&self, body: &str) -> Result<Vec<RawRecord>, FeedError> {
        let doc = self.parse_document(body)?;

        if let Some(flag) = &self.layout.success_flag {
            let ok = resolve_path(&doc, flag).is_some_and(|v| is_truthy(&v));
            if !ok {
                return Err(FeedError::MalformedDocument(format!(
                    "upstream flag {flag:?} is not truthy"
                )));
            }
        }

        let mut lists: Vec<Vec<Value>> = Vec::new();
        if self.layout.lists.is_empty() {
            if let Value::Array(items) = doc {
                lists.push(items);
            }
        } else {
            for path in &self.layout.lists {
                if let Some(Value::Array(items)) = resolve_path(&doc, path) {
                    debug!(path = %path, count = items.len(), "Found article list");
                    lists.push(items);
                    if !self.layout.merge {
                        break;
                    }
                }
            }
        }

        if lists.is_empty() {
            warn!(paths = ?self.layout.lists, "No article list found in document");
        }

        let records: Vec<RawRecord> = lists
            .into_iter()
            .flatten()
            .filter_map(|entry| match decode_nested(entry) {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Ok(records)
    }
}
