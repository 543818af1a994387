//! Utility functions for text cleanup, slugs, URL resolution and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace collapsing and XML escaping for feed text
//! - Slug derivation for composed article links
//! - Relative URL resolution against a source's base URL
//! - String truncation for logging upstream bodies
//! - File system validation for the output directory

use once_cell::sync::Lazy;
use regex::Regex;
use crate::error::FeedError;
use tokio::fs;
use tracing::{debug, info, instrument};
use url::Url;

static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Slug used when a title has no usable characters.
pub const FALLBACK_SLUG: &str = "news";

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (backing off to a char
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a title to a URL-friendly slug.
///
/// Lowercases the text, drops everything except ASCII letters, digits,
/// whitespace and hyphens, turns each whitespace run into a single hyphen and
/// trims hyphens from both ends. An empty result becomes [`FALLBACK_SLUG`].
///
/// Applying it to its own output returns the same slug.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("ABC Ltd posts record profit!"), "abc-ltd-posts-record-profit");
/// assert_eq!(slugify("???"), "news");
/// ```
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let kept = NON_SLUG.replace_all(lowered.trim(), "");
    let hyphenated = WHITESPACE.replace_all(&kept, "-");
    let slug = hyphenated.trim_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Collapse whitespace runs to a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Escape the five XML-reserved characters.
///
/// Used for text that ends up in markup outside a CDATA section, such as
/// values interpolated into the HTML of an item description.
pub fn escape_xml(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Resolve `href` against `base`, leaving absolute URLs untouched.
///
/// Returns `None` for empty input, when neither form parses, or when the
/// result is not an `http`/`https` URL (`javascript:`, `mailto:` and the like).
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = match Url::parse(href) {
        Ok(absolute) => absolute,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Create the feed output directory if needed and check that feeds can be
/// written into it.
///
/// The check writes and removes a hidden marker file, so it fails the same
/// way a feed write would.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), FeedError> {
    fs::create_dir_all(path).await?;
    let marker = std::path::Path::new(path).join(".market_feeds-write-check");
    fs::write(&marker, b"").await?;
    if let Err(e) = fs::remove_file(&marker).await {
        debug!(path = %marker.display(), error = %e, "Could not remove write-check file");
    }
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        let s = "₹₹₹₹";
        let result = truncate_for_log(s, 4);
        assert!(result.starts_with('₹'));
        assert!(result.contains("(+9 bytes)"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("ABC Ltd posts record quarterly profit"),
            "abc-ltd-posts-record-quarterly-profit"
        );
        assert_eq!(slugify("Test-Article!"), "test-article");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("Special@#$Characters"), "specialcharacters");
        assert_eq!(slugify("  -Q3 results: ₹500 cr-  "), "q3-results-500-cr");
    }

    #[test]
    fn test_slugify_falls_back_to_news() {
        assert_eq!(slugify(""), "news");
        assert_eq!(slugify("   "), "news");
        assert_eq!(slugify("!!! ---"), "news");
        assert_eq!(slugify("₹ €"), "news");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        for title in [
            "ABC Ltd posts record quarterly profit",
            "Sensex - Nifty end flat; IT drags",
            "a  -  b",
            "Trump-Xi 'situationship'",
            "",
            "Ünïcödé Tïtlé 2025",
        ] {
            let once = slugify(title);
            assert_eq!(slugify(&once), once, "slug of {title:?} changed on second pass");
        }
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a\n\n b\t c  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_escape_xml_all_five() {
        assert_eq!(
            escape_xml(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_resolve_url() {
        let base = "https://www.moneycontrol.com/news/tags/buzzing-stocks.html";
        assert_eq!(
            resolve_url(base, "/news/business/stocks/abc-123.html").as_deref(),
            Some("https://www.moneycontrol.com/news/business/stocks/abc-123.html")
        );
        assert_eq!(
            resolve_url(base, "https://m.moneycontrol.com/x").as_deref(),
            Some("https://m.moneycontrol.com/x")
        );
        assert_eq!(resolve_url(base, "  "), None);
        assert_eq!(resolve_url("not a url", "/relative"), None);
    }

    #[test]
    fn test_resolve_url_keeps_only_web_links() {
        let base = "https://scanx.trade/stock-market-news";
        assert_eq!(resolve_url(base, "javascript:void(0)"), None);
        assert_eq!(resolve_url(base, "mailto:desk@scanx.trade"), None);
        assert_eq!(resolve_url(base, "data:image/png;base64,AAAA"), None);
        assert_eq!(
            resolve_url(base, "http://scanx.trade/a").as_deref(),
            Some("http://scanx.trade/a")
        );
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("feeds/out");
        let path = nested.to_str().unwrap();
        ensure_writable_dir(path).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_rejects_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("feeds");
        std::fs::write(&file, "not a directory").unwrap();
        let err = ensure_writable_dir(file.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, FeedError::Io(_)));
    }
}
