//! Guid-based deduplication.

use crate::models::CanonicalItem;
use itertools::Itertools;

/// Drop items whose guid was already seen, keeping the first occurrence and
/// the relative order of the rest.
///
/// Items with an empty guid are keyed by their link instead.
pub fn dedup_by_guid(items: Vec<CanonicalItem>) -> Vec<CanonicalItem> {
    items
        .into_iter()
        .unique_by(|item| item.dedup_key().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(title: &str, guid: &str, link: &str) -> CanonicalItem {
        CanonicalItem {
            title: title.to_string(),
            link: link.to_string(),
            summary: String::new(),
            category: "News".to_string(),
            published_at: Utc.with_ymd_and_hms(2025, 12, 24, 10, 30, 0).unwrap(),
            image_url: None,
            details: Vec::new(),
            guid: guid.to_string(),
            guid_is_permalink: false,
        }
    }

    #[test]
    fn test_first_occurrence_wins() {
        let out = dedup_by_guid(vec![
            item("a", "g1", "https://x/1"),
            item("b", "g2", "https://x/2"),
            item("a-again", "g1", "https://x/1?ref=2"),
            item("c", "g3", "https://x/3"),
        ]);
        let titles: Vec<_> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_guid_uses_link() {
        let out = dedup_by_guid(vec![
            item("a", "", "https://x/1"),
            item("b", "", "https://x/1"),
            item("c", "", "https://x/2"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].title, "c");
    }

    #[test]
    fn test_no_duplicates_is_identity() {
        let items = vec![item("a", "g1", "https://x/1"), item("b", "g2", "https://x/2")];
        assert_eq!(dedup_by_guid(items.clone()), items);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedup_by_guid(Vec::new()).is_empty());
    }
}
