//! Card-based HTML extraction.
//!
//! Listing pages repeat one "card" element per article. Each card yields a
//! record with string values under `title`, `link`, `summary`, `date`, `time`
//! and `image`; links and images are resolved to absolute URLs against the
//! page's base URL.

use crate::config::HtmlSelectors;
use crate::error::FeedError;
use crate::models::RawRecord;
use crate::utils::{collapse_whitespace, resolve_url};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument};

/// Compiled selectors for one HTML source.
#[derive(Debug)]
pub struct HtmlExtractor {
    base_url: String,
    container: Option<Selector>,
    card: Selector,
    title: Vec<Selector>,
    link: Vec<Selector>,
    summary: Vec<Selector>,
    date: Vec<Selector>,
    time: Vec<Selector>,
    image: Vec<Selector>,
    min_title_len: usize,
}

fn compile(selector: &str) -> Result<Selector, FeedError> {
    Selector::parse(selector)
        .map_err(|e| FeedError::Config(format!("bad selector {selector:?}: {e}")))
}

fn compile_all(selectors: &[String]) -> Result<Vec<Selector>, FeedError> {
    selectors.iter().map(|s| compile(s)).collect()
}

/// Whitespace-collapsed text of an element, `None` when blank.
fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    if text.is_empty() { None } else { Some(text) }
}

/// First descendant of `card` matching any candidate, in candidate order.
fn first_match<'a>(card: ElementRef<'a>, candidates: &[Selector]) -> Option<ElementRef<'a>> {
    candidates.iter().find_map(|s| card.select(s).next())
}

impl HtmlExtractor {
    pub fn new(selectors: &HtmlSelectors, base_url: &str) -> Result<Self, FeedError> {
        Ok(Self {
            base_url: base_url.to_string(),
            container: selectors.container.as_deref().map(compile).transpose()?,
            card: compile(&selectors.card)?,
            title: compile_all(&selectors.title)?,
            link: compile_all(&selectors.link)?,
            summary: compile_all(&selectors.summary)?,
            date: compile_all(&selectors.date)?,
            time: compile_all(&selectors.time)?,
            image: compile_all(&selectors.image)?,
            min_title_len: selectors.min_title_len,
        })
    }

    /// Extract one record per usable card.
    ///
    /// A missing container or a page without cards yields no records. Cards
    /// without a title or a link are skipped.
    #[instrument(level = "debug", skip_all, fields(base_url = %self.base_url))]
    pub fn extract(&self, body: &str) -> Vec<RawRecord> {
        let document = Html::parse_document(body);
        let root = match &self.container {
            Some(container) => match document.select(container).next() {
                Some(element) => element,
                None => {
                    debug!("Container not found");
                    return Vec::new();
                }
            },
            None => document.root_element(),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for card in root.select(&self.card) {
            match self.card_record(card) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        debug!(count = records.len(), skipped, "Extracted HTML cards");
        records
    }

    fn card_record(&self, card: ElementRef<'_>) -> Option<RawRecord> {
        let title = if self.title.is_empty() {
            element_text(card)
        } else {
            first_match(card, &self.title).and_then(element_text)
        }?;
        if title.chars().count() < self.min_title_len {
            return None;
        }

        let href = if self.link.is_empty() {
            card.value().attr("href")
        } else {
            first_match(card, &self.link).and_then(|a| a.value().attr("href"))
        }?;
        let link = resolve_url(&self.base_url, href)?;

        let mut record = RawRecord::new();
        record.insert("title".to_string(), Value::String(title));
        record.insert("link".to_string(), Value::String(link));
        for (key, candidates) in [
            ("summary", &self.summary),
            ("date", &self.date),
            ("time", &self.time),
        ] {
            if let Some(text) = first_match(card, candidates).and_then(element_text) {
                record.insert(key.to_string(), Value::String(text));
            }
        }
        if let Some(src) = first_match(card, &self.image)
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| resolve_url(&self.base_url, src))
        {
            record.insert("image".to_string(), Value::String(src));
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors(yaml: &str) -> HtmlSelectors {
        serde_yaml::from_str(yaml).unwrap()
    }

    const SCANX_PAGE: &str = r#"
        <html><body>
          <a class="article-card" href="/stock-market-news/stocks/abc-wins-order/101">
            <span class="primaryText truncate-text title-hover">ABC   wins
              order</span>
            <span class="mat-caption-time forthText timestamp">2 hours ago</span>
            <div class="content">ABC Ltd bags a large order.</div>
          </a>
          <a class="article-card" href="">
            <span class="primaryText">No link here</span>
          </a>
          <a class="article-card" href="/stock-market-news/stocks/untitled/102"></a>
        </body></html>
    "#;

    #[test]
    fn test_cards_with_candidate_selectors() {
        let config = selectors(
            r#"
card: a.article-card
title: [span.primaryText.truncate-text.title-hover, span.primaryText]
summary: [div.content]
time: [span.mat-caption-time]
"#,
        );
        let extractor = HtmlExtractor::new(&config, "https://scanx.trade/stock-market-news/earnings").unwrap();
        let records = extractor.extract(SCANX_PAGE);

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r["title"], "ABC wins order");
        assert_eq!(r["link"], "https://scanx.trade/stock-market-news/stocks/abc-wins-order/101");
        assert_eq!(r["summary"], "ABC Ltd bags a large order.");
        assert_eq!(r["time"], "2 hours ago");
        assert!(!r.contains_key("image"));
    }

    #[test]
    fn test_card_text_and_min_title_len() {
        let page = r#"
            <a href="/news/markets">Markets</a>
            <a href="/news/business/stocks/buzzing-stocks-xyz-shares-jump-8-on-order-win-123.html">
              Buzzing stocks: XYZ shares jump 8% on order win
            </a>
        "#;
        let config = selectors("card: \"a[href*='/news/']\"\nmin_title_len: 30\n");
        let extractor = HtmlExtractor::new(&config, "https://www.moneycontrol.com").unwrap();
        let records = extractor.extract(page);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "Buzzing stocks: XYZ shares jump 8% on order win");
        assert_eq!(
            records[0]["link"],
            "https://www.moneycontrol.com/news/business/stocks/buzzing-stocks-xyz-shares-jump-8-on-order-win-123.html"
        );
    }

    #[test]
    fn test_missing_container_yields_nothing() {
        let config = selectors("container: \"#news-results-container\"\ncard: div.news-article-card\n");
        let extractor = HtmlExtractor::new(&config, "https://www.marketsmojo.com/news").unwrap();
        assert!(extractor.extract("<div class='news-article-card'>x</div>").is_empty());
    }

    #[test]
    fn test_table_rows_with_date_and_time_cells() {
        let page = r#"
            <table>
              <tr><td>DATE</td><td>TIME</td><td>HEADING</td></tr>
              <tr>
                <td>24-Dec-25</td><td>08:01</td>
                <td><a href="/news/detailed-news.aspx?id=9">Infosys wins deal</a></td>
              </tr>
            </table>
        "#;
        let config = selectors(
            r#"
card: tr
date: ["td:nth-child(1)"]
time: ["td:nth-child(2)"]
title: ["td:nth-child(3) a"]
link: ["td:nth-child(3) a[href]"]
"#,
        );
        let extractor = HtmlExtractor::new(&config, "https://www.skicapital.net").unwrap();
        let records = extractor.extract(page);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["date"], "24-Dec-25");
        assert_eq!(records[0]["time"], "08:01");
        assert_eq!(records[0]["link"], "https://www.skicapital.net/news/detailed-news.aspx?id=9");
    }

    #[test]
    fn test_image_resolved_against_base() {
        let page = r#"<div class="card"><h3>Title</h3><a href="/a/1">x</a><img src="/img/1.jpg"></div>"#;
        let config = selectors("card: div.card\ntitle: [h3]\nlink: [a]\nimage: [img]\n");
        let extractor = HtmlExtractor::new(&config, "https://example.com/list").unwrap();
        let records = extractor.extract(page);
        assert_eq!(records[0]["image"], "https://example.com/img/1.jpg");
    }

    #[test]
    fn test_script_and_mail_links_are_skipped() {
        let page = r#"
            <div class="card"><h3>Share this story</h3><a href="javascript:void(0)">x</a></div>
            <div class="card"><h3>Write to the desk</h3><a href="mailto:desk@example.com">x</a></div>
            <div class="card"><h3>Sensex ends higher</h3><a href="/markets/sensex-ends-higher">x</a></div>
        "#;
        let config = selectors("card: div.card\ntitle: [h3]\nlink: [a]\n");
        let extractor = HtmlExtractor::new(&config, "https://example.com/list").unwrap();
        let records = extractor.extract(page);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["link"], "https://example.com/markets/sensex-ends-higher");
    }

    #[test]
    fn test_bad_selector_is_config_error() {
        let config = selectors("card: \"a[[\"\n");
        let err = HtmlExtractor::new(&config, "https://example.com").unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }
}
