use feed_rs::model::Link;
use feed_rs::parser;
use html_escape::decode_html_entities;
use url::Url;

use crate::app::{RelayError, Result};
use crate::config::FeedSource;
use crate::domain::{resolve_link, NewsItem};

/// Converts RSS/Atom/JSON feed bodies into [`NewsItem`]s.
#[derive(Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse `body` and return at most `cap` valid items in feed order.
    ///
    /// Entries without a title or link are skipped; relative links are
    /// resolved against the feed URL.
    pub fn normalize(&self, source: &FeedSource, body: &[u8], cap: usize) -> Result<Vec<NewsItem>> {
        let feed = parser::parse(body).map_err(|e| RelayError::FeedParse(e.to_string()))?;
        let base = Url::parse(&source.url)?;

        let items = feed
            .entries
            .into_iter()
            .take(cap)
            .filter_map(|entry| {
                let title = entry
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string())?;
                let link = pick_link(&entry.links).and_then(|l| resolve_link(&base, &l.href))?;

                NewsItem::new(&source.key, &source.name, &title, &link)
            })
            .collect();

        Ok(items)
    }
}

/// The entry's article link: `rel="alternate"` or no rel, else the first.
fn pick_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
}
