use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::app::{RelayError, Result};
use crate::config::{ExtractRule, PageSource};
use crate::domain::{collapse_whitespace, resolve_link, NewsItem};
use crate::fetcher::Fetcher;
use crate::sources::SourceAdapter;

/// Scrapes headline links from a homepage that has no usable feed.
pub struct PageAdapter {
    source: PageSource,
    fetcher: Arc<dyn Fetcher>,
}

impl PageAdapter {
    pub fn new(source: PageSource, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { source, fetcher }
    }
}

#[async_trait]
impl SourceAdapter for PageAdapter {
    fn name(&self) -> &str {
        &self.source.name
    }

    async fn fetch(&self, cap: usize) -> Result<Vec<NewsItem>> {
        let body = self.fetcher.fetch(&self.source.url).await?;
        let html = String::from_utf8_lossy(&body);
        let items = extract_links(&self.source, &html, cap)?;
        tracing::debug!(source = %self.source.name, count = items.len(), "page scraped");
        Ok(items)
    }
}

/// Pull candidate headline links out of `html` using the source's rule.
///
/// Links are resolved against the page URL, titles shorter than
/// `min_title_len` characters are dropped as navigation noise, and the
/// first occurrence of each resolved link wins.
pub fn extract_links(source: &PageSource, html: &str, cap: usize) -> Result<Vec<NewsItem>> {
    let base = Url::parse(&source.url)?;
    let document = Html::parse_document(html);

    let anchors: Vec<ElementRef<'_>> = match source.rule {
        ExtractRule::UrlSuffix { .. } => document.select(&parse_selector("a[href]")?).collect(),
        ExtractRule::Selector { ref selector } => {
            let anchor = parse_selector("a[href]")?;
            document
                .select(&parse_selector(selector)?)
                .filter_map(|el| {
                    if el.value().name() == "a" && el.value().attr("href").is_some() {
                        Some(el)
                    } else {
                        el.select(&anchor).next()
                    }
                })
                .collect()
        }
    };

    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for a in anchors {
        if items.len() >= cap {
            break;
        }

        let Some(link) = a.value().attr("href").and_then(|h| resolve_link(&base, h)) else {
            continue;
        };
        if !rule_accepts(&source.rule, &link) {
            continue;
        }

        let title = collapse_whitespace(&a.text().collect::<Vec<_>>().join(" "));
        if title.chars().count() < source.min_title_len {
            continue;
        }

        if !seen.insert(link.clone()) {
            continue;
        }

        if let Some(item) = NewsItem::new(&source.key, &source.name, &title, &link) {
            items.push(item);
        }
    }

    Ok(items)
}

fn rule_accepts(rule: &ExtractRule, link: &str) -> bool {
    match rule {
        ExtractRule::UrlSuffix { suffix, host } => {
            if !link.ends_with(suffix.as_str()) {
                return false;
            }
            match host {
                Some(host) => Url::parse(link)
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.contains(host.as_str())))
                    .unwrap_or(false),
                None => true,
            }
        }
        ExtractRule::Selector { .. } => true,
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| RelayError::PageParse(format!("invalid selector {:?}: {:?}", selector, e)))
}
