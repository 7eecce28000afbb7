//! Best-effort representative image lookup.
//!
//! Fetches an article page and reads its social-preview meta tags. This is
//! decoration: every failure yields `None`.

use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

use crate::domain::resolve_link;
use crate::fetcher::Fetcher;

/// Meta tags checked in priority order.
const IMAGE_META: [&str; 4] = [
    r#"meta[property="og:image"]"#,
    r#"meta[name="og:image"]"#,
    r#"meta[property="og:image:secure_url"]"#,
    r#"meta[name="twitter:image"]"#,
];

#[derive(Clone)]
pub struct ImageLookup {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl ImageLookup {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    pub async fn representative_image(&self, article_url: &str) -> Option<String> {
        let body = match tokio::time::timeout(self.timeout, self.fetcher.fetch(article_url)).await
        {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                tracing::debug!(url = article_url, error = %e, "image lookup fetch failed");
                return None;
            }
            Err(_) => {
                tracing::debug!(url = article_url, "image lookup timed out");
                return None;
            }
        };

        let html = String::from_utf8_lossy(&body);
        find_preview_image(article_url, &html)
    }
}

/// Extract the preview image URL from `html`, resolved against `page_url`.
pub fn find_preview_image(page_url: &str, html: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);

    IMAGE_META.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        document
            .select(&selector)
            .filter_map(|meta| meta.value().attr("content"))
            .find_map(|content| resolve_link(&base, content))
    })
}
