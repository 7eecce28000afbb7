use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub source: String,
    pub title: String,
    pub link: String,
    pub image: Option<String>,
}

impl NewsItem {
    /// Build an item from raw title/link text.
    ///
    /// Returns `None` when either field is empty after trimming, so invalid
    /// entries never enter the pipeline.
    pub fn new(source_key: &str, source_name: &str, title: &str, link: &str) -> Option<Self> {
        let title = collapse_whitespace(title);
        let link = link.trim();
        if title.is_empty() || link.is_empty() {
            return None;
        }

        Some(Self {
            id: Self::generate_id(source_key, link),
            source: source_name.to_string(),
            title,
            link: link.to_string(),
            image: None,
        })
    }

    /// Deterministic identity from the source key and the canonical link.
    pub fn generate_id(source_key: &str, link: &str) -> String {
        format!("{}:{}", source_key, link)
    }

    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.link.trim().is_empty() && !self.id.is_empty()
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }
}

/// Resolve `href` against `base`, accepting only http(s) results.
///
/// Handles absolute, root-relative (`/a.chn`) and protocol-relative
/// (`//host/a.chn`) references.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation_deterministic() {
        let id1 = NewsItem::generate_id("vnexpress", "https://x/1");
        let id2 = NewsItem::generate_id("vnexpress", "https://x/1");
        assert_eq!(id1, id2);
        assert_eq!(id1, "vnexpress:https://x/1");
    }

    #[test]
    fn test_id_generation_different_inputs() {
        let id1 = NewsItem::generate_id("vnexpress", "https://x/1");
        let id2 = NewsItem::generate_id("vnexpress", "https://x/2");
        let id3 = NewsItem::generate_id("tuoitre", "https://x/1");
        assert_ne!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_new_trims_and_rejects_empty() {
        let item = NewsItem::new("k", "Name", "  Hello \n world ", " https://x/1 ").unwrap();
        assert_eq!(item.title, "Hello world");
        assert_eq!(item.link, "https://x/1");
        assert_eq!(item.id, "k:https://x/1");
        assert!(item.is_valid());

        assert!(NewsItem::new("k", "Name", "   ", "https://x/1").is_none());
        assert!(NewsItem::new("k", "Name", "Title", "  ").is_none());
    }

    #[test]
    fn test_resolve_link_variants() {
        let base = Url::parse("https://cafef.vn/").unwrap();
        assert_eq!(
            resolve_link(&base, "/thi-truong.chn").as_deref(),
            Some("https://cafef.vn/thi-truong.chn")
        );
        assert_eq!(
            resolve_link(&base, "//cafef.vn/a.chn").as_deref(),
            Some("https://cafef.vn/a.chn")
        );
        assert_eq!(
            resolve_link(&base, "https://other.vn/b.chn").as_deref(),
            Some("https://other.vn/b.chn")
        );
        assert_eq!(resolve_link(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_link(&base, "#top"), None);
        assert_eq!(resolve_link(&base, ""), None);
    }
}
