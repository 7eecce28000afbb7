use serde::{Deserialize, Serialize};

/// An RSS/Atom/JSON feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Stable identity prefix for item ids. Never change it once items were sent.
    pub key: String,
    /// Display name used in delivered messages.
    pub name: String,
    pub url: String,
}

/// A homepage without a usable feed, scraped for headline links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSource {
    pub key: String,
    pub name: String,
    pub url: String,
    pub rule: ExtractRule,
    #[serde(default = "default_min_title_len")]
    pub min_title_len: usize,
}

/// How candidate headline anchors are picked out of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractRule {
    /// Anchors whose resolved URL ends with `suffix`, optionally restricted
    /// to hosts containing `host`.
    UrlSuffix {
        suffix: String,
        #[serde(default)]
        host: Option<String>,
    },
    /// Anchors matched by a CSS selector, e.g. `h3 a[href]`.
    Selector { selector: String },
}

pub fn default_min_title_len() -> usize {
    20
}

pub fn default_feeds() -> Vec<FeedSource> {
    vec![
        FeedSource {
            key: "vnexpress".into(),
            name: "VnExpress".into(),
            url: "https://vnexpress.net/rss/tin-moi-nhat.rss".into(),
        },
        FeedSource {
            key: "tuoitre".into(),
            name: "Tuổi Trẻ".into(),
            url: "https://tuoitre.vn/rss/tin-moi-nhat.rss".into(),
        },
    ]
}

pub fn default_pages() -> Vec<PageSource> {
    vec![PageSource {
        key: "cafef".into(),
        name: "CafeF".into(),
        url: "https://cafef.vn/".into(),
        rule: ExtractRule::UrlSuffix {
            suffix: ".chn".into(),
            host: Some("cafef.vn".into()),
        },
        min_title_len: default_min_title_len(),
    }]
}
