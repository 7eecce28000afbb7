//! Source adapters: one per kind of origin, each producing normalized
//! candidate [`NewsItem`]s in source-native order.

mod feed;
mod page;

pub use feed::FeedAdapter;
pub use page::{extract_links, PageAdapter};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::app::{RelayError, Result};
use crate::config::Config;
use crate::domain::NewsItem;
use crate::fetcher::Fetcher;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Display name of the source.
    fn name(&self) -> &str;

    /// Fetch at most `cap` raw candidates, most recent first.
    async fn fetch(&self, cap: usize) -> Result<Vec<NewsItem>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Timeout,
    Parse,
}

/// A recovered adapter failure, reported in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub kind: FailureKind,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(source: &str, error: &RelayError) -> Self {
        let kind = match error {
            RelayError::Timeout { .. } => FailureKind::Timeout,
            RelayError::FeedParse(_) | RelayError::PageParse(_) | RelayError::InvalidUrl(_) => {
                FailureKind::Parse
            }
            RelayError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            _ => FailureKind::Fetch,
        };

        Self {
            source: source.to_string(),
            kind,
            message: error.to_string(),
        }
    }
}

/// Build the adapters for every configured source, feeds first.
pub fn from_config(config: &Config, fetcher: Arc<dyn Fetcher>) -> Vec<Box<dyn SourceAdapter>> {
    let feeds = config
        .feeds
        .iter()
        .map(|f| Box::new(FeedAdapter::new(f.clone(), fetcher.clone())) as Box<dyn SourceAdapter>);
    let pages = config
        .pages
        .iter()
        .map(|p| Box::new(PageAdapter::new(p.clone(), fetcher.clone())) as Box<dyn SourceAdapter>);
    feeds.chain(pages).collect()
}
