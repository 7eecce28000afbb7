use std::sync::Arc;

use async_trait::async_trait;

use crate::app::Result;
use crate::config::FeedSource;
use crate::domain::NewsItem;
use crate::fetcher::Fetcher;
use crate::normalizer::Normalizer;
use crate::sources::SourceAdapter;

pub struct FeedAdapter {
    source: FeedSource,
    fetcher: Arc<dyn Fetcher>,
    normalizer: Normalizer,
}

impl FeedAdapter {
    pub fn new(source: FeedSource, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            source,
            fetcher,
            normalizer: Normalizer::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn name(&self) -> &str {
        &self.source.name
    }

    async fn fetch(&self, cap: usize) -> Result<Vec<NewsItem>> {
        let body = self.fetcher.fetch(&self.source.url).await?;
        let items = self.normalizer.normalize(&self.source, &body, cap)?;
        tracing::debug!(source = %self.source.name, count = items.len(), "feed parsed");
        Ok(items)
    }
}
