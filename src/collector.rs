//! Orchestrates the source adapters and selects the new items of a run.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};

use crate::app::{RelayError, Result};
use crate::domain::{NewsItem, RunBatch, SourceGroup};
use crate::enrich::ImageLookup;
use crate::sources::{SourceAdapter, SourceFailure};
use crate::store::SeenStore;

/// Raw candidates requested from each adapter, as a multiple of `top_n`.
pub const CANDIDATE_FACTOR: usize = 3;

/// Output of one collection: the selected batch plus recovered failures.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub batch: RunBatch,
    pub failures: Vec<SourceFailure>,
}

pub struct Collector {
    adapters: Vec<Box<dyn SourceAdapter>>,
    images: Option<ImageLookup>,
    top_n: usize,
    source_timeout: Duration,
    image_concurrency: usize,
}

impl Collector {
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>, top_n: usize, source_timeout: Duration) -> Self {
        Self {
            adapters,
            images: None,
            top_n,
            source_timeout,
            image_concurrency: 4,
        }
    }

    pub fn with_images(mut self, images: ImageLookup, concurrency: usize) -> Self {
        self.images = Some(images);
        self.image_concurrency = concurrency.max(1);
        self
    }

    /// Fetch every source, drop already-sent items and keep the first
    /// `top_n` per source in source order.
    ///
    /// Adapter failures are recovered into [`SourceFailure`]s; only store
    /// errors abort the collection.
    pub async fn collect<S: SeenStore + ?Sized>(&self, store: &S) -> Result<Collection> {
        let cap = self.top_n.saturating_mul(CANDIDATE_FACTOR);
        let fetched = join_all(self.adapters.iter().map(|a| self.fetch_one(a.as_ref(), cap))).await;

        let mut groups = Vec::with_capacity(fetched.len());
        let mut failures = Vec::new();

        for (adapter, result) in self.adapters.iter().zip(fetched) {
            let candidates = match result {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(source = adapter.name(), error = %e, "source failed");
                    failures.push(SourceFailure::from_error(adapter.name(), &e));
                    Vec::new()
                }
            };

            let fetched_count = candidates.len();
            let items = self.select_new(candidates, store)?;
            tracing::info!(
                source = adapter.name(),
                fetched = fetched_count,
                selected = items.len(),
                "source collected"
            );

            groups.push(SourceGroup {
                source: adapter.name().to_string(),
                items,
            });
        }

        if let Some(ref images) = self.images {
            for group in &mut groups {
                let items = std::mem::take(&mut group.items);
                group.items = self.enrich(images, items).await;
            }
        }

        Ok(Collection {
            batch: RunBatch::new(groups),
            failures,
        })
    }

    async fn fetch_one(&self, adapter: &dyn SourceAdapter, cap: usize) -> Result<Vec<NewsItem>> {
        match tokio::time::timeout(self.source_timeout, adapter.fetch(cap)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout {
                what: adapter.name().to_string(),
                secs: self.source_timeout.as_secs(),
            }),
        }
    }

    fn select_new<S: SeenStore + ?Sized>(
        &self,
        candidates: Vec<NewsItem>,
        store: &S,
    ) -> Result<Vec<NewsItem>> {
        let mut ids = HashSet::new();
        let mut selected = Vec::with_capacity(self.top_n);

        for item in candidates {
            if selected.len() >= self.top_n {
                break;
            }
            if !item.is_valid() || !ids.insert(item.id.clone()) {
                continue;
            }
            if store.is_sent(&item.id)? {
                tracing::debug!(item_id = %item.id, "already sent");
                continue;
            }
            selected.push(item);
        }

        Ok(selected)
    }

    async fn enrich(&self, images: &ImageLookup, items: Vec<NewsItem>) -> Vec<NewsItem> {
        stream::iter(items)
            .map(|item| async move {
                if item.image.is_some() {
                    return item;
                }
                let image = images.representative_image(&item.link).await;
                item.with_image(image)
            })
            .buffered(self.image_concurrency)
            .collect()
            .await
    }
}
