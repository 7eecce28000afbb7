pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::HttpFetcher;

/// Retrieves raw bodies over the network. Every implementation must bound
/// its own request time.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
