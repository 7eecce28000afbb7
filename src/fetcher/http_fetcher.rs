use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;

use crate::app::Result;
use crate::fetcher::Fetcher;

const ACCEPT_ANY: &str =
    "application/rss+xml,application/atom+xml,application/xml;q=0.9,text/html;q=0.9,*/*;q=0.8";

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_ANY));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;

        tracing::debug!(url, status = %response.status(), "fetched");
        let body = response.bytes().await?.to_vec();
        Ok(body)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::app::{RelayError, Result};
    use crate::fetcher::Fetcher;

    /// In-memory fetcher serving canned bodies by URL.
    #[derive(Default)]
    pub struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        delays: HashMap<String, Duration>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
            self.delays.insert(url.to_string(), delay);
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| RelayError::Other(format!("404 Not Found: {}", url)))
        }
    }
}
