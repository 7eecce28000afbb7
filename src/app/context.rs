use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::Result;
use crate::collector::Collector;
use crate::config::Config;
use crate::dispatch::{DeliveryPolicy, Dispatcher, Formatter, TelegramSink};
use crate::enrich::ImageLookup;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::pipeline::Pipeline;
use crate::sources;
use crate::store::{SeenStore, SqliteStore};

/// Everything a command needs, built once from the loaded [`Config`].
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub telegram: Arc<TelegramSink>,
    pub pipeline: Arc<Pipeline>,
}

impl AppContext {
    /// Open the store at `db_path`, or at the configured location.
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => config.db_path()?,
        };
        tracing::debug!(path = %db_path.display(), "opening store");

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::with_store(config, store)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::with_store(config, store)
    }

    fn with_store(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(
            &config.collect.user_agent,
            config.collect.fetch_timeout(),
        )?);

        let adapters = sources::from_config(&config, Arc::clone(&fetcher));
        let mut collector = Collector::new(
            adapters,
            config.collect.top_n,
            config.collect.source_timeout(),
        );
        if config.collect.enrich_images {
            let images = ImageLookup::new(fetcher.clone(), config.collect.image_timeout());
            collector = collector.with_images(images, config.collect.image_concurrency);
        }

        let telegram = Arc::new(TelegramSink::new(
            &config.telegram.api_base,
            &config.telegram.bot_token,
            std::time::Duration::from_secs(config.telegram.timeout_secs),
        )?);
        let dispatcher = Dispatcher::new(
            Formatter::new(
                config.telegram.chat_id.clone(),
                config.delivery.fallback_text.clone(),
            ),
            telegram.clone(),
            DeliveryPolicy::from(&config.delivery),
        );

        let pipeline = Arc::new(Pipeline::new(
            collector,
            dispatcher,
            store.clone() as Arc<dyn SeenStore>,
        ));

        Ok(Self {
            config,
            store,
            telegram,
            pipeline,
        })
    }
}
