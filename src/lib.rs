//! # Newsrelay
//!
//! Collects headlines from RSS feeds and scraped homepages, drops the ones
//! already delivered, and relays the top few per source to a Telegram chat.
//!
//! ## Architecture
//!
//! ```text
//! Sources → Collector (dedup, top N, images) → Dispatcher → Sink
//!                         ↕                        ↓
//!                      SeenStore  ←──── mark after delivery
//! ```
//!
//! - [`sources`]: feed and page adapters producing candidate items
//! - [`collector`]: concurrent fetch, dedup against the store, selection
//! - [`dispatch`]: HTML formatting, Telegram delivery, retry and marking
//! - [`store`]: SQLite record of delivered item ids
//! - [`daemon`]: daily scheduler
//! - [`bot`]: on-demand runs from chat commands
//!
//! ## Quick Start
//!
//! ```bash
//! # Preview what would be sent
//! newsrelay run --dry-run
//!
//! # Send once, now
//! newsrelay run
//!
//! # Daily at the configured time, with the health server
//! newsrelay serve
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together config, store,
/// fetcher and pipeline.
pub mod app;

/// `/start` and `/send` chat commands via long polling.
pub mod bot;

/// Configuration loading, environment overrides and validation.
///
/// Loads from `~/.config/newsrelay/config.toml`.
pub mod config;

/// Daily scheduler with signal handling.
pub mod daemon;

/// Command-line interface using clap.
///
/// - `run [--dry-run]` - Collect and deliver once
/// - `serve` - Scheduler, health server and `/start` / `/send` commands
/// - `sources` - List configured sources
/// - `seen [--limit N]` - Recently delivered ids
pub mod cli;

pub mod collector;

/// Core domain models.
///
/// - [`NewsItem`](domain::NewsItem): a candidate or selected headline
/// - [`RunBatch`](domain::RunBatch): per-source selection of one run
/// - [`SeenRecord`](domain::SeenRecord): a delivered id with its timestamp
pub mod domain;

pub mod dispatch;

/// Representative image lookup from article meta tags.
pub mod enrich;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for raw body retrieval
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// HTTP liveness and status endpoints.
pub mod health;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`NewsItem`](domain::NewsItem)s.
pub mod normalizer;

pub mod pipeline;

pub mod sources;

/// SQLite persistence layer.
///
/// - [`SeenStore`](store::SeenStore): Trait defining the seen-set operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
