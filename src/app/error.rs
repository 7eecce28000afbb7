use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Page parsing error: {0}")]
    PageParse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Delivery failed (code {}): {message}", code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()))]
    Delivery { code: Option<i64>, message: String },

    #[error("A run is already in progress")]
    RunInProgress,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
