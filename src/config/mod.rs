//! Configuration management for newsrelay.
//!
//! Configuration is read from `~/.config/newsrelay/config.toml` (or an
//! explicit `--config` path) at startup. If the default file doesn't exist,
//! a commented default configuration is created. Environment variables (and
//! a `.env` file, loaded by the binary) override file values.

pub mod sources;

pub use sources::{ExtractRule, FeedSource, PageSource};

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct, resolved once and passed to each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub schedule: ScheduleConfig,
    pub collect: CollectConfig,
    pub delivery: DeliveryConfig,
    pub health: HealthConfig,
    pub store: StoreConfig,
    pub feeds: Vec<FeedSource>,
    pub pages: Vec<PageSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            schedule: ScheduleConfig::default(),
            collect: CollectConfig::default(),
            delivery: DeliveryConfig::default(),
            health: HealthConfig::default(),
            store: StoreConfig::default(),
            feeds: sources::default_feeds(),
            pages: sources::default_pages(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub timeout_secs: u64,
    /// Answer `/start` and `/send` via `getUpdates` while serving.
    pub poll_commands: bool,
    pub poll_timeout_secs: u64,
    /// Chats allowed to trigger `/send`. Empty allows any chat.
    pub command_chats: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".into(),
            timeout_secs: 20,
            poll_commands: true,
            poll_timeout_secs: 25,
            command_chats: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local wall-clock time of the daily run, `HH:MM`.
    pub send_time: String,
    /// IANA timezone name, e.g. `Asia/Bangkok`.
    pub timezone: String,
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            send_time: "09:00".into(),
            timezone: "Asia/Bangkok".into(),
            run_on_start: false,
        }
    }
}

impl ScheduleConfig {
    pub fn send_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_hhmm(&self.send_time).ok_or_else(|| ConfigError::Invalid {
            field: "schedule.send_time".into(),
            reason: format!("expected HH:MM, got {:?}", self.send_time),
        })
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid {
                field: "schedule.timezone".into(),
                reason: format!("unknown timezone {:?}", self.timezone),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Maximum items delivered per source per run.
    pub top_n: usize,
    /// HTTP timeout for feed and page requests.
    pub fetch_timeout_secs: u64,
    /// Overall bound on one adapter, fetch and parse included.
    pub source_timeout_secs: u64,
    pub enrich_images: bool,
    pub image_timeout_secs: u64,
    pub image_concurrency: usize,
    pub user_agent: String,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            fetch_timeout_secs: 20,
            source_timeout_secs: 30,
            enrich_images: true,
            image_timeout_secs: 10,
            image_concurrency: 4,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X) AppleWebKit/537.36 (KHTML, like Gecko) Chrome Safari".into(),
        }
    }
}

impl CollectConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Attempts per payload, first try included.
    pub max_attempts: u32,
    /// Mark an item sent even when every attempt failed.
    pub mark_on_failure: bool,
    pub retry_delay_ms: u64,
    /// Pause between consecutive messages.
    pub send_interval_ms: u64,
    pub fallback_text: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            mark_on_failure: true,
            retry_delay_ms: 1000,
            send_interval_ms: 1000,
            fallback_text: "Không có tin mới hoặc đã gửi trước đó.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".into(),
            port: 10000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file holding sent item ids. Defaults to the data directory.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// A missing default file is created with comments; a missing explicit
    /// file is an error. Environment overrides are applied; callers pick
    /// [`Config::validate`] or [`Config::validate_pipeline`] for their command.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::read_file(p)?,
            None => {
                let default_path = Self::default_config_path()?;
                if default_path.exists() {
                    Self::read_file(&default_path)?
                } else {
                    Self::create_default_config(&default_path)?;
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/newsrelay/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("newsrelay").join("config.toml"))
    }

    /// Path of the sent-items database.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.store.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join("newsrelay").join("sent_items.sqlite3"))
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("CHAT_ID") {
            self.telegram.chat_id = v;
        }
        if let Some(v) = get("TIMEZONE") {
            self.schedule.timezone = v;
        }
        if let Some(v) = get("SEND_TIME") {
            self.schedule.send_time = v;
        }
        if let Some(v) = get("TOP_N") {
            self.collect.top_n = v.parse().map_err(|_| ConfigError::Invalid {
                field: "TOP_N".into(),
                reason: format!("not a number: {:?}", v),
            })?;
        }
        if let Some(v) = get("PORT") {
            self.health.port = v.parse().map_err(|_| ConfigError::Invalid {
                field: "PORT".into(),
                reason: format!("not a port: {:?}", v),
            })?;
        }
        if let Some(v) = get("DB_PATH") {
            self.store.path = Some(PathBuf::from(v));
        }

        for (env_key, source_key) in SOURCE_URL_ENV {
            if let Some(url) = get(env_key) {
                self.override_source_url(source_key, url);
            }
        }

        Ok(())
    }

    fn override_source_url(&mut self, key: &str, url: String) {
        if let Some(feed) = self.feeds.iter_mut().find(|f| f.key == key) {
            feed.url = url;
        } else if let Some(page) = self.pages.iter_mut().find(|p| p.key == key) {
            page.url = url;
        }
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token (BOT_TOKEN)"));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.chat_id (CHAT_ID)"));
        }
        if self.telegram.poll_commands && !(1..=50).contains(&self.telegram.poll_timeout_secs) {
            return Err(invalid("telegram.poll_timeout_secs", "must be between 1 and 50"));
        }
        self.validate_pipeline()
    }

    /// Validation of everything except delivery credentials. Used by dry runs.
    pub fn validate_pipeline(&self) -> Result<(), ConfigError> {
        self.schedule.send_time()?;
        self.schedule.timezone()?;

        if self.collect.top_n == 0 {
            return Err(invalid("collect.top_n", "must be at least 1"));
        }
        if self.delivery.max_attempts == 0 {
            return Err(invalid("delivery.max_attempts", "must be at least 1"));
        }

        let mut keys = HashSet::new();
        let all = self
            .feeds
            .iter()
            .map(|f| (&f.key, &f.url))
            .chain(self.pages.iter().map(|p| (&p.key, &p.url)));
        for (key, url) in all {
            if key.is_empty() || key.contains(':') {
                return Err(invalid(
                    "sources.key",
                    &format!("{:?} must be non-empty and contain no ':'", key),
                ));
            }
            if !keys.insert(key.as_str()) {
                return Err(invalid("sources.key", &format!("duplicate key {:?}", key)));
            }
            match url::Url::parse(url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => {
                    return Err(invalid(
                        "sources.url",
                        &format!("{:?} is not an http(s) URL", url),
                    ))
                }
            }
        }

        for page in &self.pages {
            if let ExtractRule::Selector { ref selector } = page.rule {
                if scraper::Selector::parse(selector).is_err() {
                    return Err(invalid(
                        "pages.rule.selector",
                        &format!("invalid CSS selector {:?}", selector),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    pub fn default_config_content() -> &'static str {
        r##"# newsrelay configuration
#
# Environment variables override these values:
#   BOT_TOKEN, CHAT_ID, TIMEZONE, SEND_TIME, TOP_N, PORT, DB_PATH,
#   VNEXPRESS_RSS, TUOITRE_RSS, CAFEF_HOME

[telegram]
# Required. Prefer setting BOT_TOKEN / CHAT_ID in the environment.
bot_token = ""
chat_id = ""
api_base = "https://api.telegram.org"
timeout_secs = 20
# Reply to /start and /send while `serve` runs (long polling)
poll_commands = true
poll_timeout_secs = 25
# Chat ids allowed to use /send; empty allows any chat
command_chats = []

[schedule]
# Daily delivery time (HH:MM) in the given IANA timezone
send_time = "09:00"
timezone = "Asia/Bangkok"
run_on_start = false

[collect]
# Maximum items delivered per source per run
top_n = 5
fetch_timeout_secs = 20
source_timeout_secs = 30
# Look up og:image for each selected article
enrich_images = true
image_timeout_secs = 10
image_concurrency = 4
user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X) AppleWebKit/537.36 (KHTML, like Gecko) Chrome Safari"

[delivery]
# Attempts per message, first try included
max_attempts = 2
# Mark items as sent even if every attempt failed (avoids repeat spam)
mark_on_failure = true
retry_delay_ms = 1000
# Pause between messages; group chats accept about 20 messages per minute
send_interval_ms = 1000
fallback_text = "Không có tin mới hoặc đã gửi trước đó."

[health]
enabled = true
bind = "0.0.0.0"
port = 10000

[store]
# path = "/var/lib/newsrelay/sent_items.sqlite3"

# Item ids are "<key>:<link>". Changing a key re-sends that source's items.
[[feeds]]
key = "vnexpress"
name = "VnExpress"
url = "https://vnexpress.net/rss/tin-moi-nhat.rss"

[[feeds]]
key = "tuoitre"
name = "Tuổi Trẻ"
url = "https://tuoitre.vn/rss/tin-moi-nhat.rss"

# Pages without a feed. Rules:
#   { kind = "url_suffix", suffix = ".chn", host = "cafef.vn" }
#   { kind = "selector", selector = "h3 a[href]" }
[[pages]]
key = "cafef"
name = "CafeF"
url = "https://cafef.vn/"
rule = { kind = "url_suffix", suffix = ".chn", host = "cafef.vn" }
min_title_len = 20
"##
    }
}

/// Environment variables that override a source URL, by source key.
const SOURCE_URL_ENV: [(&str, &str); 3] = [
    ("VNEXPRESS_RSS", "vnexpress"),
    ("TUOITRE_RSS", "tuoitre"),
    ("CAFEF_HOME", "cafef"),
];

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (hh, mm) = s.trim().split_once(':')?;
    NaiveTime::from_hms_opt(hh.trim().parse().ok()?, mm.trim().parse().ok()?, 0)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: String, reason: String },
}
