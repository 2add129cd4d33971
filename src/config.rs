use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub dictionary: DictionaryConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default = "default_pipe")]
    pub delimiter: String,
    #[serde(default = "default_start_from")]
    pub start_from: String,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            delimiter: default_pipe(),
            start_from: default_start_from(),
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("symbol_data/symbol_table.csv")
}
fn default_pipe() -> String {
    "|".to_string()
}
fn default_comma() -> String {
    ",".to_string()
}
fn default_start_from() -> String {
    "A".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

fn default_worker_count() -> usize {
    64
}

/// Retry behaviour for failed page requests. Absent `max_attempts` retries forever.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_ms: u64,
    #[serde(default)]
    pub rotate_after: Option<u32>,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
            rotate_after: self.rotate_after,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default = "default_control_addr")]
    pub control_addr: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_true")]
    pub rotate_per_job: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy_url: default_proxy_url(),
            control_addr: default_control_addr(),
            password_env: default_password_env(),
            rotate_per_job: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_proxy_url() -> String {
    "socks5h://127.0.0.1:9050".to_string()
}
fn default_control_addr() -> String {
    "127.0.0.1:9051".to_string()
}
fn default_password_env() -> String {
    "TOR_CONTROLLER_PW".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DictionaryConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_common_symbols")]
    pub common_symbols: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            common_symbols: default_common_symbols(),
        }
    }
}

/// Tickers that double as everyday English words.
const COMMON_SYMBOLS: &[&str] = &[
    "ALL", "ANY", "BIG", "BRO", "BUY", "CALM", "CAN", "CAP", "ECO", "DIET", "DIG", "DIM", "DOG",
    "DROP", "EAT", "EDIT", "FAME", "FAN", "FAST", "FAT", "FATE", "FIVE", "FLOW", "FOUR", "FUD",
    "FUN", "GOLD", "GOOD", "HEAR", "HOLD", "HOME", "HOPE", "IT", "JOB", "JUST", "KEY", "KEYS",
    "KNOW", "LAWS", "LAZY", "LIFE", "LOAN", "LOVE", "MOM", "MOON", "NEAR", "NEED", "NERD", "NEW",
    "NEXT", "NICE", "NINE", "NOW", "ONE", "OUT", "PLAN", "PLAY", "PUMP", "ROLL", "ROOF", "ROOT",
    "SACH", "SAFE", "SAIL", "SAND", "SALT", "SAVE", "SEE", "SEED", "SEEK", "SIX", "SNOW", "SO",
    "SUB", "SUP", "TELL", "TEN", "TRUE", "TWO", "UNIT", "VERY", "WELL", "WHEN", "WOW", "YELL",
    "YOLO",
];

fn default_common_symbols() -> Vec<String> {
    COMMON_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedditConfig {
    #[serde(default = "default_reddit_root")]
    pub root: PathBuf,
    #[serde(default = "default_subreddit")]
    pub subreddit: String,
    #[serde(default = "default_reddit_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_pipe")]
    pub delimiter: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            root: default_reddit_root(),
            subreddit: default_subreddit(),
            base_url: default_reddit_url(),
            page_size: default_page_size(),
            delimiter: default_pipe(),
        }
    }
}

fn default_reddit_root() -> PathBuf {
    PathBuf::from("reddit_data")
}
fn default_subreddit() -> String {
    "wallstreetbets".to_string()
}
fn default_reddit_url() -> String {
    "https://api.pushshift.io/reddit/search".to_string()
}
fn default_page_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_root")]
    pub root: PathBuf,
    #[serde(default = "default_twitter_url")]
    pub base_url: String,
    #[serde(default = "default_start_date")]
    pub start_date: String,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_comma")]
    pub delimiter: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_min_retweets")]
    pub min_retweets: u32,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            root: default_twitter_root(),
            base_url: default_twitter_url(),
            start_date: default_start_date(),
            utc_offset_hours: default_utc_offset(),
            page_size: default_page_size(),
            delimiter: default_comma(),
            lang: default_lang(),
            min_retweets: default_min_retweets(),
        }
    }
}

fn default_twitter_root() -> PathBuf {
    PathBuf::from("twitter_data")
}
fn default_twitter_url() -> String {
    "http://127.0.0.1:8085/search/tweets".to_string()
}
fn default_start_date() -> String {
    "2011-03-01".to_string()
}
fn default_utc_offset() -> i64 {
    8
}
fn default_lang() -> String {
    "en".to_string()
}
fn default_min_retweets() -> u32 {
    1
}

impl TwitterConfig {
    pub fn start_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")
            .with_context(|| format!("twitter.start_date '{}' is not YYYY-MM-DD", self.start_date))
    }
}

/// Single-character delimiter from a config string.
pub fn delimiter_char(value: &str, key: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("{} must be exactly one character, got '{}'", key, value),
    }
}

/// Load the configuration file, falling back to the built-in defaults when
/// the file does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.workers.count == 0 {
        bail!("workers.count must be >= 1");
    }
    if config.reddit.page_size == 0 {
        bail!("reddit.page_size must be >= 1");
    }
    if config.twitter.page_size == 0 {
        bail!("twitter.page_size must be >= 1");
    }

    delimiter_char(&config.catalog.delimiter, "catalog.delimiter")?;
    delimiter_char(&config.reddit.delimiter, "reddit.delimiter")?;
    delimiter_char(&config.twitter.delimiter, "twitter.delimiter")?;

    config.twitter.start_date()?;

    if config.retry.max_attempts == Some(0) {
        bail!("retry.max_attempts must be >= 1 when set");
    }

    for pattern in config
        .catalog
        .include_globs
        .iter()
        .chain(&config.catalog.exclude_globs)
    {
        Glob::new(pattern).with_context(|| format!("invalid symbol glob '{}'", pattern))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.workers.count, 64);
        assert_eq!(config.reddit.subreddit, "wallstreetbets");
        assert_eq!(config.reddit.page_size, 500);
        assert_eq!(config.twitter.delimiter, ",");
        assert!(config.query.common_symbols.iter().any(|s| s == "ALL"));
        assert!(config.retry.max_attempts.is_none());
        validate(&config).unwrap();
    }

    #[test]
    fn overrides_are_applied() {
        let config: Config = toml::from_str(
            r#"
[workers]
count = 8

[retry]
max_attempts = 3
backoff_ms = 250

[reddit]
subreddit = "stocks"
"#,
        )
        .unwrap();
        assert_eq!(config.workers.count, 8);
        assert_eq!(config.reddit.subreddit, "stocks");
        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, Some(3));
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config =
            toml::from_str(include_str!("../config/chatter.example.toml")).unwrap();
        validate(&config).unwrap();
        assert!(config.identity.enabled);
        assert_eq!(config.twitter.utc_offset_hours, 8);
    }

    #[test]
    fn rejects_zero_workers() {
        let config: Config = toml::from_str("[workers]\ncount = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_multi_char_delimiter() {
        let config: Config = toml::from_str("[reddit]\ndelimiter = \"||\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_bad_start_date() {
        let config: Config = toml::from_str("[twitter]\nstart_date = \"March 2011\"\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
