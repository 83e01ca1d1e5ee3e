//! Engine configuration from environment variables
//!
//! Every setting has a default so a bare `volwatch_runtime` starts with the
//! built-in rule set, in-memory baselines and log-only notifications.
//! Unparseable values are fatal: they surface as `ConfigError` at startup.

use super::rules::{default_rules, load_rules_file, validate_rules, AlertRule};
use std::env;
use std::fmt;

pub const DEFAULT_BINANCE_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/24hr";
pub const DEFAULT_COINGECKO_MARKETS_URL: &str =
    "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&order=volume_desc&per_page=100&page=1";

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the scan engine runtime
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds between the end of one cycle and the start of the next
    pub scan_interval_secs: u64,

    /// Cooldown after a failed (panicked) cycle
    pub error_retry_delay_secs: u64,

    pub h1_rotation_secs: i64,
    pub h24_rotation_secs: i64,

    /// Upper bound for a single source fetch
    pub fetch_timeout_secs: u64,

    /// SQLite database path (`None` = in-memory baselines)
    pub db_path: Option<String>,

    /// Directory of schema migrations applied at startup (skipped when absent)
    pub schema_dir: String,

    /// JSON rules file (`None` = built-in rule set)
    pub rules_path: Option<String>,

    pub rules: Vec<AlertRule>,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    pub binance_ticker_url: String,
    pub coingecko_markets_url: String,

    /// Only pairs quoted in this asset are kept (suffix is stripped)
    pub binance_quote_asset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            error_retry_delay_secs: 60,
            h1_rotation_secs: 3_600,
            h24_rotation_secs: 86_400,
            fetch_timeout_secs: 10,
            db_path: None,
            schema_dir: "sql".to_string(),
            rules_path: None,
            rules: default_rules(),
            telegram_bot_token: None,
            telegram_chat_ids: Vec::new(),
            binance_ticker_url: DEFAULT_BINANCE_TICKER_URL.to_string(),
            coingecko_markets_url: DEFAULT_COINGECKO_MARKETS_URL.to_string(),
            binance_quote_asset: "USDT".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SCAN_INTERVAL_SECS` (default: 30)
    /// - `ERROR_RETRY_DELAY_SECS` (default: 60)
    /// - `H1_ROTATION_SECS` (default: 3600)
    /// - `H24_ROTATION_SECS` (default: 86400)
    /// - `FETCH_TIMEOUT_SECS` (default: 10)
    /// - `VOLWATCH_DB_PATH` (default: unset, in-memory)
    /// - `VOLWATCH_SCHEMA_DIR` (default: sql)
    /// - `VOLWATCH_RULES_PATH` (default: unset, built-in rules)
    /// - `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_IDS` (comma-separated)
    /// - `BINANCE_TICKER_URL` / `COINGECKO_MARKETS_URL`
    /// - `BINANCE_QUOTE_ASSET` (default: USDT)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map instead of the process env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let rules_path = non_empty("VOLWATCH_RULES_PATH");
        let rules = match &rules_path {
            Some(path) => load_rules_file(path)?,
            None => defaults.rules,
        };

        let telegram_chat_ids = match non_empty("TELEGRAM_CHAT_IDS") {
            Some(raw) => parse_chat_ids(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            scan_interval_secs: parse_or(
                &lookup,
                "SCAN_INTERVAL_SECS",
                defaults.scan_interval_secs,
            )?,
            error_retry_delay_secs: parse_or(
                &lookup,
                "ERROR_RETRY_DELAY_SECS",
                defaults.error_retry_delay_secs,
            )?,
            h1_rotation_secs: parse_or(&lookup, "H1_ROTATION_SECS", defaults.h1_rotation_secs)?,
            h24_rotation_secs: parse_or(
                &lookup,
                "H24_ROTATION_SECS",
                defaults.h24_rotation_secs,
            )?,
            fetch_timeout_secs: parse_or(
                &lookup,
                "FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout_secs,
            )?,
            db_path: non_empty("VOLWATCH_DB_PATH"),
            schema_dir: non_empty("VOLWATCH_SCHEMA_DIR").unwrap_or(defaults.schema_dir),
            rules_path,
            rules,
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_ids,
            binance_ticker_url: non_empty("BINANCE_TICKER_URL")
                .unwrap_or(defaults.binance_ticker_url),
            coingecko_markets_url: non_empty("COINGECKO_MARKETS_URL")
                .unwrap_or(defaults.coingecko_markets_url),
            binance_quote_asset: non_empty("BINANCE_QUOTE_ASSET")
                .map(|s| s.to_uppercase())
                .unwrap_or(defaults.binance_quote_asset),
        })
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("SCAN_INTERVAL_SECS", self.scan_interval_secs as i64),
            ("ERROR_RETRY_DELAY_SECS", self.error_retry_delay_secs as i64),
            ("H1_ROTATION_SECS", self.h1_rotation_secs),
            ("H24_ROTATION_SECS", self.h24_rotation_secs),
            ("FETCH_TIMEOUT_SECS", self.fetch_timeout_secs as i64),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }

        if self.telegram_bot_token.is_some() && self.telegram_chat_ids.is_empty() {
            return Err(ConfigError::MissingVariable("TELEGRAM_CHAT_IDS".to_string()));
        }

        validate_rules(&self.rules)
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.is_some()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("{}={:?} is not a valid number", key, raw))
        }),
        _ => Ok(default),
    }
}

fn parse_chat_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                ConfigError::InvalidValue(format!("invalid Telegram chat id: {:?}", s))
            })
        })
        .collect()
}
