//! Market data sources
//!
//! A source produces one `MarketSnapshot` per scan cycle. The scan cycle
//! runs every source in its own task with a timeout, so implementations only
//! need to report their own errors; they never retry.
//!
//! - `binance` - 24h ticker statistics for every pair in one quote asset
//! - `coingecko` - top coins by volume, with market cap and 24h low

pub mod binance;
pub mod coingecko;

pub use binance::BinanceSource;
pub use coingecko::CoinGeckoSource;

use crate::pipeline::types::MarketSnapshot;
use async_trait::async_trait;
use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    /// Transport-level failure (connect, TLS, body read)
    Http(String),
    /// Upstream answered with a non-success status
    Status(u16),
    /// Payload did not match the expected shape
    Malformed(String),
    /// Fetch exceeded the configured timeout
    Timeout,
    /// Fetch task panicked or was cancelled
    TaskFailed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Malformed(err.to_string())
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(e) => write!(f, "HTTP error: {}", e),
            FetchError::Status(code) => write!(f, "Upstream returned status {}", code),
            FetchError::Malformed(e) => write!(f, "Malformed payload: {}", e),
            FetchError::Timeout => write!(f, "Fetch timed out"),
            FetchError::TaskFailed(e) => write!(f, "Fetch task failed: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

/// Upstream producing a per-cycle market snapshot
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Stable source id, used for rule matching and store namespaces
    fn id(&self) -> &str;

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, FetchError>;
}

/// Shared reqwest client with a per-request timeout
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent(concat!("volwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FetchError::Http(e.to_string()))
}

/// GET `url` and return the body, mapping non-success statuses to `FetchError::Status`
pub(crate) async fn get_body(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::Status(response.status().as_u16()));
    }

    Ok(response.text().await?)
}
