//! Binance 24h ticker source
//!
//! ## API Reference
//!
//! Endpoint: https://api.binance.com/api/v3/ticker/24hr
//! Returns: Array of ticker statistics for every trading pair. Numeric
//! fields are encoded as strings.
//!
//! Only pairs quoted in the configured asset (default `USDT`) are kept, and
//! the quote suffix is stripped (`BTCUSDT` -> `BTC`). The tracked volume is
//! `quoteVolume`, i.e. volume denominated in the quote asset.

use super::{get_body, http_client, FetchError, MarketDataSource};
use crate::pipeline::types::{MarketSnapshot, TickerRow};
use async_trait::async_trait;
use serde::Deserialize;

pub const SOURCE_ID: &str = "binance";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceTicker {
    pub symbol: String,
    pub last_price: String,
    pub low_price: String,
    pub price_change_percent: String,
    pub quote_volume: String,
}

impl BinanceTicker {
    /// Convert into a row, `None` when the pair is not quoted in `quote_asset`
    /// or a numeric field does not parse
    pub fn into_row(self, quote_asset: &str) -> Option<TickerRow> {
        let base = self.symbol.strip_suffix(quote_asset)?;
        if base.is_empty() {
            return None;
        }

        let price: f64 = self.last_price.parse().ok()?;
        let low: f64 = self.low_price.parse().ok()?;
        let change: f64 = self.price_change_percent.parse().ok()?;
        let volume: f64 = self.quote_volume.parse().ok()?;

        Some(
            TickerRow::new(base, volume)
                .with_price(price)
                .with_low_24h(low)
                .with_price_change_pct(change),
        )
    }
}

/// Parse a raw `/ticker/24hr` payload into a snapshot
pub fn parse_tickers(
    body: &str,
    quote_asset: &str,
    captured_at: i64,
) -> Result<MarketSnapshot, FetchError> {
    let tickers: Vec<BinanceTicker> = serde_json::from_str(body)?;
    let total = tickers.len();

    let snapshot = MarketSnapshot::from_rows(
        SOURCE_ID,
        captured_at,
        tickers
            .into_iter()
            .filter_map(|ticker| ticker.into_row(quote_asset)),
    );

    log::debug!(
        "📈 Binance: {} of {} pairs quoted in {}",
        snapshot.len(),
        total,
        quote_asset
    );

    Ok(snapshot)
}

pub struct BinanceSource {
    client: reqwest::Client,
    url: String,
    quote_asset: String,
}

impl BinanceSource {
    pub fn new(
        url: impl Into<String>,
        quote_asset: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: url.into(),
            quote_asset: quote_asset.into(),
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, FetchError> {
        let body = get_body(&self.client, &self.url).await?;
        parse_tickers(&body, &self.quote_asset, chrono::Utc::now().timestamp())
    }
}
