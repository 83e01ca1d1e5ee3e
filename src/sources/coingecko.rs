//! CoinGecko markets source
//!
//! ## API Reference
//!
//! Endpoint: https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&order=volume_desc&per_page=100
//! Returns: Array of coins ordered by 24h volume. `market_cap`, `low_24h` and
//! even `total_volume` may be null for freshly listed coins.

use super::{get_body, http_client, FetchError, MarketDataSource};
use crate::pipeline::types::{MarketSnapshot, TickerRow};
use async_trait::async_trait;
use serde::Deserialize;

pub const SOURCE_ID: &str = "coingecko";

#[derive(Debug, Clone, Deserialize)]
pub struct CoinGeckoMarket {
    pub symbol: String,
    pub current_price: Option<f64>,
    pub total_volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
}

impl From<CoinGeckoMarket> for TickerRow {
    fn from(coin: CoinGeckoMarket) -> Self {
        TickerRow {
            symbol: coin.symbol.to_uppercase(),
            // Missing volume counts as zero traded
            volume: coin.total_volume.unwrap_or(0.0),
            price: coin.current_price,
            low_24h: coin.low_24h,
            market_cap: coin.market_cap,
            price_change_pct: coin.price_change_percentage_24h,
        }
    }
}

/// Parse a raw `/coins/markets` payload into a snapshot
pub fn parse_markets(body: &str, captured_at: i64) -> Result<MarketSnapshot, FetchError> {
    let coins: Vec<CoinGeckoMarket> = serde_json::from_str(body)?;
    let snapshot = MarketSnapshot::from_rows(
        SOURCE_ID,
        captured_at,
        coins.into_iter().map(TickerRow::from),
    );

    log::debug!("🦎 CoinGecko: {} coins", snapshot.len());
    Ok(snapshot)
}

pub struct CoinGeckoSource {
    client: reqwest::Client,
    url: String,
}

impl CoinGeckoSource {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoSource {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_snapshot(&self) -> Result<MarketSnapshot, FetchError> {
        let body = get_body(&self.client, &self.url).await?;
        parse_markets(&body, chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::MetricField;

    const FIXTURE: &str = r#"[
        {"id":"bitcoin","symbol":"btc","name":"Bitcoin","current_price":64000.0,"market_cap":1260000000000,"total_volume":31000000000,"low_24h":63100.5,"price_change_percentage_24h":1.2},
        {"id":"newcoin","symbol":"new","name":"New","current_price":0.5,"market_cap":null,"total_volume":null,"low_24h":null,"price_change_percentage_24h":null}
    ]"#;

    #[test]
    fn test_parse_markets() {
        let snapshot = parse_markets(FIXTURE, 7).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.source, "coingecko");

        let btc = snapshot.get("BTC").unwrap();
        assert_eq!(btc.volume, 31_000_000_000.0);
        assert_eq!(btc.field(MetricField::MarketCap), Some(1_260_000_000_000.0));
        assert_eq!(btc.field(MetricField::Low24h), Some(63_100.5));
    }

    #[test]
    fn test_null_fields_are_tolerated() {
        let snapshot = parse_markets(FIXTURE, 0).unwrap();
        let coin = snapshot.get("NEW").unwrap();

        assert_eq!(coin.volume, 0.0);
        assert_eq!(coin.field(MetricField::MarketCap), None);
        assert_eq!(coin.field(MetricField::Low24h), None);
        assert_eq!(coin.field(MetricField::Price), Some(0.5));
    }

    #[test]
    fn test_rate_limit_payload_is_malformed() {
        let result = parse_markets(r#"{"status":{"error_code":429}}"#, 0);
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[tokio::test]
    #[ignore] // Run only when testing with live API
    async fn test_fetch_live_markets() {
        let source =
            CoinGeckoSource::new(crate::pipeline::config::DEFAULT_COINGECKO_MARKETS_URL, 10)
                .unwrap();

        let snapshot = source.fetch_snapshot().await.unwrap();
        assert!(!snapshot.is_empty());
    }
}
