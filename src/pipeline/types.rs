//! Core data types for the rotation and alerting engine
//!
//! - `Horizon` - one of the three comparison windows (instant / 1h / 24h)
//! - `TickerRow` / `MarketSnapshot` - rows fetched from one upstream source in one cycle
//! - `MetricSnapshot` - symbol -> metric view belonging to one horizon
//! - `AlertRecord` - a single rule firing for a single symbol

use super::rules::RuleKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Comparison window with its own baseline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    /// Rotates every scan cycle
    #[serde(rename = "instant")]
    Instant,
    /// Rotates once an hour of wall-clock time has elapsed
    #[serde(rename = "1h")]
    H1,
    /// Rotates once 24 hours of wall-clock time have elapsed
    #[serde(rename = "24h")]
    H24,
}

impl Horizon {
    /// All horizons in evaluation order
    pub const ALL: [Horizon; 3] = [Horizon::Instant, Horizon::H1, Horizon::H24];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Instant => "instant",
            Horizon::H1 => "1h",
            Horizon::H24 => "24h",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field selector for a ticker row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    /// Quote volume over the last 24h (the tracked metric)
    Volume,
    Price,
    Low24h,
    MarketCap,
    /// 24h price change as reported by the source, already in percent
    PriceChangePct,
}

impl MetricField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::Volume => "volume",
            MetricField::Price => "price",
            MetricField::Low24h => "low_24h",
            MetricField::MarketCap => "market_cap",
            MetricField::PriceChangePct => "price_change_pct",
        }
    }
}

/// One symbol as reported by an upstream source in one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRow {
    pub symbol: String,
    pub volume: f64,
    pub price: Option<f64>,
    pub low_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_change_pct: Option<f64>,
}

impl TickerRow {
    pub fn new(symbol: impl Into<String>, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            volume,
            price: None,
            low_24h: None,
            market_cap: None,
            price_change_pct: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_low_24h(mut self, low: f64) -> Self {
        self.low_24h = Some(low);
        self
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    pub fn with_price_change_pct(mut self, change: f64) -> Self {
        self.price_change_pct = Some(change);
        self
    }

    /// Read a field by selector (`None` if the source did not provide it)
    pub fn field(&self, field: MetricField) -> Option<f64> {
        match field {
            MetricField::Volume => Some(self.volume),
            MetricField::Price => self.price,
            MetricField::Low24h => self.low_24h,
            MetricField::MarketCap => self.market_cap,
            MetricField::PriceChangePct => self.price_change_pct,
        }
    }
}

/// Ordered rows fetched from one source during one scan cycle
///
/// Symbols are unique. Pushing a symbol twice keeps the first position and
/// the last values, so iteration order always follows the upstream payload.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub source: String,
    pub captured_at: i64,
    rows: Vec<TickerRow>,
    index: HashMap<String, usize>,
}

impl MarketSnapshot {
    /// Create an empty snapshot (also used as the degraded result of a failed fetch)
    pub fn empty(source: impl Into<String>, captured_at: i64) -> Self {
        Self {
            source: source.into(),
            captured_at,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_rows(
        source: impl Into<String>,
        captured_at: i64,
        rows: impl IntoIterator<Item = TickerRow>,
    ) -> Self {
        let mut snapshot = Self::empty(source, captured_at);
        for row in rows {
            snapshot.push(row);
        }
        snapshot
    }

    /// Add a row. Rows with a negative or non-finite volume are rejected.
    ///
    /// Returns false when the row was rejected.
    pub fn push(&mut self, row: TickerRow) -> bool {
        if !row.volume.is_finite() || row.volume < 0.0 {
            log::debug!(
                "Dropping {} from {}: invalid volume {}",
                row.symbol,
                self.source,
                row.volume
            );
            return false;
        }

        match self.index.get(&row.symbol) {
            Some(&pos) => self.rows[pos] = row,
            None => {
                self.index.insert(row.symbol.clone(), self.rows.len());
                self.rows.push(row);
            }
        }
        true
    }

    pub fn rows(&self) -> &[TickerRow] {
        &self.rows
    }

    pub fn get(&self, symbol: &str) -> Option<&TickerRow> {
        self.index.get(symbol).map(|&pos| &self.rows[pos])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Project the tracked volume of every row into a horizon snapshot
    pub fn metric_snapshot(&self, horizon: Horizon) -> MetricSnapshot {
        MetricSnapshot::new(
            horizon,
            self.captured_at,
            self.rows
                .iter()
                .map(|row| (row.symbol.clone(), row.volume))
                .collect(),
        )
    }
}

/// Immutable symbol -> value mapping tagged with the horizon it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub horizon: Horizon,
    pub captured_at: i64,
    values: HashMap<String, f64>,
}

impl MetricSnapshot {
    pub fn new(horizon: Horizon, captured_at: i64, values: HashMap<String, f64>) -> Self {
        Self {
            horizon,
            captured_at,
            values,
        }
    }

    pub fn empty(horizon: Horizon, captured_at: i64) -> Self {
        Self::new(horizon, captured_at, HashMap::new())
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.values.get(symbol).copied()
    }

    pub fn values(&self) -> &HashMap<String, f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single rule firing
///
/// Baseline rules fill `baseline_value` + `change_percent`.
/// Same-cycle rules fill `reference_value` + `ratio` (ratio / deviation)
/// or only `change_percent` (level rules such as the 24h pump check).
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub symbol: String,
    pub source: String,
    pub rule_kind: RuleKind,
    pub horizon: Option<Horizon>,
    pub current_value: f64,
    pub baseline_value: Option<f64>,
    pub reference_value: Option<f64>,
    pub change_percent: Option<f64>,
    pub ratio: Option<f64>,
    /// Last price, carried for rendering
    pub price: Option<f64>,
}

impl AlertRecord {
    pub fn new(row: &TickerRow, source: &str, rule_kind: RuleKind, current_value: f64) -> Self {
        Self {
            symbol: row.symbol.clone(),
            source: source.to_string(),
            rule_kind,
            horizon: None,
            current_value,
            baseline_value: None,
            reference_value: None,
            change_percent: None,
            ratio: None,
            price: row.price,
        }
    }

    pub fn with_baseline(
        mut self,
        horizon: Horizon,
        baseline_value: f64,
        change_percent: f64,
    ) -> Self {
        self.horizon = Some(horizon);
        self.baseline_value = Some(baseline_value);
        self.change_percent = Some(change_percent);
        self
    }

    pub fn with_ratio(mut self, reference_value: f64, ratio: f64) -> Self {
        self.reference_value = Some(reference_value);
        self.ratio = Some(ratio);
        self
    }

    pub fn with_change_percent(mut self, change_percent: f64) -> Self {
        self.change_percent = Some(change_percent);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_duplicate_symbol_keeps_position_last_value_wins() {
        let snapshot = MarketSnapshot::from_rows(
            "binance",
            100,
            vec![
                TickerRow::new("BTC", 10.0),
                TickerRow::new("ETH", 20.0),
                TickerRow::new("BTC", 30.0),
            ],
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.rows()[0].symbol, "BTC");
        assert_eq!(snapshot.rows()[0].volume, 30.0);
        assert_eq!(snapshot.rows()[1].symbol, "ETH");
    }

    #[test]
    fn test_snapshot_rejects_invalid_volume() {
        let mut snapshot = MarketSnapshot::empty("binance", 100);

        assert!(!snapshot.push(TickerRow::new("NEG", -1.0)));
        assert!(!snapshot.push(TickerRow::new("NAN", f64::NAN)));
        assert!(snapshot.push(TickerRow::new("ZERO", 0.0)));

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("NEG").is_none());
    }

    #[test]
    fn test_metric_snapshot_projection() {
        let snapshot = MarketSnapshot::from_rows(
            "binance",
            1_700_000_000,
            vec![
                TickerRow::new("BTC", 1000.0).with_price(65000.0),
                TickerRow::new("ETH", 500.0),
            ],
        );

        let metrics = snapshot.metric_snapshot(Horizon::H1);

        assert_eq!(metrics.horizon, Horizon::H1);
        assert_eq!(metrics.captured_at, 1_700_000_000);
        assert_eq!(metrics.get("BTC"), Some(1000.0));
        assert_eq!(metrics.get("ETH"), Some(500.0));
        assert_eq!(metrics.get("SOL"), None);
    }

    #[test]
    fn test_field_selector() {
        let row = TickerRow::new("BTC", 1.0)
            .with_price(2.0)
            .with_low_24h(3.0)
            .with_price_change_pct(4.0);

        assert_eq!(row.field(MetricField::Volume), Some(1.0));
        assert_eq!(row.field(MetricField::Price), Some(2.0));
        assert_eq!(row.field(MetricField::Low24h), Some(3.0));
        assert_eq!(row.field(MetricField::MarketCap), None);
        assert_eq!(row.field(MetricField::PriceChangePct), Some(4.0));
    }

    #[test]
    fn test_horizon_labels() {
        assert_eq!(Horizon::Instant.to_string(), "instant");
        assert_eq!(Horizon::H1.as_str(), "1h");
        assert_eq!(serde_json::to_string(&Horizon::H24).unwrap(), "\"24h\"");
    }
}
