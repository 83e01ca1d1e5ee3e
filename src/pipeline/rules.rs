//! Alert rule definitions
//!
//! Every alert family is one data-driven `AlertRule`. Adding a rule is a
//! configuration change: either edit `default_rules()` or point
//! `VOLWATCH_RULES_PATH` at a JSON file holding a list of rules.
//!
//! Thresholds are always percentages. Ratios are converted to percent once
//! inside the evaluator, never in configuration.
//!
//! Example rules file:
//!
//! ```json
//! [
//!   {
//!     "kind": "VOLUME_SPIKE",
//!     "source": "binance",
//!     "formula": { "type": "baseline_change", "field": "volume" },
//!     "threshold": 5.0,
//!     "direction": "at_least",
//!     "horizon": "instant"
//!   }
//! ]
//! ```

use super::config::ConfigError;
use super::types::{Horizon, MetricField};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

/// Rule family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    /// Volume relative to market capitalization
    VolumeMarketCap,
    /// Price close to the 24h low
    SupportZone,
    /// Large 24h price change
    Pump,
    /// Volume inflow since the previous scan
    Inflow,
    /// Volume spike since the previous scan
    VolumeSpike,
    /// Volume increase over the 1h horizon
    #[serde(rename = "VOLUME_INCREASE_1H")]
    VolumeIncrease1h,
    /// Volume increase over the 24h horizon
    #[serde(rename = "VOLUME_INCREASE_24H")]
    VolumeIncrease24h,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::VolumeMarketCap => "VOLUME_MARKET_CAP",
            RuleKind::SupportZone => "SUPPORT_ZONE",
            RuleKind::Pump => "PUMP",
            RuleKind::Inflow => "INFLOW",
            RuleKind::VolumeSpike => "VOLUME_SPIKE",
            RuleKind::VolumeIncrease1h => "VOLUME_INCREASE_1H",
            RuleKind::VolumeIncrease24h => "VOLUME_INCREASE_24H",
        }
    }

    /// Section title used when rendering a batch
    pub fn title(&self) -> &'static str {
        match self {
            RuleKind::VolumeMarketCap => "VOLUME ALERTS (V/MCAP)",
            RuleKind::SupportZone => "SUPPORT ZONE (price near 24h low)",
            RuleKind::Pump => "PUMP ALERTS (24h change)",
            RuleKind::Inflow => "INFLOW ALERTS",
            RuleKind::VolumeSpike => "VOLUME SPIKE",
            RuleKind::VolumeIncrease1h => "1h VOLUME INCREASE",
            RuleKind::VolumeIncrease24h => "24h VOLUME INCREASE",
        }
    }

    /// Families that are reported as "no coins found" when nothing fired
    pub fn reports_empty(&self) -> bool {
        matches!(self, RuleKind::VolumeIncrease1h | RuleKind::VolumeIncrease24h)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison direction applied to the computed measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// measure >= threshold
    AtLeast,
    /// measure <= threshold
    AtMost,
}

impl Direction {
    pub fn satisfied(&self, measure: f64, threshold: f64) -> bool {
        match self {
            Direction::AtLeast => measure >= threshold,
            Direction::AtMost => measure <= threshold,
        }
    }
}

/// How a rule turns a ticker row into a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleFormula {
    /// `(current / baseline - 1) * 100` against the horizon baseline
    BaselineChange { field: MetricField },
    /// `numerator / denominator * 100` within the same row
    Ratio {
        numerator: MetricField,
        denominator: MetricField,
    },
    /// `(field / reference - 1) * 100` within the same row
    Deviation {
        field: MetricField,
        reference: MetricField,
    },
    /// Raw field value (already a percentage upstream)
    Level { field: MetricField },
}

impl RuleFormula {
    pub fn reads_baseline(&self) -> bool {
        matches!(self, RuleFormula::BaselineChange { .. })
    }
}

/// Immutable, named comparison loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub kind: RuleKind,
    /// Source id whose snapshot this rule reads
    pub source: String,
    pub formula: RuleFormula,
    /// Threshold in percent
    pub threshold: f64,
    pub direction: Direction,
    /// Horizon whose baseline is read (baseline rules only)
    #[serde(default)]
    pub horizon: Option<Horizon>,
}

impl AlertRule {
    pub fn new(
        kind: RuleKind,
        source: impl Into<String>,
        formula: RuleFormula,
        direction: Direction,
        threshold: f64,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            formula,
            threshold,
            direction,
            horizon: None,
        }
    }

    /// Baseline-relative volume rule: fires when the change is >= `threshold_pct`
    pub fn volume_change(
        kind: RuleKind,
        source: impl Into<String>,
        horizon: Horizon,
        threshold_pct: f64,
    ) -> Self {
        Self::new(
            kind,
            source,
            RuleFormula::BaselineChange {
                field: MetricField::Volume,
            },
            Direction::AtLeast,
            threshold_pct,
        )
        .on_horizon(horizon)
    }

    pub fn on_horizon(mut self, horizon: Horizon) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidValue(format!(
                "rule {} ({}) has a non-finite threshold",
                self.kind, self.source
            )));
        }

        if self.source.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "rule {} has an empty source",
                self.kind
            )));
        }

        // Horizon stores only accumulate volume
        if let RuleFormula::BaselineChange { field } = self.formula {
            if field != MetricField::Volume {
                return Err(ConfigError::InvalidValue(format!(
                    "rule {} ({}) compares {} against a baseline, only volume has baselines",
                    self.kind,
                    self.source,
                    field.as_str()
                )));
            }
        }

        match (self.formula.reads_baseline(), self.horizon) {
            (true, None) => Err(ConfigError::InvalidValue(format!(
                "rule {} ({}) compares against a baseline but names no horizon",
                self.kind, self.source
            ))),
            (false, Some(horizon)) => Err(ConfigError::InvalidValue(format!(
                "rule {} ({}) is evaluated within the cycle but names horizon {}",
                self.kind, self.source, horizon
            ))),
            _ => Ok(()),
        }
    }
}

/// Validate a whole rule set (an empty set is a startup error)
pub fn validate_rules(rules: &[AlertRule]) -> Result<(), ConfigError> {
    if rules.is_empty() {
        return Err(ConfigError::InvalidValue("no alert rules configured".to_string()));
    }
    rules.iter().try_for_each(AlertRule::validate)
}

/// Built-in rule set
///
/// | # | Family              | Source    | Measure                        | Fires when |
/// |---|---------------------|-----------|--------------------------------|------------|
/// | 1 | VOLUME_MARKET_CAP   | coingecko | volume / market cap            | >= 20%     |
/// | 2 | SUPPORT_ZONE        | coingecko | price vs 24h low               | <= 2%      |
/// | 3 | PUMP                | binance   | 24h price change               | >= 20%     |
/// | 4 | SUPPORT_ZONE        | binance   | price vs 24h low               | <= 2%      |
/// | 5 | INFLOW              | binance   | volume vs previous scan        | >= 1%      |
/// | 6 | VOLUME_SPIKE        | binance   | volume vs previous scan        | >= 5%      |
/// | 7 | VOLUME_INCREASE_1H  | binance   | volume vs 1h baseline          | >= 2%      |
/// | 8 | VOLUME_INCREASE_24H | binance   | volume vs 24h baseline         | >= 50%     |
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            RuleKind::VolumeMarketCap,
            "coingecko",
            RuleFormula::Ratio {
                numerator: MetricField::Volume,
                denominator: MetricField::MarketCap,
            },
            Direction::AtLeast,
            20.0,
        ),
        AlertRule::new(
            RuleKind::SupportZone,
            "coingecko",
            RuleFormula::Deviation {
                field: MetricField::Price,
                reference: MetricField::Low24h,
            },
            Direction::AtMost,
            2.0,
        ),
        AlertRule::new(
            RuleKind::Pump,
            "binance",
            RuleFormula::Level {
                field: MetricField::PriceChangePct,
            },
            Direction::AtLeast,
            20.0,
        ),
        AlertRule::new(
            RuleKind::SupportZone,
            "binance",
            RuleFormula::Deviation {
                field: MetricField::Price,
                reference: MetricField::Low24h,
            },
            Direction::AtMost,
            2.0,
        ),
        AlertRule::volume_change(RuleKind::Inflow, "binance", Horizon::Instant, 1.0),
        AlertRule::volume_change(RuleKind::VolumeSpike, "binance", Horizon::Instant, 5.0),
        AlertRule::volume_change(RuleKind::VolumeIncrease1h, "binance", Horizon::H1, 2.0),
        AlertRule::volume_change(RuleKind::VolumeIncrease24h, "binance", Horizon::H24, 50.0),
    ]
}

/// Load a rule set from a JSON file
pub fn load_rules_file(path: &str) -> Result<Vec<AlertRule>, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::InvalidValue(format!("cannot read rules file {}: {}", path, e)))?;
    parse_rules(&content)
        .map_err(|e| ConfigError::InvalidValue(format!("invalid rules file {}: {}", path, e)))
}

pub fn parse_rules(json: &str) -> Result<Vec<AlertRule>, serde_json::Error> {
    serde_json::from_str(json)
}
