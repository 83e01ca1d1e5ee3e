//! Threshold evaluation
//!
//! `evaluate` is a pure function: current snapshot + baseline snapshot + rules
//! in, alert records out. Nothing here touches storage or the clock.
//!
//! Output order is rule-declaration order first, snapshot row order second.
//! Renderers depend on that order, so it must stay deterministic.

use super::rules::{AlertRule, RuleFormula};
use super::types::{AlertRecord, MarketSnapshot, MetricField, MetricSnapshot, TickerRow};
use std::fmt;

/// Rule could not be applied to one row (the rule is skipped for that symbol only)
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    MissingField { symbol: String, field: MetricField },
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::MissingField { symbol, field } => {
                write!(f, "{} has no {} value", symbol, field.as_str())
            }
        }
    }
}

impl std::error::Error for EvaluationError {}

/// Evaluate `rules` against one source snapshot and one horizon baseline
///
/// - Rules for another source are ignored.
/// - Baseline rules are only applied when their horizon matches `baseline.horizon`.
/// - Same-cycle rules (ratio / deviation / level) ignore the baseline entirely.
pub fn evaluate(
    current: &MarketSnapshot,
    baseline: &MetricSnapshot,
    rules: &[AlertRule],
) -> Vec<AlertRecord> {
    let mut records = Vec::new();

    for rule in rules.iter().filter(|r| r.source == current.source) {
        if rule.formula.reads_baseline() && rule.horizon != Some(baseline.horizon) {
            continue;
        }

        for row in current.rows() {
            match evaluate_row(rule, row, &current.source, baseline) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    log::debug!("⚠️  Skipping {} for {}: {}", rule.kind, current.source, e);
                }
            }
        }
    }

    records
}

/// Apply one rule to one row
///
/// Returns `Ok(None)` when the rule does not fire or is not applicable
/// (no baseline, non-positive denominator).
pub fn evaluate_row(
    rule: &AlertRule,
    row: &TickerRow,
    source: &str,
    baseline: &MetricSnapshot,
) -> Result<Option<AlertRecord>, EvaluationError> {
    let read = |field: MetricField| {
        row.field(field).ok_or_else(|| EvaluationError::MissingField {
            symbol: row.symbol.clone(),
            field,
        })
    };

    let record = match rule.formula {
        RuleFormula::BaselineChange { field } => {
            // Baselines hold volume only
            if field != MetricField::Volume {
                return Ok(None);
            }

            // First observation of a symbol cannot produce a delta
            let previous = match baseline.get(&row.symbol) {
                Some(previous) => previous,
                None => return Ok(None),
            };
            if previous <= 0.0 {
                return Ok(None);
            }

            let current = read(field)?;
            let change = (current - previous) / previous * 100.0;
            fires(rule, change).then(|| {
                AlertRecord::new(row, source, rule.kind, current).with_baseline(
                    baseline.horizon,
                    previous,
                    change,
                )
            })
        }
        RuleFormula::Ratio {
            numerator,
            denominator,
        } => {
            let value = read(numerator)?;
            let reference = read(denominator)?;
            if reference <= 0.0 {
                return Ok(None);
            }

            let ratio = value / reference * 100.0;
            fires(rule, ratio).then(|| {
                AlertRecord::new(row, source, rule.kind, value).with_ratio(reference, ratio)
            })
        }
        RuleFormula::Deviation { field, reference } => {
            let value = read(field)?;
            let reference = read(reference)?;
            if reference <= 0.0 {
                return Ok(None);
            }

            let deviation = (value - reference) / reference * 100.0;
            fires(rule, deviation).then(|| {
                AlertRecord::new(row, source, rule.kind, value).with_ratio(reference, deviation)
            })
        }
        RuleFormula::Level { field } => {
            let value = read(field)?;
            fires(rule, value).then(|| {
                AlertRecord::new(row, source, rule.kind, value).with_change_percent(value)
            })
        }
    };

    Ok(record)
}

fn fires(rule: &AlertRule, measure: f64) -> bool {
    measure.is_finite() && rule.direction.satisfied(measure, rule.threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rules::{default_rules, Direction, RuleKind};
    use crate::pipeline::types::Horizon;
    use std::collections::HashMap;

    fn baseline(horizon: Horizon, values: &[(&str, f64)]) -> MetricSnapshot {
        MetricSnapshot::new(
            horizon,
            0,
            values
                .iter()
                .map(|(s, v)| (s.to_string(), *v))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn volumes(source: &str, values: &[(&str, f64)]) -> MarketSnapshot {
        MarketSnapshot::from_rows(
            source,
            1_000,
            values.iter().map(|(s, v)| TickerRow::new(*s, *v)),
        )
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_delta_fires_at_threshold() {
        let rule =
            AlertRule::volume_change(RuleKind::VolumeSpike, "binance", Horizon::Instant, 5.0);
        let current = volumes("binance", &[("BTC", 105.0)]);
        let base = baseline(Horizon::Instant, &[("BTC", 100.0)]);

        let records = evaluate(&current, &base, &[rule]);

        assert_eq!(records.len(), 1);
        assert_close(records[0].change_percent.unwrap(), 5.0);
        assert_eq!(records[0].baseline_value, Some(100.0));
        assert_eq!(records[0].current_value, 105.0);
        assert_eq!(records[0].horizon, Some(Horizon::Instant));
    }

    #[test]
    fn test_zero_baseline_never_fires() {
        let rule =
            AlertRule::volume_change(RuleKind::VolumeSpike, "binance", Horizon::Instant, 5.0);
        let current = volumes("binance", &[("BTC", 1_000_000.0)]);
        let base = baseline(Horizon::Instant, &[("BTC", 0.0)]);

        assert!(evaluate(&current, &base, &[rule]).is_empty());
    }

    #[test]
    fn test_missing_baseline_never_fires() {
        let rules = vec![
            AlertRule::volume_change(RuleKind::Inflow, "binance", Horizon::Instant, -100.0),
            AlertRule::volume_change(RuleKind::VolumeSpike, "binance", Horizon::Instant, 0.0),
        ];
        let current = volumes("binance", &[("NEW", 10.0), ("OLD", 10.0)]);
        let base = baseline(Horizon::Instant, &[("OLD", 10.0)]);

        let records = evaluate(&current, &base, &rules);

        assert!(records.iter().all(|r| r.symbol == "OLD"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_price_baseline_change_never_fires() {
        let mut rule =
            AlertRule::volume_change(RuleKind::VolumeSpike, "binance", Horizon::Instant, 5.0);
        rule.formula = RuleFormula::BaselineChange {
            field: MetricField::Price,
        };
        let current = MarketSnapshot::from_rows(
            "binance",
            1_000,
            [TickerRow::new("BTC", 1000.0).with_price(2000.0)],
        );
        let base = baseline(Horizon::Instant, &[("BTC", 1000.0)]);

        assert!(evaluate(&current, &base, &[rule]).is_empty());
    }

    #[test]
    fn test_end_to_end_volume_increase() {
        let rule =
            AlertRule::volume_change(RuleKind::VolumeIncrease1h, "binance", Horizon::H1, 10.0);
        let current = volumes("binance", &[("BTC", 1200.0), ("ETH", 500.0)]);
        let base = baseline(Horizon::H1, &[("BTC", 1000.0)]);

        let records = evaluate(&current, &base, &[rule]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "BTC");
        assert_close(records[0].change_percent.unwrap(), 20.0);
    }

    #[test]
    fn test_horizon_mismatch_is_ignored() {
        let rule =
            AlertRule::volume_change(RuleKind::VolumeIncrease24h, "binance", Horizon::H24, 1.0);
        let current = volumes("binance", &[("BTC", 1200.0)]);
        let base = baseline(Horizon::H1, &[("BTC", 1000.0)]);

        assert!(evaluate(&current, &base, &[rule]).is_empty());
    }

    #[test]
    fn test_other_source_rules_ignored() {
        let rule = AlertRule::volume_change(RuleKind::Inflow, "coingecko", Horizon::Instant, 1.0);
        let current = volumes("binance", &[("BTC", 1200.0)]);
        let base = baseline(Horizon::Instant, &[("BTC", 1000.0)]);

        assert!(evaluate(&current, &base, &[rule]).is_empty());
    }

    #[test]
    fn test_ratio_rule_guards_denominator() {
        let rule = AlertRule::new(
            RuleKind::VolumeMarketCap,
            "coingecko",
            RuleFormula::Ratio {
                numerator: MetricField::Volume,
                denominator: MetricField::MarketCap,
            },
            Direction::AtLeast,
            20.0,
        );
        let current = MarketSnapshot::from_rows(
            "coingecko",
            1_000,
            vec![
                TickerRow::new("HOT", 30.0).with_market_cap(100.0),
                TickerRow::new("COLD", 10.0).with_market_cap(100.0),
                TickerRow::new("ZERO", 10.0).with_market_cap(0.0),
                TickerRow::new("NEG", 10.0).with_market_cap(-5.0),
                TickerRow::new("NONE", 10.0),
            ],
        );

        let records = evaluate(&current, &MetricSnapshot::empty(Horizon::Instant, 0), &[rule]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "HOT");
        assert_close(records[0].ratio.unwrap(), 30.0);
        assert_eq!(records[0].reference_value, Some(100.0));
    }

    #[test]
    fn test_support_zone_deviation() {
        let rule = AlertRule::new(
            RuleKind::SupportZone,
            "binance",
            RuleFormula::Deviation {
                field: MetricField::Price,
                reference: MetricField::Low24h,
            },
            Direction::AtMost,
            2.0,
        );
        let current = MarketSnapshot::from_rows(
            "binance",
            1_000,
            vec![
                TickerRow::new("NEAR", 1.0).with_price(101.0).with_low_24h(100.0),
                TickerRow::new("FAR", 1.0).with_price(110.0).with_low_24h(100.0),
                TickerRow::new("NOLOW", 1.0).with_price(110.0).with_low_24h(0.0),
            ],
        );

        let records = evaluate(&current, &MetricSnapshot::empty(Horizon::Instant, 0), &[rule]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "NEAR");
        assert_close(records[0].ratio.unwrap(), 1.0);
        assert_eq!(records[0].price, Some(101.0));
    }

    #[test]
    fn test_level_rule_missing_field_skips_symbol_only() {
        let rule = AlertRule::new(
            RuleKind::Pump,
            "binance",
            RuleFormula::Level {
                field: MetricField::PriceChangePct,
            },
            Direction::AtLeast,
            20.0,
        );
        let current = MarketSnapshot::from_rows(
            "binance",
            1_000,
            vec![
                TickerRow::new("MISSING", 1.0),
                TickerRow::new("PUMP", 1.0).with_price_change_pct(25.0),
            ],
        );

        let records = evaluate(&current, &MetricSnapshot::empty(Horizon::Instant, 0), &[rule]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "PUMP");
        assert_eq!(records[0].change_percent, Some(25.0));
    }

    #[test]
    fn test_multiple_rules_fire_for_same_symbol_in_rule_order() {
        let rules = vec![
            AlertRule::volume_change(RuleKind::Inflow, "binance", Horizon::Instant, 1.0),
            AlertRule::volume_change(RuleKind::VolumeSpike, "binance", Horizon::Instant, 5.0),
        ];
        let current = volumes("binance", &[("AAA", 120.0), ("BBB", 103.0)]);
        let base = baseline(Horizon::Instant, &[("AAA", 100.0), ("BBB", 100.0)]);

        let records = evaluate(&current, &base, &rules);
        let order: Vec<_> = records.iter().map(|r| (r.rule_kind, r.symbol.as_str())).collect();

        assert_eq!(
            order,
            vec![
                (RuleKind::Inflow, "AAA"),
                (RuleKind::Inflow, "BBB"),
                (RuleKind::VolumeSpike, "AAA"),
            ]
        );
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let rules: Vec<_> = default_rules()
            .into_iter()
            .filter(|r| r.horizon == Some(Horizon::Instant) || r.horizon.is_none())
            .collect();
        let current = MarketSnapshot::from_rows(
            "binance",
            1_000,
            (0..50).map(|i| {
                TickerRow::new(format!("SYM{}", i), 100.0 + i as f64)
                    .with_price(10.0 + i as f64 * 0.01)
                    .with_low_24h(10.0)
                    .with_price_change_pct(i as f64)
            }),
        );
        let base = MetricSnapshot::new(
            Horizon::Instant,
            0,
            (0..50).map(|i| (format!("SYM{}", i), 100.0)).collect(),
        );

        let first = evaluate(&current, &base, &rules);
        let second = evaluate(&current, &base, &rules);

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
