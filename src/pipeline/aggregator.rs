//! Alert aggregation for one scan cycle
//!
//! Collects evaluator outputs from every (source, horizon, rule) pass into a
//! single batch grouped by rule family. Families appear in rule-declaration
//! order; records inside a family keep the order they were produced in.
//! Nothing is deduplicated or re-sorted.

use super::rules::{AlertRule, RuleKind};
use super::types::AlertRecord;

/// All records of one rule family
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSection {
    pub kind: RuleKind,
    pub records: Vec<AlertRecord>,
}

/// Ordered alert batch handed to the notifier once per cycle
#[derive(Debug, Clone, PartialEq)]
pub struct AlertBatch {
    pub captured_at: i64,
    pub sections: Vec<AlertSection>,
}

impl AlertBatch {
    /// True when no rule fired (sections may still exist, all empty)
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.records.is_empty())
    }

    /// Total number of records across all sections
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    pub fn section(&self, kind: RuleKind) -> Option<&AlertSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Records in presentation order
    pub fn records(&self) -> impl Iterator<Item = &AlertRecord> {
        self.sections.iter().flat_map(|s| s.records.iter())
    }
}

pub struct AlertAggregator {
    sections: Vec<AlertSection>,
}

impl AlertAggregator {
    /// Create one empty section per distinct rule family, in declaration order
    pub fn new(rules: &[AlertRule]) -> Self {
        let mut sections: Vec<AlertSection> = Vec::new();
        for rule in rules {
            if !sections.iter().any(|s| s.kind == rule.kind) {
                sections.push(AlertSection {
                    kind: rule.kind,
                    records: Vec::new(),
                });
            }
        }
        Self { sections }
    }

    /// Append records to their family sections, preserving arrival order
    pub fn extend(&mut self, records: impl IntoIterator<Item = AlertRecord>) {
        for record in records {
            match self.sections.iter_mut().find(|s| s.kind == record.rule_kind) {
                Some(section) => section.records.push(record),
                None => self.sections.push(AlertSection {
                    kind: record.rule_kind,
                    records: vec![record],
                }),
            }
        }
    }

    pub fn finish(self, captured_at: i64) -> AlertBatch {
        AlertBatch {
            captured_at,
            sections: self.sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rules::default_rules;
    use crate::pipeline::types::TickerRow;

    fn record(symbol: &str, source: &str, kind: RuleKind) -> AlertRecord {
        AlertRecord::new(&TickerRow::new(symbol, 1.0), source, kind, 1.0)
    }

    #[test]
    fn test_empty_batch_is_valid() {
        let batch = AlertAggregator::new(&default_rules()).finish(42);

        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.captured_at, 42);
        // 8 rules, 7 distinct families (SUPPORT_ZONE appears twice)
        assert_eq!(batch.sections.len(), 7);
    }

    #[test]
    fn test_sections_follow_declaration_order() {
        let batch = AlertAggregator::new(&default_rules()).finish(0);
        let kinds: Vec<_> = batch.sections.iter().map(|s| s.kind).collect();

        assert_eq!(
            kinds,
            vec![
                RuleKind::VolumeMarketCap,
                RuleKind::SupportZone,
                RuleKind::Pump,
                RuleKind::Inflow,
                RuleKind::VolumeSpike,
                RuleKind::VolumeIncrease1h,
                RuleKind::VolumeIncrease24h,
            ]
        );
    }

    #[test]
    fn test_records_grouped_without_resorting() {
        let mut aggregator = AlertAggregator::new(&default_rules());

        aggregator.extend(vec![
            record("ZZZ", "coingecko", RuleKind::SupportZone),
            record("BTC", "binance", RuleKind::Pump),
        ]);
        aggregator.extend(vec![
            record("AAA", "binance", RuleKind::SupportZone),
            record("ZZZ", "binance", RuleKind::SupportZone),
        ]);

        let batch = aggregator.finish(0);
        let support = batch.section(RuleKind::SupportZone).unwrap();
        let symbols: Vec<_> = support.records.iter().map(|r| r.symbol.as_str()).collect();

        // No dedup: ZZZ appears once per source
        assert_eq!(symbols, vec!["ZZZ", "AAA", "ZZZ"]);
        assert_eq!(batch.len(), 4);

        let order: Vec<_> = batch.records().map(|r| r.rule_kind).collect();
        assert_eq!(
            order,
            vec![
                RuleKind::SupportZone,
                RuleKind::SupportZone,
                RuleKind::SupportZone,
                RuleKind::Pump
            ]
        );
    }

    #[test]
    fn test_undeclared_family_is_appended() {
        let mut aggregator = AlertAggregator::new(&[]);
        aggregator.extend(vec![record("BTC", "binance", RuleKind::Inflow)]);

        let batch = aggregator.finish(0);
        assert_eq!(batch.sections.len(), 1);
        assert_eq!(batch.sections[0].kind, RuleKind::Inflow);
    }
}
