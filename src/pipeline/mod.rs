//! # Volume Alert Pipeline
//!
//! Periodic scan engine that compares market volumes against rolling
//! baselines and raises threshold alerts.
//!
//! ## Architecture
//!
//! ```text
//! MarketDataSource::fetch_snapshot()      (one task per source, bounded by a timeout)
//!     ↓
//! MarketSnapshot                          (rows in upstream order)
//!     ↓
//! HorizonStore::load_baseline()           (INSTANT / 1h / 24h, per source)
//!     ↓
//! evaluator::evaluate()                   (pure: snapshot + baseline + rules)
//!     ↓
//! AlertAggregator -> AlertBatch           (sections in rule-declaration order)
//!     ↓
//! RotationScheduler::poll() -> HorizonStore::rotate()
//!     ↓
//! Notifier::deliver()
//! ```
//!
//! **Key Principle:** a baseline is only ever replaced by rotation, and
//! rotation always happens after the cycle's evaluation read it.
//!
//! ## Schema Reference
//!
//! Persistent baselines live in `/sql/00_horizon_baselines.sql`:
//! - `horizon_baselines` → `HorizonStore` (both slots, all namespaces)
//!
//! ## Module Organization
//!
//! - `types` - Horizons, snapshots and alert records
//! - `rules` - Data-driven alert rules and the default rule set
//! - `evaluator` - Threshold evaluation (pure)
//! - `aggregator` - Per-cycle alert batch
//! - `store` - Double-buffered baselines and the backend trait
//! - `db` - SQLite backend and schema migrations
//! - `scheduler` - Per-horizon rotation gating
//! - `cycle` - The scan loop state machine
//! - `config` - Environment configuration

pub mod aggregator;
pub mod config;
pub mod cycle;
pub mod db;
pub mod evaluator;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use aggregator::{AlertAggregator, AlertBatch, AlertSection};
pub use config::{ConfigError, EngineConfig};
pub use cycle::{CycleReport, CycleState, ScanCycle, ScanSettings};
pub use db::SqliteBaselineBackend;
pub use evaluator::{evaluate, EvaluationError};
pub use rules::{default_rules, AlertRule, Direction, RuleFormula, RuleKind};
pub use scheduler::{RotationPolicy, RotationScheduler};
pub use store::{BaselineBackend, HorizonStore, InMemoryBaselineBackend, PersistenceError};
pub use types::{AlertRecord, Horizon, MarketSnapshot, MetricField, MetricSnapshot, TickerRow};
