//! Scan cycle driver
//!
//! One cycle walks a fixed sequence of states:
//!
//! ```text
//! IDLE -> FETCHING -> EVALUATING -> ROTATING -> NOTIFYING -> SLEEPING -> FETCHING ...
//! ```
//!
//! - FETCHING: every source runs in its own task, bounded by `fetch_timeout`.
//!   A failed, timed out or panicked fetch yields an empty snapshot.
//! - EVALUATING: baselines are loaded per (source, horizon) and rules are
//!   evaluated in declaration order. Current volumes are then written to the
//!   accumulating slot of every horizon.
//! - ROTATING: INSTANT always, H1 / H24 when their scheduler is due. Rotation
//!   happens strictly after evaluation read the pre-rotation baseline.
//! - NOTIFYING: the aggregated batch goes to the notifier (skipped when empty).
//!
//! No per-cycle failure stops the loop. Panics are caught at the cycle
//! boundary and followed by `error_retry_delay` instead of `scan_interval`.

use super::aggregator::{AlertAggregator, AlertBatch};
use super::config::EngineConfig;
use super::evaluator::evaluate;
use super::rules::AlertRule;
use super::scheduler::RotationScheduler;
use super::store::{BaselineBackend, HorizonStore};
use super::types::{Horizon, MarketSnapshot, MetricSnapshot};
use crate::notify::Notifier;
use crate::sources::{FetchError, MarketDataSource};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Evaluating,
    Rotating,
    Notifying,
    Sleeping,
}

/// Timing knobs for the scan loop
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub scan_interval: Duration,
    pub error_retry_delay: Duration,
    pub fetch_timeout: Duration,
    pub h1_rotation_secs: i64,
    pub h24_rotation_secs: i64,
}

impl From<&EngineConfig> for ScanSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            scan_interval: Duration::from_secs(config.scan_interval_secs),
            error_retry_delay: Duration::from_secs(config.error_retry_delay_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            h1_rotation_secs: config.h1_rotation_secs,
            h24_rotation_secs: config.h24_rotation_secs,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Summary of one completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: i64,
    pub sources_ok: Vec<String>,
    pub sources_failed: Vec<String>,
    /// Horizons rotated at the end of this cycle
    pub rotated: Vec<Horizon>,
    pub batch: AlertBatch,
    /// True when the batch was handed to the notifier (successfully or not)
    pub notified: bool,
    pub duration_ms: u128,
}

impl CycleReport {
    pub fn alerts(&self) -> usize {
        self.batch.len()
    }
}

struct FetchOutcome {
    snapshot: MarketSnapshot,
    error: Option<FetchError>,
}

pub struct ScanCycle {
    sources: Vec<Arc<dyn MarketDataSource>>,
    /// (source id, horizon) -> store
    stores: HashMap<(String, Horizon), HorizonStore>,
    rules: Vec<AlertRule>,
    schedulers: Vec<RotationScheduler>,
    notifier: Arc<dyn Notifier>,
    settings: ScanSettings,
    state: CycleState,

    /// Timestamp function (for testing with mock time)
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl ScanCycle {
    pub fn new(
        sources: Vec<Arc<dyn MarketDataSource>>,
        backend: Arc<dyn BaselineBackend>,
        notifier: Arc<dyn Notifier>,
        rules: Vec<AlertRule>,
        settings: ScanSettings,
    ) -> Self {
        Self::new_with_timestamp_fn(
            sources,
            backend,
            notifier,
            rules,
            settings,
            Box::new(|| chrono::Utc::now().timestamp()),
        )
    }

    /// Create a scan cycle with a custom timestamp function
    ///
    /// The schedulers take their start time (T0) from `now_fn` right here.
    pub fn new_with_timestamp_fn(
        sources: Vec<Arc<dyn MarketDataSource>>,
        backend: Arc<dyn BaselineBackend>,
        notifier: Arc<dyn Notifier>,
        rules: Vec<AlertRule>,
        settings: ScanSettings,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        let started_at = now_fn();

        let mut stores = HashMap::new();
        for source in &sources {
            for horizon in Horizon::ALL {
                stores.insert(
                    (source.id().to_string(), horizon),
                    HorizonStore::new(source.id(), horizon, backend.clone()),
                );
            }
        }

        for rule in &rules {
            if !sources.iter().any(|s| s.id() == rule.source) {
                log::warn!(
                    "⚠️  Rule {} reads unknown source '{}', it will never fire",
                    rule.kind,
                    rule.source
                );
            }
            if let Err(e) = rule.validate() {
                log::warn!("⚠️  {}, it will be skipped", e);
            }
        }

        let schedulers = Horizon::ALL
            .iter()
            .map(|&h| {
                RotationScheduler::for_horizon(
                    h,
                    settings.h1_rotation_secs,
                    settings.h24_rotation_secs,
                    started_at,
                )
            })
            .collect();

        log::info!(
            "🧭 Scan cycle ready: {} sources, {} rules, {} baseline backend",
            sources.len(),
            rules.len(),
            backend.backend_type()
        );

        Self {
            sources,
            stores,
            rules,
            schedulers,
            notifier,
            settings,
            state: CycleState::Idle,
            now_fn,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn store(&self, source: &str, horizon: Horizon) -> Option<&HorizonStore> {
        self.stores.get(&(source.to_string(), horizon))
    }

    fn transition(&mut self, next: CycleState) {
        log::debug!("🔁 {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Fetch every source concurrently; failures degrade to empty snapshots
    async fn fetch_all(&self, now: i64) -> Vec<FetchOutcome> {
        let timeout = self.settings.fetch_timeout;

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                tokio::spawn(
                    async move { tokio::time::timeout(timeout, source.fetch_snapshot()).await },
                )
            })
            .collect();

        let results = join_all(handles).await;

        self.sources
            .iter()
            .zip(results)
            .map(|(source, result)| {
                let outcome = match result {
                    Ok(Ok(Ok(snapshot))) => Ok(snapshot),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Err(_elapsed)) => Err(FetchError::Timeout),
                    Err(join_err) => Err(FetchError::TaskFailed(join_err.to_string())),
                };

                match outcome {
                    Ok(mut snapshot) => {
                        // Store namespaces and rule matching key on the source id
                        snapshot.source = source.id().to_string();
                        log::info!("📥 {}: {} symbols", source.id(), snapshot.len());
                        FetchOutcome { snapshot, error: None }
                    }
                    Err(e) => {
                        log::warn!(
                            "⚠️  {} fetch failed: {} (continuing with empty snapshot)",
                            source.id(),
                            e
                        );
                        FetchOutcome {
                            snapshot: MarketSnapshot::empty(source.id(), now),
                            error: Some(e),
                        }
                    }
                }
            })
            .collect()
    }

    async fn load_baselines(
        &self,
        snapshots: &[MarketSnapshot],
        now: i64,
    ) -> HashMap<(String, Horizon), MetricSnapshot> {
        let mut baselines = HashMap::new();

        for snapshot in snapshots {
            for horizon in Horizon::ALL {
                let key = (snapshot.source.clone(), horizon);
                let baseline = match self.stores.get(&key) {
                    Some(store) => match store.load_baseline(now).await {
                        Ok(baseline) => baseline,
                        Err(e) => {
                            log::error!("❌ Failed to load {} baseline: {}", store.namespace(), e);
                            MetricSnapshot::empty(horizon, now)
                        }
                    },
                    None => MetricSnapshot::empty(horizon, now),
                };
                baselines.insert(key, baseline);
            }
        }

        baselines
    }

    async fn accumulate(&self, snapshots: &[MarketSnapshot]) {
        for snapshot in snapshots.iter().filter(|s| !s.is_empty()) {
            for horizon in Horizon::ALL {
                let Some(store) = self.stores.get(&(snapshot.source.clone(), horizon)) else {
                    continue;
                };
                if let Err(e) = store.write_snapshot(&snapshot.metric_snapshot(horizon)).await {
                    log::error!(
                        "❌ Failed to write {} accumulating values: {}",
                        store.namespace(),
                        e
                    );
                }
            }
        }
    }

    async fn rotate_due(&mut self, now: i64) -> Vec<Horizon> {
        let mut rotated = Vec::new();

        for scheduler in self.schedulers.iter_mut() {
            if !scheduler.poll(now) {
                continue;
            }
            let horizon = scheduler.horizon();

            // One store per (source id, horizon), even if sources share an id
            for store in self
                .stores
                .iter()
                .filter(|((_, h), _)| *h == horizon)
                .map(|(_, store)| store)
            {
                if let Err(e) = store.rotate().await {
                    log::error!("❌ Failed to rotate {}: {}", store.namespace(), e);
                }
            }

            if horizon != Horizon::Instant {
                log::info!("🔄 Rotated {} baselines", horizon);
            }
            rotated.push(horizon);
        }

        rotated
    }

    /// Run exactly one cycle (FETCHING through NOTIFYING)
    pub async fn run_once(&mut self) -> CycleReport {
        let cycle_start = Instant::now();
        let now = (self.now_fn)();

        self.transition(CycleState::Fetching);
        let outcomes = self.fetch_all(now).await;

        let mut sources_ok = Vec::new();
        let mut sources_failed = Vec::new();
        let mut snapshots = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.error {
                None => sources_ok.push(outcome.snapshot.source.clone()),
                Some(_) => sources_failed.push(outcome.snapshot.source.clone()),
            }
            snapshots.push(outcome.snapshot);
        }

        self.transition(CycleState::Evaluating);
        let baselines = self.load_baselines(&snapshots, now).await;
        let same_cycle = MetricSnapshot::empty(Horizon::Instant, now);
        let mut aggregator = AlertAggregator::new(&self.rules);

        for rule in &self.rules {
            let Some(snapshot) = snapshots.iter().find(|s| s.source == rule.source) else {
                continue;
            };
            let baseline = match rule.horizon {
                Some(horizon) if rule.formula.reads_baseline() => {
                    match baselines.get(&(snapshot.source.clone(), horizon)) {
                        Some(baseline) => baseline,
                        None => continue,
                    }
                }
                _ => &same_cycle,
            };
            aggregator.extend(evaluate(snapshot, baseline, std::slice::from_ref(rule)));
        }

        self.accumulate(&snapshots).await;

        self.transition(CycleState::Rotating);
        let rotated = self.rotate_due(now).await;

        self.transition(CycleState::Notifying);
        let batch = aggregator.finish(now);
        let notified = if batch.is_empty() {
            log::info!("💤 No new alerts");
            false
        } else {
            match self.notifier.deliver(&batch).await {
                Ok(report) => {
                    log::info!(
                        "📣 {} alerts delivered via {} ({} parts, {} sends)",
                        batch.len(),
                        self.notifier.name(),
                        report.parts,
                        report.sent
                    );
                }
                Err(e) => {
                    log::error!("❌ Alert delivery via {} failed: {}", self.notifier.name(), e);
                }
            }
            true
        };

        CycleReport {
            started_at: now,
            sources_ok,
            sources_failed,
            rotated,
            batch,
            notified,
            duration_ms: cycle_start.elapsed().as_millis(),
        }
    }

    /// Run one cycle, converting a panic anywhere inside it into an error
    pub async fn run_cycle_guarded(&mut self) -> Result<CycleReport, String> {
        let result = AssertUnwindSafe(self.run_once()).catch_unwind().await;

        result.map_err(|payload| {
            self.state = CycleState::Idle;
            panic_message(payload.as_ref())
        })
    }

    /// Scan forever: cycle, sleep `scan_interval`, repeat
    ///
    /// A panicked cycle is followed by `error_retry_delay`. This function only
    /// returns when the surrounding task is cancelled.
    pub async fn run_forever(&mut self) {
        log::info!(
            "🚀 Starting scan loop (interval: {:?}, retry delay: {:?})",
            self.settings.scan_interval,
            self.settings.error_retry_delay
        );

        loop {
            let delay = match self.run_cycle_guarded().await {
                Ok(report) => {
                    log::info!(
                        "✅ Cycle done in {}ms: {} alerts, {} ok / {} failed sources, rotated {:?}",
                        report.duration_ms,
                        report.alerts(),
                        report.sources_ok.len(),
                        report.sources_failed.len(),
                        report.rotated
                    );
                    self.settings.scan_interval
                }
                Err(msg) => {
                    log::error!(
                        "💥 Scan cycle panicked: {} (retrying in {:?})",
                        msg,
                        self.settings.error_retry_delay
                    );
                    self.settings.error_retry_delay
                }
            };

            self.transition(CycleState::Sleeping);
            tokio::time::sleep(delay).await;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
