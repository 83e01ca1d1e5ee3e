//! Double-buffered horizon baselines
//!
//! Each (source, horizon) pair owns two slots:
//! - `baseline` - the comparison reference, the only slot readers see
//! - `accumulating` - values written during the in-progress cycle
//!
//! `rotate()` promotes accumulating -> baseline and clears accumulating in one
//! atomic step. Rotating with nothing accumulated leaves an empty baseline,
//! which is how a horizon is reset.
//!
//! Storage is pluggable through `BaselineBackend`:
//! - `InMemoryBaselineBackend` (this module)
//! - `SqliteBaselineBackend` (see `db.rs`)

use super::types::{Horizon, MetricSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum PersistenceError {
    Database(String),
    /// A lock around the backend state was poisoned by a panicking writer
    Poisoned,
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Database(e) => write!(f, "Database error: {}", e),
            PersistenceError::Poisoned => write!(f, "Baseline state lock poisoned"),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Storage substrate for baseline/accumulating pairs
///
/// `namespace` identifies one (source, horizon) pair, e.g. `binance/1h`.
#[async_trait]
pub trait BaselineBackend: Send + Sync {
    /// Read one symbol from the baseline slot
    async fn read_baseline(
        &self,
        namespace: &str,
        symbol: &str,
    ) -> Result<Option<f64>, PersistenceError>;

    /// Read the whole baseline slot
    async fn load_baseline(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, f64>, PersistenceError>;

    /// Upsert values into the accumulating slot (last write per symbol wins)
    async fn write_accumulating(
        &self,
        namespace: &str,
        entries: &[(String, f64)],
    ) -> Result<(), PersistenceError>;

    /// Promote accumulating -> baseline and clear accumulating, atomically
    async fn rotate(&self, namespace: &str) -> Result<(), PersistenceError>;

    /// Backend type for logging
    fn backend_type(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct BaselineSlots {
    baseline: HashMap<String, f64>,
    accumulating: HashMap<String, f64>,
}

/// In-memory backend (state is lost on restart)
#[derive(Debug, Default)]
pub struct InMemoryBaselineBackend {
    slots: Mutex<HashMap<String, BaselineSlots>>,
}

impl InMemoryBaselineBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineBackend for InMemoryBaselineBackend {
    async fn read_baseline(
        &self,
        namespace: &str,
        symbol: &str,
    ) -> Result<Option<f64>, PersistenceError> {
        let slots = self.slots.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(slots
            .get(namespace)
            .and_then(|s| s.baseline.get(symbol))
            .copied())
    }

    async fn load_baseline(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, f64>, PersistenceError> {
        let slots = self.slots.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(slots
            .get(namespace)
            .map(|s| s.baseline.clone())
            .unwrap_or_default())
    }

    async fn write_accumulating(
        &self,
        namespace: &str,
        entries: &[(String, f64)],
    ) -> Result<(), PersistenceError> {
        let mut slots = self.slots.lock().map_err(|_| PersistenceError::Poisoned)?;
        let slot = slots.entry(namespace.to_string()).or_default();
        for (symbol, value) in entries {
            slot.accumulating.insert(symbol.clone(), *value);
        }
        Ok(())
    }

    async fn rotate(&self, namespace: &str) -> Result<(), PersistenceError> {
        let mut slots = self.slots.lock().map_err(|_| PersistenceError::Poisoned)?;
        let slot = slots.entry(namespace.to_string()).or_default();
        slot.baseline = std::mem::take(&mut slot.accumulating);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "in-memory"
    }
}

/// Baseline store for one (source, horizon) pair
#[derive(Clone)]
pub struct HorizonStore {
    source: String,
    horizon: Horizon,
    namespace: String,
    backend: Arc<dyn BaselineBackend>,
}

impl HorizonStore {
    pub fn new(
        source: impl Into<String>,
        horizon: Horizon,
        backend: Arc<dyn BaselineBackend>,
    ) -> Self {
        let source = source.into();
        let namespace = format!("{}/{}", source, horizon.as_str());
        Self {
            source,
            horizon,
            namespace,
            backend,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Previous value for `symbol`, `None` when the horizon has no baseline for it
    pub async fn read_baseline(&self, symbol: &str) -> Result<Option<f64>, PersistenceError> {
        self.backend.read_baseline(&self.namespace, symbol).await
    }

    /// Whole baseline as a horizon snapshot (stamped with `read_at`)
    pub async fn load_baseline(&self, read_at: i64) -> Result<MetricSnapshot, PersistenceError> {
        let values = self.backend.load_baseline(&self.namespace).await?;
        Ok(MetricSnapshot::new(self.horizon, read_at, values))
    }

    pub async fn write_accumulating(
        &self,
        symbol: &str,
        value: f64,
    ) -> Result<(), PersistenceError> {
        self.backend
            .write_accumulating(&self.namespace, &[(symbol.to_string(), value)])
            .await
    }

    /// Write every value of `snapshot` into the accumulating slot
    pub async fn write_snapshot(&self, snapshot: &MetricSnapshot) -> Result<(), PersistenceError> {
        if snapshot.is_empty() {
            return Ok(());
        }
        let entries: Vec<(String, f64)> = snapshot
            .values()
            .iter()
            .map(|(symbol, value)| (symbol.clone(), *value))
            .collect();
        self.backend.write_accumulating(&self.namespace, &entries).await
    }

    pub async fn rotate(&self) -> Result<(), PersistenceError> {
        self.backend.rotate(&self.namespace).await?;
        log::debug!("🔄 Rotated {} ({})", self.namespace, self.backend.backend_type());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(horizon: Horizon) -> HorizonStore {
        HorizonStore::new("binance", horizon, Arc::new(InMemoryBaselineBackend::new()))
    }

    #[tokio::test]
    async fn test_fresh_store_has_no_baseline() {
        let store = store(Horizon::H1);

        assert_eq!(store.read_baseline("BTC").await.unwrap(), None);
        assert!(store.load_baseline(0).await.unwrap().is_empty());
        assert_eq!(store.namespace(), "binance/1h");
    }

    #[tokio::test]
    async fn test_accumulating_is_invisible_until_rotation() {
        let store = store(Horizon::Instant);

        store.write_accumulating("BTC", 100.0).await.unwrap();
        assert_eq!(store.read_baseline("BTC").await.unwrap(), None);

        store.rotate().await.unwrap();
        assert_eq!(store.read_baseline("BTC").await.unwrap(), Some(100.0));
    }

    #[tokio::test]
    async fn test_last_write_wins_within_cycle() {
        let store = store(Horizon::Instant);

        store.write_accumulating("BTC", 100.0).await.unwrap();
        store.write_accumulating("BTC", 150.0).await.unwrap();
        store.rotate().await.unwrap();

        assert_eq!(store.read_baseline("BTC").await.unwrap(), Some(150.0));
    }

    #[tokio::test]
    async fn test_rotation_replaces_baseline_entirely() {
        let store = store(Horizon::Instant);

        store.write_accumulating("BTC", 100.0).await.unwrap();
        store.write_accumulating("ETH", 50.0).await.unwrap();
        store.rotate().await.unwrap();

        store.write_accumulating("BTC", 110.0).await.unwrap();
        store.rotate().await.unwrap();

        let baseline = store.load_baseline(0).await.unwrap();
        assert_eq!(baseline.get("BTC"), Some(110.0));
        assert_eq!(baseline.get("ETH"), None);
        assert_eq!(baseline.horizon, Horizon::Instant);
    }

    #[tokio::test]
    async fn test_double_rotation_clears_baseline() {
        let store = store(Horizon::Instant);

        store.write_accumulating("BTC", 100.0).await.unwrap();
        store.rotate().await.unwrap();
        store.rotate().await.unwrap();

        assert!(store.load_baseline(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let backend: Arc<dyn BaselineBackend> = Arc::new(InMemoryBaselineBackend::new());
        let instant = HorizonStore::new("binance", Horizon::Instant, backend.clone());
        let hourly = HorizonStore::new("binance", Horizon::H1, backend.clone());

        instant.write_accumulating("BTC", 1.0).await.unwrap();
        hourly.write_accumulating("BTC", 2.0).await.unwrap();
        instant.rotate().await.unwrap();

        assert_eq!(instant.read_baseline("BTC").await.unwrap(), Some(1.0));
        assert_eq!(hourly.read_baseline("BTC").await.unwrap(), None);

        hourly.rotate().await.unwrap();
        assert_eq!(hourly.read_baseline("BTC").await.unwrap(), Some(2.0));
    }

    #[tokio::test]
    async fn test_write_snapshot() {
        let store = store(Horizon::H24);
        let snapshot = MetricSnapshot::new(
            Horizon::H24,
            0,
            [("BTC".to_string(), 1.0), ("ETH".to_string(), 2.0)].into_iter().collect(),
        );

        store.write_snapshot(&snapshot).await.unwrap();
        store.rotate().await.unwrap();

        assert_eq!(store.load_baseline(0).await.unwrap().len(), 2);
    }
}
