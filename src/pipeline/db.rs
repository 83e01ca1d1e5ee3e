//! SQLite baseline backend
//!
//! Table `horizon_baselines` (see `/sql/00_horizon_baselines.sql`) holds both
//! slots of every (source, horizon) namespace. Rotation is one transaction,
//! so a crash mid-rotation leaves either the old or the new baseline, never a mix.

use super::store::{BaselineBackend, PersistenceError};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = include_str!("../../sql/00_horizon_baselines.sql");

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir` (sorted: 00_, 01_, ...) and
/// executes them. Every file must use "IF NOT EXISTS" so reruns are no-ops.
///
/// Example:
/// ```no_run
/// # use rusqlite::Connection;
/// # use volwatch::pipeline::db::run_schema_migrations;
/// let mut conn = Connection::open("volwatch.db").unwrap();
/// run_schema_migrations(&mut conn, "sql").unwrap();
/// ```
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(format!("Schema directory not found: {}", schema_dir).into());
    }

    enable_wal(conn)?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

fn enable_wal(conn: &Connection) -> Result<(), rusqlite::Error> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("📊 SQLite journal_mode = {}", mode);
    Ok(())
}

/// SQLite implementation of `BaselineBackend`
pub struct SqliteBaselineBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBaselineBackend {
    /// Open (or create) the database and apply the embedded schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// Open the database, running `schema_dir` migrations when the directory exists
    ///
    /// Without the directory (binary started outside the crate root) the
    /// embedded schema applied by `from_connection` is enough.
    pub fn open_with_migrations(
        db_path: impl AsRef<Path>,
        schema_dir: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut conn = Connection::open(db_path)?;

        if Path::new(schema_dir).is_dir() {
            run_schema_migrations(&mut conn, schema_dir)?;
        } else {
            log::info!(
                "ℹ️  Schema directory {} not found, using the embedded schema",
                schema_dir
            );
        }

        Ok(Self::from_connection(conn)?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        enable_wal(&conn)?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl BaselineBackend for SqliteBaselineBackend {
    async fn read_baseline(
        &self,
        namespace: &str,
        symbol: &str,
    ) -> Result<Option<f64>, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT value FROM horizon_baselines
             WHERE namespace = ?1 AND slot = 'baseline' AND symbol = ?2",
        )?;
        let mut rows = stmt.query(params![namespace, symbol])?;
        let value = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        Ok(value)
    }

    async fn load_baseline(
        &self,
        namespace: &str,
    ) -> Result<HashMap<String, f64>, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT symbol, value FROM horizon_baselines
             WHERE namespace = ?1 AND slot = 'baseline'",
        )?;
        let rows = stmt.query_map(params![namespace], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut values = HashMap::new();
        for row in rows {
            let (symbol, value) = row?;
            values.insert(symbol, value);
        }
        Ok(values)
    }

    async fn write_accumulating(
        &self,
        namespace: &str,
        entries: &[(String, f64)],
    ) -> Result<(), PersistenceError> {
        let mut conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let now = Self::now();

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO horizon_baselines (namespace, slot, symbol, value, updated_at)
                VALUES (?1, 'accumulating', ?2, ?3, ?4)
                ON CONFLICT(namespace, slot, symbol) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )?;
            for (symbol, value) in entries {
                stmt.execute(params![namespace, symbol, value, now])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    async fn rotate(&self, namespace: &str) -> Result<(), PersistenceError> {
        let mut conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM horizon_baselines WHERE namespace = ?1 AND slot = 'baseline'",
            params![namespace],
        )?;
        let promoted = tx.execute(
            "UPDATE horizon_baselines SET slot = 'baseline'
             WHERE namespace = ?1 AND slot = 'accumulating'",
            params![namespace],
        )?;
        tx.commit()?;

        log::debug!("💾 {} rotated: {} values promoted", namespace, promoted);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
