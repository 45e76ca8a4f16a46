//! SQLite APY Store
//!
//! Implements ApyStore using SQLite for storage.
//! Blocking rusqlite calls run on the blocking thread pool.

use crate::domain::entities::StoredApy;
use crate::domain::errors::ApyError;
use crate::domain::ports::{ApyStore, Clock};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS apy_snapshots (
    key TEXT PRIMARY KEY,
    value REAL NOT NULL,
    base_component REAL NOT NULL,
    reward_component REAL NOT NULL,
    tvl REAL NOT NULL,
    last_updated_ms INTEGER NOT NULL
)";

/// SQLite-backed snapshot store.
///
/// One row per key in `apy_snapshots`; writes upsert.
pub struct SqliteApyStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteApyStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(db_path: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn, clock)
    }

    /// Open a private in-memory database.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Convert a SQLite row to a snapshot.
    fn row_to_snapshot(row: &Row) -> rusqlite::Result<StoredApy> {
        Ok(StoredApy {
            value: row.get(0)?,
            base_component: row.get(1)?,
            reward_component: row.get(2)?,
            tvl: row.get(3)?,
            last_updated_ms: row.get::<_, i64>(4)? as u64,
        })
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ApyError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| ApyError::Store(format!("spawn_blocking error: {}", e)))?
        .map_err(|e| ApyError::Store(e.to_string()))
    }
}

#[async_trait]
impl ApyStore for SqliteApyStore {
    async fn get(&self, key: &str) -> Result<Option<StoredApy>, ApyError> {
        let key = key.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT value, base_component, reward_component, tvl, last_updated_ms
                 FROM apy_snapshots
                 WHERE key = ?1",
                params![key],
                Self::row_to_snapshot,
            )
            .optional()
        })
        .await
    }

    async fn set(
        &self,
        key: &str,
        value: f64,
        base_component: f64,
        reward_component: f64,
        tvl: f64,
    ) -> Result<(), ApyError> {
        let key = key.to_string();
        let now = self.clock.now_ms() as i64;
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO apy_snapshots
                     (key, value, base_component, reward_component, tvl, last_updated_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     base_component = excluded.base_component,
                     reward_component = excluded.reward_component,
                     tvl = excluded.tvl,
                     last_updated_ms = excluded.last_updated_ms",
                params![key, value, base_component, reward_component, tvl, now],
            )
            .map(|_| ())
        })
        .await
    }
}
