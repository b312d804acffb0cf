//! Durable Tick Storage
//!
//! Append-only SQLite table of every tick consumed by the storage group.
//! One row per tick, no updates, no deduplication. The composite primary key
//! `(symbol, ts, id)` tolerates repeated timestamps for a symbol.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};

use crate::application::ports::{StoreError, StoredTick, TickStore};
use crate::domain::market::{Tick, epoch_seconds};

// =============================================================================
// Schema
// =============================================================================

const TICK_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS ticks (
    id INTEGER NOT NULL,
    symbol TEXT NOT NULL,
    price REAL NOT NULL,
    volume INTEGER NOT NULL,
    ts TEXT NOT NULL,
    PRIMARY KEY (symbol, ts, id)
);

CREATE INDEX IF NOT EXISTS idx_ticks_id ON ticks(id);
";

const INSERT_TICK: &str = "
INSERT INTO ticks (id, symbol, price, volume, ts)
VALUES ((SELECT COALESCE(MAX(id), 0) + 1 FROM ticks), ?1, ?2, ?3, ?4)
RETURNING id
";

// =============================================================================
// SQLite Store
// =============================================================================

/// SQLite-backed `TickStore`.
#[derive(Debug, Clone)]
pub struct SqliteTickStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTickStore {
    /// Open or create the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection(e.to_string()))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(path = %path.display(), "Tick store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `open` on the blocking pool, for callers on the async runtime.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the file cannot be opened or the
    /// blocking task fails.
    pub async fn connect(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || Self::open(path))
            .await
            .map_err(|e| StoreError::Connection(format!("store task failed: {e}")))?
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if SQLite cannot allocate it.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a statement on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Connection(format!("store task failed: {e}")))?
    }
}

fn query_err(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTick> {
    let id: i64 = row.get(0)?;
    let symbol: String = row.get(1)?;
    let price: f64 = row.get(2)?;
    let volume: i64 = row.get(3)?;
    let ts: DateTime<Utc> = row.get(4)?;
    Ok(StoredTick {
        id,
        tick: Tick::new(
            symbol,
            price,
            u64::try_from(volume).unwrap_or(0),
            epoch_seconds(ts),
        ),
    })
}

#[async_trait]
impl TickStore for SqliteTickStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.run(|conn| conn.execute_batch(TICK_SCHEMA).map_err(query_err))
            .await
    }

    async fn insert(&self, tick: &Tick) -> Result<i64, StoreError> {
        let ts = tick
            .datetime()
            .ok_or(StoreError::Timestamp(tick.timestamp))?;
        let volume =
            i64::try_from(tick.volume).map_err(|e| StoreError::Query(e.to_string()))?;
        let symbol = tick.symbol.clone();
        let price = tick.price;

        self.run(move |conn| {
            conn.query_row(INSERT_TICK, params![symbol, price, volume, ts], |row| {
                row.get(0)
            })
            .map_err(query_err)
        })
        .await
    }

    async fn count_for(&self, symbol: &str) -> Result<u64, StoreError> {
        let symbol = symbol.to_string();
        let count: i64 = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM ticks WHERE symbol = ?1",
                    params![symbol],
                    |row| row.get(0),
                )
                .map_err(query_err)
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn recent(&self, symbol: &str, limit: u32) -> Result<Vec<StoredTick>, StoreError> {
        let symbol = symbol.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, symbol, price, volume, ts FROM ticks
                     WHERE symbol = ?1 ORDER BY ts DESC, id DESC LIMIT ?2",
                )
                .map_err(query_err)?;
            let rows = stmt
                .query_map(params![symbol, limit], row_to_stored)
                .map_err(query_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
        })
        .await
    }
}
