//! SQLite Series Store
//!
//! Durable [`SeriesStore`] backed by a single SQLite connection.
//!
//! # Schema
//!
//! One `series` row per symbol records when the symbol was first seen.
//! Observations live in a single `observations` table keyed by an
//! autoincrement sequence, which doubles as the append order. Symbols are
//! bound as parameters, never spliced into SQL.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use tracing::info;

use crate::application::ports::{SeriesStore, StorageError};
use crate::domain::market::{Observation, Symbol, datetime_from_millis};

const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS series (
    symbol TEXT PRIMARY KEY,
    created_at_ms INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS observations (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL REFERENCES series(symbol),
    time_ms INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_symbol_time
    ON observations(symbol, time_ms);
";

const SELECT_COLUMNS: &str = "SELECT symbol, time_ms, open, high, low, close, volume FROM observations";

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// SQLite-backed series store.
pub struct SqliteSeriesStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSeriesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSeriesStore").finish_non_exhaustive()
    }
}

impl SqliteSeriesStore {
    /// Open or create a database file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Open(format!("{}: {e}", parent.display())))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StorageError::Open(format!("{}: {e}", path.display())))?;

        let store = Self::initialize(conn)?;
        info!(path = %path.display(), "SQLite series store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Open(e.to_string()))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Open(format!("schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

struct RawRow {
    symbol: String,
    time_ms: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            symbol: row.get(0)?,
            time_ms: row.get(1)?,
            open: row.get(2)?,
            high: row.get(3)?,
            low: row.get(4)?,
            close: row.get(5)?,
            volume: row.get(6)?,
        })
    }
}

impl TryFrom<RawRow> for Observation {
    type Error = StorageError;

    fn try_from(raw: RawRow) -> Result<Self, Self::Error> {
        let symbol = Symbol::parse(&raw.symbol).map_err(|e| StorageError::CorruptRow {
            symbol: raw.symbol.clone(),
            message: e.to_string(),
        })?;
        let time = datetime_from_millis(raw.time_ms).ok_or_else(|| StorageError::CorruptRow {
            symbol: raw.symbol.clone(),
            message: format!("time_ms {} out of range", raw.time_ms),
        })?;
        Ok(Self {
            symbol,
            time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        })
    }
}

impl SeriesStore for SqliteSeriesStore {
    fn append(&self, observation: &Observation) -> Result<(), StorageError> {
        if !observation.is_valid() {
            return Err(StorageError::InvalidObservation(format!(
                "{} at {}",
                observation.symbol,
                observation.time_ms()
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO series (symbol, created_at_ms) VALUES (?1, ?2)",
            params![observation.symbol.as_str(), Utc::now().timestamp_millis()],
        )?;
        tx.execute(
            "INSERT INTO observations (symbol, time_ms, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                observation.symbol.as_str(),
                observation.time_ms(),
                observation.open,
                observation.high,
                observation.low,
                observation.close,
                observation.volume,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn latest(&self, symbol: &Symbol) -> Result<Option<Observation>, StorageError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE symbol = ?1 ORDER BY seq DESC LIMIT 1"),
                params![symbol.as_str()],
                RawRow::from_row,
            )
            .optional()?
        };
        raw.map(Observation::try_from).transpose()
    }

    fn range(
        &self,
        symbol: &Symbol,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, StorageError> {
        let start_ms = start.map_or(i64::MIN, |t| t.timestamp_millis());
        let end_ms = end.map_or(i64::MAX, |t| t.timestamp_millis());

        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(&format!(
                "{SELECT_COLUMNS} WHERE symbol = ?1 AND time_ms >= ?2 AND time_ms <= ?3
                 ORDER BY time_ms ASC, seq ASC"
            ))?;
            let rows = stmt
                .query_map(params![symbol.as_str(), start_ms, end_ms], RawRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(Observation::try_from).collect()
    }

    fn count(&self, symbol: &Symbol) -> Result<u64, StorageError> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM observations WHERE symbol = ?1",
            params![symbol.as_str()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn has_series(&self, symbol: &Symbol) -> Result<bool, StorageError> {
        let exists: bool = self.conn.lock().query_row(
            "SELECT EXISTS(SELECT 1 FROM series WHERE symbol = ?1)",
            params![symbol.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn ping(&self) -> Result<(), StorageError> {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn obs(symbol: &str, ms: i64, close: f64) -> Observation {
        Observation {
            symbol: Symbol::parse(symbol).unwrap(),
            time: datetime_from_millis(1_700_000_000_000 + ms).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 3.5,
        }
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recorder.db");

        {
            let store = SqliteSeriesStore::open(&path).unwrap();
            store.append(&obs("BTCUSDT", 0, 100.0)).unwrap();
            store.append(&obs("BTCUSDT", 10_000, 101.0)).unwrap();
        }

        let store = SqliteSeriesStore::open(&path).unwrap();
        let btc = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(store.count(&btc).unwrap(), 2);
        assert_eq!(store.latest(&btc).unwrap().unwrap().close, 101.0);
    }

    #[test]
    fn append_provisions_series() {
        let store = SqliteSeriesStore::open_in_memory().unwrap();
        let eth = Symbol::parse("ETHUSDT").unwrap();
        assert!(!store.has_series(&eth).unwrap());

        store.append(&obs("ETHUSDT", 0, 2000.0)).unwrap();
        assert!(store.has_series(&eth).unwrap());
        store.append(&obs("ETHUSDT", 1, 2001.0)).unwrap();
        assert_eq!(store.count(&eth).unwrap(), 2);
    }

    #[test]
    fn rejects_invalid_observation() {
        let store = SqliteSeriesStore::open_in_memory().unwrap();
        let mut bad = obs("BTCUSDT", 0, 1.0);
        bad.high = f64::INFINITY;
        assert!(matches!(
            store.append(&bad),
            Err(StorageError::InvalidObservation(_))
        ));
        assert!(!store.has_series(&bad.symbol).unwrap());
    }

    #[test]
    fn hostile_symbol_text_is_bound_not_spliced() {
        let store = SqliteSeriesStore::open_in_memory().unwrap();
        store.append(&obs("BTCUSDT", 0, 1.0)).unwrap();

        // Bypass Symbol validation at the SQL layer to prove parameter binding.
        let count: i64 = store
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM observations WHERE symbol = ?1",
                params!["BTCUSDT' OR '1'='1"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let store = SqliteSeriesStore::open_in_memory().unwrap();
        for (i, close) in [10.0, 11.0, 12.0, 13.0].into_iter().enumerate() {
            store
                .append(&obs("BTCUSDT", i64::try_from(i).unwrap() * 10_000, close))
                .unwrap();
        }
        let btc = Symbol::parse("BTCUSDT").unwrap();
        let t0 = datetime_from_millis(1_700_000_000_000).unwrap();

        let middle = store
            .range(
                &btc,
                Some(t0 + TimeDelta::seconds(10)),
                Some(t0 + TimeDelta::seconds(20)),
            )
            .unwrap();
        let closes: Vec<f64> = middle.iter().map(|o| o.close).collect();
        assert_eq!(closes, [11.0, 12.0]);
    }

    #[test]
    fn ping_succeeds_on_open_store() {
        let store = SqliteSeriesStore::open_in_memory().unwrap();
        assert!(store.ping().is_ok());
    }
}
