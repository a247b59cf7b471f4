/// SQLite-backed durable storage for raw ticks and OHLCV bars
///
/// Single-writer model: all writes are issued from the flush task; reads can
/// come from any caller. The connection is serialized behind a mutex, which
/// is the only locking the store needs.
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, ToSql};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{Bar, Tick, Timeframe};

fn bar_table(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneSecond => "bars_1s",
        Timeframe::OneMinute => "bars_1m",
        Timeframe::FiveMinute => "bars_5m",
    }
}

pub struct BarStore {
    conn: Mutex<Connection>,
}

impl BarStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let store = Self::from_connection(conn)?;
        info!("SQLite store initialized with WAL mode");
        Ok(store)
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ticks (
                time INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                price REAL NOT NULL,
                qty REAL NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ticks_symbol_time ON ticks(symbol, time)",
            [],
        )?;

        for tf in Timeframe::ALL {
            let table = bar_table(tf);
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        time INTEGER NOT NULL,
                        symbol TEXT NOT NULL,
                        open REAL NOT NULL,
                        high REAL NOT NULL,
                        low REAL NOT NULL,
                        close REAL NOT NULL,
                        volume REAL NOT NULL,
                        UNIQUE(symbol, time)
                    )"
                ),
                [],
            )?;
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_symbol_time ON {table}(symbol, time)"
                ),
                [],
            )?;
        }

        Ok(BarStore {
            conn: Mutex::new(conn),
        })
    }

    /// Append-only bulk insert of raw ticks, one transaction per batch
    pub fn insert_ticks_bulk(&self, ticks: &[Tick]) -> Result<()> {
        if ticks.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO ticks (time, symbol, price, qty) VALUES (?1, ?2, ?3, ?4)")?;
            for tick in ticks {
                stmt.execute(params![
                    tick.timestamp.timestamp_millis(),
                    tick.symbol,
                    tick.price,
                    tick.quantity,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Inserted {} ticks", ticks.len());
        Ok(())
    }

    /// Upsert bars keyed by (symbol, open_time), replacing OHLCV on conflict
    pub fn upsert_bars(&self, timeframe: Timeframe, bars: &[Bar]) -> Result<()> {
        if bars.is_empty() {
            return Ok(());
        }

        let table = bar_table(timeframe);
        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {table} (time, symbol, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(symbol, time) DO UPDATE SET
                     open = excluded.open,
                     high = excluded.high,
                     low = excluded.low,
                     close = excluded.close,
                     volume = excluded.volume"
            ))?;
            for bar in bars {
                stmt.execute(params![
                    bar.open_time.timestamp_millis(),
                    bar.symbol,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Upserted {} bars into {}", bars.len(), table);
        Ok(())
    }

    /// Delete raw ticks older than the retention horizon; bars are kept
    pub fn prune_ticks_older_than(&self, hours: i64) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::hours(hours)).timestamp_millis();

        let conn = self.conn.lock().expect("store lock poisoned");
        let deleted = conn.execute("DELETE FROM ticks WHERE time < ?1", params![cutoff])?;

        if deleted > 0 {
            info!("Pruned {} ticks older than {}h", deleted, hours);
        }
        Ok(deleted)
    }

    /// Load bars ascending by open_time, optionally filtered by symbol
    /// and/or a time-since-now lookback window
    pub fn load_bars(
        &self,
        timeframe: Timeframe,
        symbol: Option<&str>,
        lookback_hours: Option<i64>,
    ) -> Result<Vec<Bar>> {
        let table = bar_table(timeframe);
        let mut sql =
            format!("SELECT time, symbol, open, high, low, close, volume FROM {table}");

        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(sym) = symbol {
            clauses.push("symbol = ?");
            args.push(Box::new(sym.to_string()));
        }
        if let Some(hours) = lookback_hours {
            let cutoff = (Utc::now() - Duration::hours(hours)).timestamp_millis();
            clauses.push("time >= ?");
            args.push(Box::new(cutoff));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY time ASC");

        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(&arg_refs[..], |row| {
            let millis: i64 = row.get(0)?;
            Ok(Bar {
                open_time: DateTime::from_timestamp_millis(millis)
                    .ok_or(rusqlite::Error::InvalidQuery)?,
                symbol: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: row.get(6)?,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Load raw ticks ascending by time
    pub fn load_ticks(
        &self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Tick>> {
        let mut sql = "SELECT time, symbol, price, qty FROM ticks".to_string();

        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(sym) = symbol {
            clauses.push("symbol = ?");
            args.push(Box::new(sym.to_string()));
        }
        if let Some(since) = since {
            clauses.push("time >= ?");
            args.push(Box::new(since.timestamp_millis()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY time ASC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(&arg_refs[..], |row| {
            let millis: i64 = row.get(0)?;
            Ok(Tick {
                timestamp: DateTime::from_timestamp_millis(millis)
                    .ok_or(rusqlite::Error::InvalidQuery)?,
                symbol: row.get(1)?,
                price: row.get(2)?,
                quantity: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
