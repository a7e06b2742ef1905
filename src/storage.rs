//! SQLite-backed trade persistence.
//!
//! Every simulated fill is written here so the equity curve and trade
//! history survive restarts. WAL mode keeps the API's read queries from
//! blocking the strategy loop's inserts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{info, warn};

use crate::ledger::PriorTotals;
use crate::models::TradeRecord;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -16000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    time REAL NOT NULL,
    datetime TEXT NOT NULL,
    buy_exchange TEXT NOT NULL,
    sell_exchange TEXT NOT NULL,
    buy_price REAL NOT NULL,
    sell_price REAL NOT NULL,
    amount REAL NOT NULL,
    fees REAL NOT NULL,
    profit REAL NOT NULL,
    initial_spread REAL NOT NULL,
    execution_spread REAL NOT NULL,
    slippage_impact REAL NOT NULL,
    status TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_trades_time ON trades(time DESC, id);
"#;

const TRADE_COLUMNS: &str = "id, time, datetime, buy_exchange, sell_exchange, buy_price, \
     sell_price, amount, fees, profit, initial_spread, execution_spread, \
     slippage_impact, status";

/// Durable store for executed (simulated) trades.
pub struct TradeStore {
    conn: Mutex<Connection>,
}

impl TradeStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))
            .unwrap_or(0);
        info!("Trade database ready at {} ({} trades stored)", db_path, count);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist a single fill. Replays of the same trade id are ignored.
    pub fn insert(&self, trade: &TradeRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO trades
             (id, time, datetime, buy_exchange, sell_exchange, buy_price,
              sell_price, amount, fees, profit, initial_spread, execution_spread,
              slippage_impact, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                &trade.id,
                trade.time,
                trade.datetime.to_rfc3339(),
                &trade.buy_exchange,
                &trade.sell_exchange,
                trade.buy_price,
                trade.sell_price,
                trade.amount,
                trade.fees,
                trade.profit,
                trade.initial_spread,
                trade.execution_spread,
                trade.slippage_impact,
                &trade.status,
            ],
        )?;
        Ok(())
    }

    /// Newest-first page of stored trades.
    pub fn recent(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades ORDER BY time DESC, id LIMIT ?1"
        ))?;

        let trades = stmt
            .query_map([limit], Self::row_to_trade)?
            .filter_map(|r| match r {
                Ok(trade) => Some(trade),
                Err(e) => {
                    warn!("Skipping corrupt trade row: {}", e);
                    None
                }
            })
            .collect();

        Ok(trades)
    }

    /// Aggregate totals over every stored trade, for re-seeding the
    /// in-memory ledger after a restart.
    pub fn totals(&self) -> Result<PriorTotals> {
        let conn = self.conn.lock();
        let totals = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(profit), 0.0),
                    COALESCE(SUM(amount), 0.0),
                    COALESCE(SUM(profit > 0), 0)
             FROM trades",
            [],
            |row| {
                Ok(PriorTotals {
                    trades: row.get::<_, i64>(0)? as u64,
                    profit: row.get(1)?,
                    volume: row.get(2)?,
                    wins: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(totals)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<TradeRecord> {
        let datetime_str: String = row.get(2)?;
        let datetime = datetime_str
            .parse::<DateTime<Utc>>()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(TradeRecord {
            id: row.get(0)?,
            time: row.get(1)?,
            datetime,
            buy_exchange: row.get(3)?,
            sell_exchange: row.get(4)?,
            buy_price: row.get(5)?,
            sell_price: row.get(6)?,
            amount: row.get(7)?,
            fees: row.get(8)?,
            profit: row.get(9)?,
            initial_spread: row.get(10)?,
            execution_spread: row.get(11)?,
            slippage_impact: row.get(12)?,
            status: row.get(13)?,
        })
    }
}
