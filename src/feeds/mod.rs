//! Exchange price feeds.
//!
//! Both feeds publish into a shared [`PriceBoard`]; consumers (strategy loop,
//! API handlers) read the latest tick without ever blocking ingestion.

pub mod binance;
pub mod coinbase;

use chrono::Utc;
use parking_lot::RwLock;

/// Latest observed price on one exchange.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    /// Unix seconds (fractional) when the tick was recorded locally.
    pub ts: f64,
}

#[derive(Debug, Default)]
struct BoardState {
    binance: Option<Tick>,
    coinbase: Option<Tick>,
}

/// Shared latest-price state for both exchanges.
#[derive(Debug, Default)]
pub struct PriceBoard {
    inner: RwLock<BoardState>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_binance(&self, price: f64) {
        if !(price.is_finite() && price > 0.0) {
            return;
        }
        self.inner.write().binance = Some(Tick {
            price,
            ts: now_secs(),
        });
    }

    pub fn record_coinbase(&self, price: f64) {
        if !(price.is_finite() && price > 0.0) {
            return;
        }
        self.inner.write().coinbase = Some(Tick {
            price,
            ts: now_secs(),
        });
    }

    pub fn binance(&self) -> Option<Tick> {
        self.inner.read().binance
    }

    pub fn coinbase(&self) -> Option<Tick> {
        self.inner.read().coinbase
    }

    /// Both ticks under a single lock acquisition.
    pub fn snapshot(&self) -> (Option<Tick>, Option<Tick>) {
        let state = self.inner.read();
        (state.binance, state.coinbase)
    }
}

pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}
