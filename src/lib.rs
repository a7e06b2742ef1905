//! Cross-exchange arbitrage paper-trading backend.
//!
//! Streams BTC prices from Binance and Coinbase, runs a spread-model
//! strategy over the gap, simulates fills with latency and slippage, and
//! serves the results to the dashboard over REST and WebSocket.

pub mod api;
pub mod collector;
pub mod feeds;
pub mod ledger;
pub mod model;
pub mod models;
pub mod storage;
pub mod strategy;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::feeds::PriceBoard;
use crate::ledger::TradeLog;
use crate::model::SpreadModel;
use crate::models::{Config, StatusResponse, WsFrame};
use crate::storage::TradeStore;

/// Trades included in each WebSocket frame.
pub const FRAME_TRADE_LIMIT: usize = 20;

/// Shared state behind every API handler and background task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub prices: Arc<PriceBoard>,
    pub ledger: Arc<RwLock<TradeLog>>,
    pub model: Arc<RwLock<SpreadModel>>,
    pub store: Arc<TradeStore>,
    pub frame_tx: broadcast::Sender<WsFrame>,
}

impl AppState {
    /// Current spread in percent of the Binance price, if both feeds are live.
    pub fn spread_pct(&self) -> Option<f64> {
        let (binance, coinbase) = self.prices.snapshot();
        let b = binance?.price;
        let c = coinbase?.price;
        Some((c - b) / b * 100.0)
    }

    /// Assemble the snapshot pushed to dashboard WebSocket clients.
    pub fn build_frame(&self) -> WsFrame {
        let (binance, coinbase) = self.prices.snapshot();
        let binance_price = binance.as_ref().map(|t| t.price);
        let coinbase_price = coinbase.as_ref().map(|t| t.price);
        let price_gap = match (binance_price, coinbase_price) {
            (Some(b), Some(c)) => Some(c - b),
            _ => None,
        };
        let spread_percentage = match (binance_price, coinbase_price) {
            (Some(b), Some(c)) if b > 0.0 => Some((c - b) / b * 100.0),
            _ => None,
        };

        let ledger = self.ledger.read();
        let ml_stats = self.model.read().stats();

        WsFrame {
            binance_price,
            coinbase_price,
            price_gap,
            spread_percentage,
            cumulative_pnl: ledger.cumulative_pnl(),
            stats: ledger.stats(),
            ml_stats,
            trades: ledger.recent(FRAME_TRADE_LIMIT),
        }
    }

    pub fn build_status(&self) -> StatusResponse {
        let (binance, coinbase) = self.prices.snapshot();
        let binance_price = binance.as_ref().map(|t| t.price);
        let coinbase_price = coinbase.as_ref().map(|t| t.price);

        let ledger = self.ledger.read();
        StatusResponse {
            binance_price,
            coinbase_price,
            price_gap: match (binance_price, coinbase_price) {
                (Some(b), Some(c)) => Some(c - b),
                _ => None,
            },
            spread_percentage: match (binance_price, coinbase_price) {
                (Some(b), Some(c)) if b > 0.0 => Some((c - b) / b * 100.0),
                _ => None,
            },
            trades_executed: ledger.trades_executed(),
            total_profit: ledger.cumulative_pnl(),
            last_trade_time: ledger.last_trade_time(),
            binance_last_update: binance.map(|t| t.ts),
            coinbase_last_update: coinbase.map(|t| t.ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let config = Arc::new(Config::default_for_tests());
        let (frame_tx, _) = broadcast::channel(16);
        AppState {
            prices: Arc::new(PriceBoard::new()),
            ledger: Arc::new(RwLock::new(TradeLog::new(config.initial_bankroll))),
            model: Arc::new(RwLock::new(SpreadModel::new(
                config.min_spread_pct,
                config.min_confidence,
            ))),
            store: Arc::new(TradeStore::new(":memory:").unwrap()),
            config,
            frame_tx,
        }
    }

    #[test]
    fn test_status_nullable_before_feeds_connect() {
        let state = test_state();
        let status = state.build_status();
        assert!(status.binance_price.is_none());
        assert!(status.spread_percentage.is_none());
        assert_eq!(status.trades_executed, 0);
    }

    #[test]
    fn test_frame_spread_math() {
        let state = test_state();
        state.prices.record_binance(50_000.0);
        state.prices.record_coinbase(50_100.0);

        let frame = state.build_frame();
        assert_eq!(frame.price_gap, Some(100.0));
        assert!((frame.spread_percentage.unwrap() - 0.2).abs() < 1e-9);
        assert!((state.spread_pct().unwrap() - 0.2).abs() < 1e-9);
    }
}
