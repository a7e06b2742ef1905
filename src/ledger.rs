//! In-memory trade log and aggregate statistics.
//!
//! Holds a bounded window of recent fills plus running totals that survive
//! eviction, so cumulative P&L and trade counts stay exact however long the
//! simulator runs.

use statrs::statistics::Statistics;
use std::collections::VecDeque;

use crate::models::{TradeRecord, TradeStats};

/// Fills kept in memory; older fills remain in sqlite and in running totals.
pub const MAX_TRADES_IN_MEMORY: usize = 1000;

/// Aggregates over fills not reloaded into the in-memory window.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorTotals {
    pub trades: u64,
    pub profit: f64,
    pub volume: f64,
    pub wins: u64,
}

pub struct TradeLog {
    trades: VecDeque<TradeRecord>,
    /// Running totals over ALL fills, including evicted ones.
    total_trades: u64,
    total_profit: f64,
    total_volume: f64,
    wins: u64,
    /// Equity-curve extrema for drawdown, tracked incrementally.
    equity: f64,
    equity_peak: f64,
    max_drawdown_pct: f64,
    initial_bankroll: f64,
}

impl TradeLog {
    pub fn new(initial_bankroll: f64) -> Self {
        let bankroll = if initial_bankroll > 0.0 {
            initial_bankroll
        } else {
            1.0
        };
        Self {
            trades: VecDeque::with_capacity(MAX_TRADES_IN_MEMORY),
            total_trades: 0,
            total_profit: 0.0,
            total_volume: 0.0,
            wins: 0,
            equity: bankroll,
            equity_peak: bankroll,
            max_drawdown_pct: 0.0,
            initial_bankroll: bankroll,
        }
    }

    /// Rebuild a ledger after restart: `prior` covers fills older than the
    /// reloaded window, which are then replayed through [`TradeLog::push`].
    pub fn with_prior(initial_bankroll: f64, prior: PriorTotals) -> Self {
        let mut log = Self::new(initial_bankroll);
        log.total_trades = prior.trades;
        log.total_profit = prior.profit;
        log.total_volume = prior.volume;
        log.wins = prior.wins;
        log.equity = log.initial_bankroll + prior.profit;
        log.equity_peak = log.equity.max(log.initial_bankroll);
        log
    }

    /// Append a fill, updating running totals and the equity curve.
    pub fn push(&mut self, trade: TradeRecord) {
        self.total_trades += 1;
        self.total_profit += trade.profit;
        self.total_volume += trade.amount;
        if trade.profit > 0.0 {
            self.wins += 1;
        }

        self.equity += trade.profit;
        if self.equity > self.equity_peak {
            self.equity_peak = self.equity;
        } else if self.equity_peak > 0.0 {
            let drawdown = (self.equity_peak - self.equity) / self.equity_peak * 100.0;
            if drawdown > self.max_drawdown_pct {
                self.max_drawdown_pct = drawdown;
            }
        }

        self.trades.push_back(trade);
        while self.trades.len() > MAX_TRADES_IN_MEMORY {
            self.trades.pop_front();
        }
    }

    /// Newest `limit` trades, newest first.
    pub fn recent(&self, limit: usize) -> Vec<TradeRecord> {
        self.trades.iter().rev().take(limit).cloned().collect()
    }

    pub fn cumulative_pnl(&self) -> f64 {
        self.total_profit
    }

    pub fn trades_executed(&self) -> u64 {
        self.total_trades
    }

    pub fn last_trade_time(&self) -> Option<f64> {
        self.trades.back().map(|t| t.time)
    }

    pub fn stats(&self) -> TradeStats {
        if self.total_trades == 0 {
            return TradeStats::default();
        }

        let profits: Vec<f64> = self.trades.iter().map(|t| t.profit).collect();
        let sharpe = if profits.len() >= 2 {
            let mean = profits.iter().mean();
            let std = profits.iter().population_std_dev();
            if std > 0.0 {
                mean / std
            } else {
                0.0
            }
        } else {
            0.0
        };

        TradeStats {
            total_trades: self.total_trades,
            win_rate: self.wins as f64 / self.total_trades as f64,
            average_profit: self.total_profit / self.total_trades as f64,
            total_volume: self.total_volume,
            max_drawdown: self.max_drawdown_pct,
            sharpe_ratio: sharpe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(profit: f64, amount: f64) -> TradeRecord {
        let now = Utc::now();
        TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            time: now.timestamp_micros() as f64 / 1e6,
            datetime: now,
            buy_exchange: "Binance".to_string(),
            sell_exchange: "Coinbase".to_string(),
            buy_price: 97_000.0,
            sell_price: 97_050.0,
            amount,
            fees: 0.5,
            profit,
            initial_spread: 50.0,
            execution_spread: 48.0,
            slippage_impact: 0.1,
            status: "filled".to_string(),
        }
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let log = TradeLog::new(10_000.0);
        let stats = log.stats();
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.sharpe_ratio, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert_eq!(log.cumulative_pnl(), 0.0);
        assert!(log.last_trade_time().is_none());
    }

    #[test]
    fn test_running_totals() {
        let mut log = TradeLog::new(10_000.0);
        log.push(trade(1.0, 0.001));
        log.push(trade(-0.5, 0.001));
        log.push(trade(2.0, 0.002));

        let stats = log.stats();
        assert_eq!(stats.total_trades, 3);
        assert!((stats.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats.average_profit - 2.5 / 3.0).abs() < 1e-12);
        assert!((stats.total_volume - 0.004).abs() < 1e-12);
        assert!((log.cumulative_pnl() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_from_equity_peak() {
        let mut log = TradeLog::new(1_000.0);
        log.push(trade(100.0, 0.001)); // equity 1100, peak 1100
        log.push(trade(-55.0, 0.001)); // equity 1045, dd = 55/1100 = 5%
        log.push(trade(200.0, 0.001)); // new peak, dd unchanged

        let stats = log.stats();
        assert!((stats.max_drawdown - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_totals_survive_window_eviction() {
        let mut log = TradeLog::new(10_000.0);
        for _ in 0..(MAX_TRADES_IN_MEMORY + 10) {
            log.push(trade(1.0, 0.001));
        }

        assert_eq!(log.trades_executed() as usize, MAX_TRADES_IN_MEMORY + 10);
        assert_eq!(log.recent(usize::MAX).len(), MAX_TRADES_IN_MEMORY);
        assert!((log.cumulative_pnl() - (MAX_TRADES_IN_MEMORY + 10) as f64).abs() < 1e-9);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut log = TradeLog::new(10_000.0);
        log.push(trade(1.0, 0.001));
        log.push(trade(2.0, 0.001));
        log.push(trade(3.0, 0.001));

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].profit, 3.0);
        assert_eq!(recent[1].profit, 2.0);
    }

    #[test]
    fn test_with_prior_resumes_totals() {
        let prior = PriorTotals {
            trades: 100,
            profit: 50.0,
            volume: 0.1,
            wins: 60,
        };
        let mut log = TradeLog::with_prior(10_000.0, prior);
        log.push(trade(2.0, 0.001));

        let stats = log.stats();
        assert_eq!(stats.total_trades, 101);
        assert!((stats.total_volume - 0.101).abs() < 1e-12);
        assert!((log.cumulative_pnl() - 52.0).abs() < 1e-12);
        assert!((stats.win_rate - 61.0 / 101.0).abs() < 1e-12);
        // Only the in-memory window is visible.
        assert_eq!(log.recent(usize::MAX).len(), 1);
    }

    #[test]
    fn test_sharpe_zero_for_constant_profits() {
        let mut log = TradeLog::new(10_000.0);
        log.push(trade(1.0, 0.001));
        log.push(trade(1.0, 0.001));
        assert_eq!(log.stats().sharpe_ratio, 0.0);

        log.push(trade(3.0, 0.001));
        assert!(log.stats().sharpe_ratio > 0.0);
    }
}
