//! Spread-capture strategy loop.
//!
//! Polls the price board, feeds the spread model, and when every gate
//! passes simulates a buy-on-Binance / sell-on-Coinbase fill with
//! execution latency and slippage applied.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::feeds::now_secs;
use crate::models::{Config, TradeRecord};
use crate::AppState;

pub struct Strategy {
    state: AppState,
    last_fill: Option<Instant>,
}

impl Strategy {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            last_fill: None,
        }
    }

    /// Drive the strategy forever. Individual poll failures are logged
    /// and never kill the loop.
    pub async fn run(mut self) -> Result<()> {
        let period = Duration::from_millis(self.state.config.poll_interval_ms);
        info!(
            "Strategy loop started: poll={}ms min_spread={}% min_confidence={}",
            self.state.config.poll_interval_ms,
            self.state.config.min_spread_pct,
            self.state.config.min_confidence,
        );

        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                warn!("Strategy poll failed: {e:#}");
            }
        }
    }

    async fn poll_once(&mut self) -> Result<()> {
        let config = self.state.config.clone();

        let (binance, coinbase) = self.state.prices.snapshot();
        let (Some(buy), Some(sell)) = (binance, coinbase) else {
            return Ok(());
        };

        let spread_pct = (sell.price - buy.price) / buy.price * 100.0;
        self.state.model.write().update(spread_pct);

        if spread_pct <= config.min_spread_pct {
            return Ok(());
        }

        let Some(prediction) = self.state.model.write().predict() else {
            // Window still warming up.
            return Ok(());
        };
        if !prediction.is_profitable || prediction.confidence < config.min_confidence {
            debug!(
                "Model vetoed entry: spread={:.4}% confidence={:.3}",
                spread_pct, prediction.confidence
            );
            return Ok(());
        }

        if !clears_fees(buy.price, sell.price, &config) {
            debug!("Spread {:.4}% does not clear fees", spread_pct);
            return Ok(());
        }

        if let Some(last) = self.last_fill {
            if last.elapsed() < Duration::from_millis(config.trade_cooldown_ms) {
                return Ok(());
            }
        }

        let Some(trade) = self.simulate_fill(buy.price, sell.price).await else {
            warn!("Aborted fill: non-positive execution price after slippage");
            return Ok(());
        };
        self.last_fill = Some(Instant::now());

        info!(
            "Filled {}: buy {:.2} sell {:.2} profit {:+.6}",
            trade.id, trade.buy_price, trade.sell_price, trade.profit
        );

        let realized_profitable = trade.profit > 0.0;
        if let Err(e) = self.state.store.insert(&trade) {
            warn!("Failed to persist trade {}: {e:#}", trade.id);
        }
        self.state.ledger.write().push(trade);
        self.state
            .model
            .write()
            .resolve(prediction.is_profitable, realized_profitable);

        // Push the updated snapshot immediately rather than waiting for
        // the next broadcast tick.
        let _ = self.state.frame_tx.send(self.state.build_frame());

        Ok(())
    }

    /// Wait out the simulated execution latency, then fill at whatever
    /// the market moved to, with slippage on both legs.
    async fn simulate_fill(&self, trigger_buy: f64, trigger_sell: f64) -> Option<TradeRecord> {
        let config = &self.state.config;
        sleep(Duration::from_millis(config.simulated_latency_ms)).await;

        let (binance, coinbase) = self.state.prices.snapshot();
        let raw_buy = binance.map(|t| t.price).unwrap_or(trigger_buy);
        let raw_sell = coinbase.map(|t| t.price).unwrap_or(trigger_sell);

        build_fill(config, trigger_buy, trigger_sell, raw_buy, raw_sell)
    }
}

/// Does (sell - buy) still cover taker fees on both legs?
pub(crate) fn clears_fees(buy_price: f64, sell_price: f64, config: &Config) -> bool {
    let fee_cost = buy_price * config.binance_fee + sell_price * config.coinbase_fee;
    sell_price - buy_price - fee_cost > 0.0
}

/// Construct the trade record for a fill.
///
/// `trigger_*` are the prices that tripped the entry gates; `raw_*` are
/// the prices observed after execution latency, before slippage. Returns
/// `None` when slippage pushes either execution price non-positive.
pub(crate) fn build_fill(
    config: &Config,
    trigger_buy: f64,
    trigger_sell: f64,
    raw_buy: f64,
    raw_sell: f64,
) -> Option<TradeRecord> {
    let exec_buy = raw_buy * (1.0 + config.slippage_rate);
    let exec_sell = raw_sell * (1.0 - config.slippage_rate);
    if exec_buy <= 0.0 || exec_sell <= 0.0 {
        return None;
    }

    let amount = config.trade_amount;
    let cost = exec_buy * amount;
    let revenue = exec_sell * amount;
    let profit = revenue * (1.0 - config.coinbase_fee) - cost * (1.0 + config.binance_fee);
    let fees = cost * config.binance_fee + revenue * config.coinbase_fee;

    let slippage_impact = ((exec_buy / raw_buy - 1.0) + (1.0 - exec_sell / raw_sell)) * 100.0;

    Some(TradeRecord {
        id: Uuid::new_v4().to_string(),
        time: now_secs(),
        datetime: Utc::now(),
        buy_exchange: "Binance".to_string(),
        sell_exchange: "Coinbase".to_string(),
        buy_price: exec_buy,
        sell_price: exec_sell,
        amount,
        fees,
        profit,
        initial_spread: trigger_sell - trigger_buy,
        execution_spread: exec_sell - exec_buy,
        slippage_impact,
        status: "filled".to_string(),
    })
}
