use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single simulated arbitrage fill.
///
/// Field names are the wire contract the dashboard deserializes; do not
/// rename without updating the frontend types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    /// Unix seconds at execution time.
    pub time: f64,
    pub datetime: DateTime<Utc>,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: f64,
    pub sell_price: f64,
    /// Trade size in base asset (BTC).
    pub amount: f64,
    pub fees: f64,
    pub profit: f64,
    /// Spread (sell - buy) at detection time, before latency.
    pub initial_spread: f64,
    /// Spread at execution time, after latency + slippage.
    pub execution_spread: f64,
    /// Total slippage impact across both legs, in percent.
    pub slippage_impact: f64,
    pub status: String,
}

/// Aggregate trading statistics for the dashboard stats grid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: u64,
    /// Fraction of trades with positive profit, 0..1.
    pub win_rate: f64,
    pub average_profit: f64,
    /// Total traded volume in base asset.
    pub total_volume: f64,
    /// Peak-to-trough equity drawdown, in percent.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

/// ML signal panel payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlStats {
    /// Model probability of a profitable window, 0..1.
    pub confidence: f64,
    /// How far the current spread clears the entry threshold, 0..1.
    pub signal_strength: f64,
    /// Rolling accuracy of resolved predictions, 0..1.
    pub accuracy: f64,
    /// Prediction compute time in milliseconds.
    pub latency: f64,
    /// "buy" | "sell" | "hold"
    pub prediction: String,
    pub last_update: DateTime<Utc>,
}

impl Default for MlStats {
    fn default() -> Self {
        Self {
            confidence: 0.0,
            signal_strength: 0.0,
            accuracy: 0.5,
            latency: 0.0,
            prediction: "hold".to_string(),
            last_update: Utc::now(),
        }
    }
}

/// `GET /status` response. Nullable exactly where the frontend types `| null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub binance_price: Option<f64>,
    pub coinbase_price: Option<f64>,
    pub price_gap: Option<f64>,
    pub spread_percentage: Option<f64>,
    pub trades_executed: u64,
    pub total_profit: f64,
    pub last_trade_time: Option<f64>,
    pub binance_last_update: Option<f64>,
    pub coinbase_last_update: Option<f64>,
}

/// One WebSocket frame pushed to dashboard clients.
///
/// Every frame carries the full snapshot; the widgets each pick the fields
/// they render (`binance_price`/`coinbase_price`, `stats`, `ml_stats`,
/// `trades`), so no per-widget frame types are needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsFrame {
    pub binance_price: Option<f64>,
    pub coinbase_price: Option<f64>,
    pub price_gap: Option<f64>,
    pub spread_percentage: Option<f64>,
    pub cumulative_pnl: f64,
    pub stats: TradeStats,
    pub ml_stats: MlStats,
    pub trades: Vec<TradeRecord>,
}

/// Application configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub use_testnet: bool,
    /// Coinbase feed endpoint. The Binance stream endpoint is managed by
    /// `barter-data` and is not configurable here.
    pub coinbase_ws_url: String,
    /// Coinbase product id, e.g. "BTC-USD".
    pub trading_pair: String,
    /// Binance symbol, e.g. "BTCUSDT".
    pub binance_symbol: String,
    /// Trade size in base asset per simulated arbitrage.
    pub trade_amount: f64,
    pub binance_fee: f64,
    pub coinbase_fee: f64,
    pub simulated_latency_ms: u64,
    pub slippage_rate: f64,
    /// Minimum spread (percent) before the model is even consulted.
    pub min_spread_pct: f64,
    /// Minimum model confidence to execute.
    pub min_confidence: f64,
    /// Minimum time between fills; 0 disables the gate.
    pub trade_cooldown_ms: u64,
    /// Strategy poll period.
    pub poll_interval_ms: u64,
    /// Equity base for drawdown accounting.
    pub initial_bankroll: f64,
    pub api_host: String,
    pub api_port: u16,
    pub db_path: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let use_testnet = std::env::var("USE_TESTNET")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "on"))
            .unwrap_or(false);

        let coinbase_ws_url = env_string(
            "COINBASE_WS_URL",
            if use_testnet {
                "wss://ws-feed-public.sandbox.exchange.coinbase.com"
            } else {
                "wss://ws-feed.exchange.coinbase.com"
            },
        );

        Ok(Self {
            use_testnet,
            coinbase_ws_url,
            trading_pair: env_string("TRADING_PAIR", "BTC-USD"),
            binance_symbol: env_string("BINANCE_SYMBOL", "BTCUSDT"),
            trade_amount: env_parse("TRADE_AMOUNT", 0.001),
            binance_fee: env_parse("BINANCE_FEE", 0.001),
            coinbase_fee: env_parse("COINBASE_FEE", 0.005),
            simulated_latency_ms: env_parse("SIMULATED_LATENCY_MS", 50),
            slippage_rate: env_parse("SLIPPAGE_RATE", 0.0005),
            min_spread_pct: env_parse("MIN_SPREAD_PCT", 0.05),
            min_confidence: env_parse("MIN_CONFIDENCE", 0.7),
            trade_cooldown_ms: env_parse("TRADE_COOLDOWN_MS", 1000),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", 25),
            initial_bankroll: env_parse("INITIAL_BANKROLL", 10_000.0),
            api_host: env_string("API_HOST", "0.0.0.0"),
            api_port: env_parse("API_PORT", 8000),
            db_path: env_string("DB_PATH", "arbsim_trades.db"),
        })
    }

    /// Deployment defaults without touching the process environment.
    #[cfg(test)]
    pub(crate) fn default_for_tests() -> Self {
        Self {
            use_testnet: false,
            coinbase_ws_url: "wss://ws-feed.exchange.coinbase.com".to_string(),
            trading_pair: "BTC-USD".to_string(),
            binance_symbol: "BTCUSDT".to_string(),
            trade_amount: 0.001,
            binance_fee: 0.001,
            coinbase_fee: 0.005,
            simulated_latency_ms: 50,
            slippage_rate: 0.0005,
            min_spread_pct: 0.05,
            min_confidence: 0.7,
            trade_cooldown_ms: 1000,
            poll_interval_ms: 25,
            initial_bankroll: 10_000.0,
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            db_path: ":memory:".to_string(),
        }
    }

    /// Base asset ticker for Coinbase-format pairs ("BTC-USD" -> "BTC").
    pub fn base_asset(&self) -> &str {
        self.trading_pair
            .split('-')
            .next()
            .unwrap_or(&self.trading_pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env().expect("config from empty env");
        assert_eq!(config.binance_symbol, "BTCUSDT");
        assert_eq!(config.trading_pair, "BTC-USD");
        assert!((config.coinbase_fee - 0.005).abs() < 1e-12);
        assert_eq!(config.base_asset(), "BTC");
    }

    #[test]
    fn test_status_response_wire_fields() {
        let status = StatusResponse {
            binance_price: Some(97_000.0),
            coinbase_price: Some(97_050.0),
            price_gap: Some(50.0),
            spread_percentage: Some(0.0515),
            trades_executed: 3,
            total_profit: 1.25,
            last_trade_time: Some(1_700_000_000.0),
            binance_last_update: Some(1_700_000_001.0),
            coinbase_last_update: Some(1_700_000_002.0),
        };

        let json = serde_json::to_value(&status).unwrap();
        for key in [
            "binance_price",
            "coinbase_price",
            "price_gap",
            "spread_percentage",
            "trades_executed",
            "total_profit",
            "last_trade_time",
            "binance_last_update",
            "coinbase_last_update",
        ] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
    }
}
