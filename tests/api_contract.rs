//! Wire-contract tests for the dashboard API payloads.
//!
//! The frontend destructures these JSON shapes directly, so field names
//! and nullability are load-bearing.

use chrono::{TimeZone, Utc};
use serde_json::json;

use arbsim_backend::models::{MlStats, StatusResponse, TradeRecord, TradeStats, WsFrame};

fn sample_trade() -> TradeRecord {
    TradeRecord {
        id: "3f6f2c1e-0000-4000-8000-000000000000".to_string(),
        time: 1_700_000_000.0,
        datetime: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        buy_exchange: "Binance".to_string(),
        sell_exchange: "Coinbase".to_string(),
        buy_price: 50_025.0,
        sell_price: 50_074.95,
        amount: 0.001,
        fees: 0.3004,
        profit: -0.2504,
        initial_spread: 100.0,
        execution_spread: 49.95,
        slippage_impact: 0.1,
        status: "filled".to_string(),
    }
}

#[test]
fn trade_record_matches_frontend_fields() {
    let value = serde_json::to_value(sample_trade()).unwrap();
    for key in [
        "time",
        "datetime",
        "buy_exchange",
        "sell_exchange",
        "buy_price",
        "sell_price",
        "amount",
        "fees",
        "profit",
        "initial_spread",
        "execution_spread",
        "slippage_impact",
    ] {
        assert!(value.get(key).is_some(), "missing trade field {key}");
    }
    // datetime serializes as an ISO-8601 string the UI can Date-parse.
    assert!(value["datetime"].is_string());
    assert!(value["time"].is_f64());
}

#[test]
fn ws_frame_matches_dashboard_widgets() {
    let frame = WsFrame {
        binance_price: Some(50_000.0),
        coinbase_price: Some(50_100.0),
        price_gap: Some(100.0),
        spread_percentage: Some(0.2),
        cumulative_pnl: 12.5,
        stats: TradeStats {
            total_trades: 10,
            win_rate: 0.6,
            average_profit: 1.25,
            total_volume: 0.01,
            max_drawdown: 2.5,
            sharpe_ratio: 0.8,
        },
        ml_stats: MlStats::default(),
        trades: vec![sample_trade()],
    };

    let value = serde_json::to_value(&frame).unwrap();
    for key in [
        "binance_price",
        "coinbase_price",
        "price_gap",
        "spread_percentage",
        "cumulative_pnl",
        "stats",
        "ml_stats",
        "trades",
    ] {
        assert!(value.get(key).is_some(), "missing frame field {key}");
    }

    for key in [
        "total_trades",
        "win_rate",
        "average_profit",
        "total_volume",
        "max_drawdown",
        "sharpe_ratio",
    ] {
        assert!(value["stats"].get(key).is_some(), "missing stats field {key}");
    }

    for key in [
        "confidence",
        "signal_strength",
        "accuracy",
        "latency",
        "prediction",
        "last_update",
    ] {
        assert!(
            value["ml_stats"].get(key).is_some(),
            "missing ml_stats field {key}"
        );
    }

    assert_eq!(value["trades"].as_array().unwrap().len(), 1);
}

#[test]
fn ws_frame_nulls_before_feeds_connect() {
    let frame = WsFrame {
        binance_price: None,
        coinbase_price: None,
        price_gap: None,
        spread_percentage: None,
        cumulative_pnl: 0.0,
        stats: TradeStats::default(),
        ml_stats: MlStats::default(),
        trades: vec![],
    };

    let value = serde_json::to_value(&frame).unwrap();
    assert!(value["binance_price"].is_null());
    assert!(value["spread_percentage"].is_null());
    assert!(value["trades"].as_array().unwrap().is_empty());
}

#[test]
fn status_round_trips_through_json() {
    let raw = json!({
        "binance_price": null,
        "coinbase_price": 50_100.0,
        "price_gap": null,
        "spread_percentage": null,
        "trades_executed": 0,
        "total_profit": 0.0,
        "last_trade_time": null,
        "binance_last_update": null,
        "coinbase_last_update": 1_700_000_000.5
    });

    let status: StatusResponse = serde_json::from_value(raw.clone()).unwrap();
    assert!(status.binance_price.is_none());
    assert_eq!(status.coinbase_price, Some(50_100.0));

    assert_eq!(serde_json::to_value(&status).unwrap(), raw);
}

#[test]
fn ml_prediction_vocabulary() {
    let stats = MlStats::default();
    assert_eq!(stats.prediction, "hold");
    assert!((stats.accuracy - 0.5).abs() < 1e-12);
}
