//! REST handlers for the dashboard.
//!
//! Response shapes match what the frontend deserializes; `/trades` returns
//! a bare array, not a wrapper object.

use axum::{
    extract::{Query, State as AxumState},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{MlStats, StatusResponse, TradeRecord, TradeStats};
use crate::AppState;

const DEFAULT_TRADE_LIMIT: usize = 50;
const MAX_TRADE_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct TradeQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: TradeStats,
    pub timestamp: String,
}

pub async fn get_root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "HFT Arbitrage API is running"
    }))
}

pub async fn get_health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn get_status(AxumState(state): AxumState<AppState>) -> Json<StatusResponse> {
    Json(state.build_status())
}

/// Trade history, newest first.
pub async fn get_trades(
    Query(params): Query<TradeQuery>,
    AxumState(state): AxumState<AppState>,
) -> Json<Vec<TradeRecord>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TRADE_LIMIT)
        .clamp(1, MAX_TRADE_LIMIT);
    Json(state.ledger.read().recent(limit))
}

pub async fn get_stats(AxumState(state): AxumState<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.ledger.read().stats(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub async fn get_ml_stats(AxumState(state): AxumState<AppState>) -> Json<MlStats> {
    Json(state.model.read().stats())
}
