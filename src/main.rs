//! Arbitrage simulator entry point: feeds + strategy + dashboard API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
    routing::get,
    Router,
};
use dotenv::dotenv;
use parking_lot::RwLock;
use tokio::{net::TcpListener, sync::broadcast, time::interval};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbsim_backend::{
    api,
    feeds::{self, coinbase::CoinbaseFeed, PriceBoard},
    ledger::{PriorTotals, TradeLog, MAX_TRADES_IN_MEMORY},
    model::SpreadModel,
    models::{Config, WsFrame},
    storage::TradeStore,
    strategy::Strategy,
    AppState,
};

/// Dashboard frame push rate when no trade forces an immediate update.
const FRAME_INTERVAL_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Arc::new(Config::from_env()?);
    info!(
        "Arbitrage simulator starting: {} vs {} (testnet={})",
        config.binance_symbol, config.trading_pair, config.use_testnet
    );

    // Anchor the default DB path to the crate directory so running from a
    // different cwd doesn't silently create a fresh empty database.
    let db_path = resolve_data_path(&config.db_path);
    let store = Arc::new(TradeStore::new(&db_path)?);

    let ledger = seed_ledger(&store, config.initial_bankroll)?;
    info!(
        "Ledger seeded from {}: {} prior trades, cumulative P&L {:+.4}",
        db_path,
        ledger.trades_executed(),
        ledger.cumulative_pnl()
    );

    let (frame_tx, _frame_rx) = broadcast::channel::<WsFrame>(256);

    let state = AppState {
        prices: Arc::new(PriceBoard::new()),
        ledger: Arc::new(RwLock::new(ledger)),
        model: Arc::new(RwLock::new(SpreadModel::new(
            config.min_spread_pct,
            config.min_confidence,
        ))),
        store,
        frame_tx,
        config: config.clone(),
    };

    // Binance stream init is not Send, so it runs here before any spawn.
    feeds::binance::spawn(&config.binance_symbol, state.prices.clone()).await?;

    let coinbase = CoinbaseFeed::new(
        config.coinbase_ws_url.clone(),
        config.trading_pair.clone(),
        state.prices.clone(),
    );
    tokio::spawn(async move { coinbase.run().await });

    tokio::spawn(Strategy::new(state.clone()).run());
    tokio::spawn(frame_broadcaster(state.clone()));

    let app = Router::new()
        .route("/", get(api::get_root))
        .route("/health", get(api::get_health))
        .route("/status", get(api::get_status))
        .route("/trades", get(api::get_trades))
        .route("/stats", get(api::get_stats))
        .route("/ml-stats", get(api::get_ml_stats))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Rebuild the in-memory ledger from sqlite: replay the newest window of
/// fills, fold everything older into prior totals.
fn seed_ledger(store: &TradeStore, initial_bankroll: f64) -> Result<TradeLog> {
    let totals = store.totals()?;
    let mut window = store.recent(MAX_TRADES_IN_MEMORY)?;
    window.reverse(); // replay oldest-first

    let mut prior = PriorTotals {
        trades: totals.trades - window.len() as u64,
        profit: totals.profit,
        volume: totals.volume,
        wins: totals.wins,
    };
    for trade in &window {
        prior.profit -= trade.profit;
        prior.volume -= trade.amount;
        if trade.profit > 0.0 {
            prior.wins -= 1;
        }
    }

    let mut ledger = TradeLog::with_prior(initial_bankroll, prior);
    for trade in window {
        ledger.push(trade);
    }
    Ok(ledger)
}

/// Push a full snapshot frame to every dashboard client at a steady rate.
/// Fills additionally trigger an immediate push from the strategy loop.
async fn frame_broadcaster(state: AppState) {
    let mut ticker = interval(Duration::from_millis(FRAME_INTERVAL_MS));
    loop {
        ticker.tick().await;
        // Errors just mean nobody is connected.
        let _ = state.frame_tx.send(state.build_frame());
    }
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.frame_tx.subscribe();

    // On connect, immediately send a snapshot so the UI isn't empty until
    // the next broadcast tick.
    let snapshot = serde_json::to_string(&state.build_frame()).unwrap_or_else(|_| "{}".to_string());
    if socket.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            Ok(frame) = rx.recv() => {
                let msg = serde_json::to_string(&frame)
                    .unwrap_or_else(|e| {
                        warn!("Failed to serialize ws frame: {}", e);
                        "{}".to_string()
                    });
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            Some(Ok(msg)) = socket.recv() => {
                match msg {
                    Message::Text(text) => {
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                            if json.get("type").and_then(|t| t.as_str()) == Some("ping") {
                                // Echo back pong with the same timestamp for latency calculation
                                let timestamp = json.get("data")
                                    .and_then(|d| d.get("timestamp"))
                                    .and_then(|t| t.as_i64())
                                    .unwrap_or(0);
                                let pong = serde_json::json!({
                                    "type": "pong",
                                    "data": { "timestamp": timestamp }
                                });
                                let _ = socket.send(Message::Text(pong.to_string())).await;
                            }
                        } else if text == "ping" {
                            // Legacy plain text ping
                            let _ = socket.send(Message::Text("pong".to_string())).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbsim_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), plus the crate directory for
    // runs launched with --manifest-path from elsewhere.
    let _ = dotenv();

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidates = [manifest_dir.join(".env"), manifest_dir.join("../.env")];
    for p in candidates {
        if p.exists() {
            let _ = dotenv::from_path(&p);
        }
    }
}

/// Relative DB paths resolve against the crate directory, not the cwd.
fn resolve_data_path(raw: &str) -> String {
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(p)
        .to_string_lossy()
        .to_string()
}
