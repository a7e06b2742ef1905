//! Coinbase Exchange ticker feed.
//!
//! Plain WebSocket client for the public `ticker` channel (last trade price),
//! with auto-reconnect and exponential backoff. The sell leg of every
//! simulated arbitrage executes against this price.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::feeds::PriceBoard;

/// Subscribe message for the Coinbase Exchange feed.
#[derive(Debug, Clone, Serialize)]
struct SubscribeMessage {
    #[serde(rename = "type")]
    msg_type: &'static str,
    product_ids: Vec<String>,
    channels: Vec<&'static str>,
}

pub struct CoinbaseFeed {
    ws_url: String,
    product_id: String,
    board: Arc<PriceBoard>,
}

impl CoinbaseFeed {
    pub fn new(ws_url: String, product_id: String, board: Arc<PriceBoard>) -> Self {
        Self {
            ws_url,
            product_id,
            board,
        }
    }

    /// Run forever, reconnecting on failures with exponential backoff.
    pub async fn run(&self) {
        let mut reconnect_delay = Duration::from_secs(1);
        let max_reconnect_delay = Duration::from_secs(60);

        loop {
            match self.connect_and_stream().await {
                Ok(()) => {
                    info!("coinbase websocket closed gracefully");
                    reconnect_delay = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(error = %e, "coinbase websocket error, reconnecting in {:?}", reconnect_delay);
                }
            }

            // Small jitter so restarts don't thundering-herd the feed.
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
            sleep(reconnect_delay + jitter).await;
            reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
        }
    }

    async fn connect_and_stream(&self) -> Result<()> {
        info!(url = %self.ws_url, product = %self.product_id, "connecting to coinbase websocket");

        let (ws_stream, response) = connect_async(&self.ws_url)
            .await
            .context("failed to connect to coinbase websocket")?;

        info!(status = %response.status(), "coinbase websocket connected");

        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscribeMessage {
            msg_type: "subscribe",
            product_ids: vec![self.product_id.clone()],
            channels: vec!["ticker"],
        };
        let sub_json =
            serde_json::to_string(&subscribe).context("failed to serialize subscription")?;
        write
            .send(Message::Text(sub_json))
            .await
            .context("failed to send subscription")?;

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                        let preview: String = text.chars().take(200).collect();
                        warn!("unparseable coinbase message: {}", preview);
                        continue;
                    };

                    match value.get("type").and_then(|t| t.as_str()) {
                        Some("ticker") => {
                            // Coinbase sends prices as strings.
                            let price = value
                                .get("price")
                                .and_then(|p| p.as_str())
                                .and_then(|p| p.parse::<f64>().ok())
                                .or_else(|| value.get("price").and_then(|p| p.as_f64()));

                            if let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) {
                                self.board.record_coinbase(price);
                            }
                        }
                        Some("subscriptions") => {
                            debug!("coinbase subscription confirmed");
                        }
                        Some("error") => {
                            warn!("coinbase feed error message: {}", text);
                        }
                        _ => {}
                    }
                }
                Ok(Message::Ping(ping)) => {
                    write
                        .send(Message::Pong(ping))
                        .await
                        .context("failed to send pong")?;
                }
                Ok(Message::Close(frame)) => {
                    info!(?frame, "coinbase websocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "coinbase websocket read error");
                    break;
                }
            }
        }

        Ok(())
    }
}
