//! Binance spot price feed via `barter-data`.
//!
//! Subscribes to the L1 order book for the configured symbol and publishes
//! the best-ask price (what the simulator pays to buy on Binance) into the
//! shared [`PriceBoard`]. Reconnection is handled by `barter-data`.

use anyhow::{Context, Result};
use barter_data::{
    exchange::binance::spot::BinanceSpot,
    streams::{reconnect::Event as ReconnectEvent, Streams},
    subscription::book::OrderBooksL1,
};
use barter_instrument::instrument::market_data::{
    kind::MarketDataInstrumentKind, MarketDataInstrument,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::feeds::PriceBoard;

type BinanceStreams = Streams<
    barter_data::streams::consumer::MarketStreamResult<
        MarketDataInstrument,
        barter_data::subscription::book::OrderBookL1,
    >,
>;

/// Initialise the stream and spawn the consumer task.
///
/// NOTE: `barter-data`'s `StreamBuilder` futures are `!Send`, so stream
/// initialisation must happen here rather than inside `tokio::spawn`.
pub async fn spawn(symbol: &str, board: Arc<PriceBoard>) -> Result<()> {
    let (base, quote) = split_symbol(symbol);
    info!(%symbol, %base, %quote, "starting binance L1 feed");

    let streams = init_streams(&base, &quote).await?;

    tokio::spawn(async move {
        if let Err(e) = consume(streams, board).await {
            warn!(error = %e, "binance price feed stopped");
        }
    });

    Ok(())
}

async fn consume(streams: BinanceStreams, board: Arc<PriceBoard>) -> Result<()> {
    let mut joined = streams.select_all();

    while let Some(event) = joined.next().await {
        match event {
            ReconnectEvent::Reconnecting(exchange) => {
                warn!(?exchange, "binance stream reconnecting");
            }
            ReconnectEvent::Item(result) => match result {
                Ok(market_event) => {
                    // Best ask is the executable buy price; discard books
                    // with an empty ask side.
                    let Some(ask) = market_event
                        .kind
                        .best_ask
                        .as_ref()
                        .map(|level| level.price)
                        .and_then(|d| d.to_string().parse::<f64>().ok())
                        .filter(|p| p.is_finite() && *p > 0.0)
                    else {
                        continue;
                    };

                    board.record_binance(ask);
                }
                Err(e) => {
                    debug!(error = %e, "binance market stream error");
                }
            },
        }
    }

    Ok(())
}

async fn init_streams(base: &str, quote: &str) -> Result<BinanceStreams> {
    Streams::<OrderBooksL1>::builder()
        .subscribe([(
            BinanceSpot::default(),
            base,
            quote,
            MarketDataInstrumentKind::Spot,
            OrderBooksL1,
        )])
        .init()
        .await
        .context("failed to init barter-data binance stream")
}

/// Split a Binance symbol into lowercase base/quote ("BTCUSDT" -> "btc"/"usdt").
fn split_symbol(symbol: &str) -> (String, String) {
    let upper = symbol.to_ascii_uppercase();
    for quote in ["USDT", "USDC", "BUSD", "USD"] {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return (base.to_ascii_lowercase(), quote.to_ascii_lowercase());
            }
        }
    }
    // Unknown quote currency; assume the last three characters.
    let split = upper.len().saturating_sub(3).max(1);
    (
        upper[..split].to_ascii_lowercase(),
        upper[split..].to_ascii_lowercase(),
    )
}
