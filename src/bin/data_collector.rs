//! Historical Dataset Collector CLI
//!
//! Pulls matched 1m candles from Binance and Coinbase, derives spread
//! features and labels, and writes a training CSV.
//!
//! Usage:
//!   cargo run --release --bin data_collector -- --days 7 --output data/arbitrage_data.csv

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use arbsim_backend::collector::collect_historical;
use arbsim_backend::models::Config;

#[derive(Parser, Debug)]
#[command(name = "data_collector")]
#[command(about = "Collect historical cross-exchange candles into a training CSV")]
struct Args {
    /// Days of history to collect
    #[arg(long, default_value = "7")]
    days: i64,

    /// Candle interval: 1m, 5m, 15m, 1h
    #[arg(long, default_value = "1m")]
    interval: String,

    /// Output CSV path; defaults to data/arbitrage_data_<start>_<end>.csv
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("data_collector=info".parse().unwrap())
                .add_directive("arbsim_backend=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let output = match args.output {
        Some(path) => path,
        None => {
            let end = chrono::Utc::now().date_naive();
            let start = end - chrono::Duration::days(args.days);
            let dir = PathBuf::from("data");
            std::fs::create_dir_all(&dir).context("Failed to create data directory")?;
            dir.join(format!("arbitrage_data_{}_{}.csv", start, end))
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(concat!("arbsim-backend/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let rows = collect_historical(
        &client,
        &config.binance_symbol,
        &config.trading_pair,
        &args.interval,
        args.days,
        config.binance_fee,
        config.coinbase_fee,
        &output,
    )
    .await?;

    info!("Done: {} dataset rows at {}", rows, output.display());
    Ok(())
}
