//! Historical dataset collection for model research.
//!
//! Pulls 1m candles from Binance and Coinbase REST, inner-joins them on
//! timestamp, and derives the spread features and profitability label the
//! training pipeline consumes. Output is a flat CSV.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use statrs::statistics::Statistics;
use tracing::{info, warn};

const BINANCE_KLINES_URL: &str = "https://api.binance.com/api/v3/klines";
const COINBASE_CANDLES_URL: &str = "https://api.exchange.coinbase.com/products";

/// Binance allows 1000 klines per request, Coinbase 300 candles.
const BINANCE_CHUNK_CANDLES: i64 = 1000;
const COINBASE_CHUNK_CANDLES: i64 = 300;

/// Pause between REST requests to stay clear of rate limits.
const REQUEST_PAUSE: Duration = Duration::from_secs(1);

/// Rolling feature windows, in candles.
const FEATURE_WINDOWS: [usize; 3] = [5, 10, 20];

/// One close price at a candle boundary.
#[derive(Debug, Clone, Copy)]
pub struct Candle {
    /// Candle open time, unix seconds.
    pub ts: i64,
    pub close: f64,
}

/// Joined row before feature derivation.
#[derive(Debug, Clone, Copy)]
pub struct MergedRow {
    pub ts: i64,
    pub binance_price: f64,
    pub coinbase_price: f64,
}

/// One dataset row: prices, costs, label, and rolling spread features
/// for each window in [`FEATURE_WINDOWS`].
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub ts: i64,
    pub binance_price: f64,
    pub coinbase_price: f64,
    pub price_diff: f64,
    pub spread_pct: f64,
    pub binance_fee: f64,
    pub coinbase_fee: f64,
    pub total_fee_cost: f64,
    pub net_profit: f64,
    /// 1 when net_profit > 0.
    pub label: u8,
    /// (ma, std, trend) per window, in FEATURE_WINDOWS order.
    pub windows: [(f64, f64, f64); 3],
}

pub fn interval_seconds(interval: &str) -> Result<i64> {
    Ok(match interval {
        "1m" => 60,
        "5m" => 300,
        "15m" => 900,
        "1h" => 3600,
        other => bail!("Unsupported candle interval: {}", other),
    })
}

pub async fn fetch_binance_klines(
    client: &Client,
    symbol: &str,
    interval: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<Candle>> {
    let resp = client
        .get(BINANCE_KLINES_URL)
        .query(&[
            ("symbol", symbol),
            ("interval", interval),
            ("startTime", &start_ms.to_string()),
            ("endTime", &end_ms.to_string()),
            ("limit", &BINANCE_CHUNK_CANDLES.to_string()),
        ])
        .send()
        .await?
        .error_for_status()
        .context("Binance klines request failed")?;

    let rows: Vec<serde_json::Value> = resp.json().await?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in &rows {
        // [open_time_ms, "open", "high", "low", "close", "volume", ...]
        // with prices encoded as strings.
        let ts_ms = row.get(0).and_then(|v| v.as_i64());
        let close = row
            .get(4)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok());
        match (ts_ms, close) {
            (Some(ts_ms), Some(close)) if close > 0.0 => candles.push(Candle {
                ts: ts_ms / 1000,
                close,
            }),
            _ => warn!("Skipping malformed Binance kline row"),
        }
    }
    Ok(candles)
}

pub async fn fetch_coinbase_candles(
    client: &Client,
    product_id: &str,
    granularity: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Candle>> {
    let url = format!("{}/{}/candles", COINBASE_CANDLES_URL, product_id);
    let resp = client
        .get(&url)
        .query(&[
            ("granularity", granularity.to_string()),
            ("start", start.to_rfc3339()),
            ("end", end.to_rfc3339()),
        ])
        .send()
        .await?
        .error_for_status()
        .context("Coinbase candles request failed")?;

    let rows: Vec<serde_json::Value> = resp.json().await?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in &rows {
        // [time_s, low, high, open, close, volume], all numeric.
        let ts = row.get(0).and_then(|v| v.as_i64());
        let close = row.get(4).and_then(|v| v.as_f64());
        match (ts, close) {
            (Some(ts), Some(close)) if close > 0.0 => candles.push(Candle { ts, close }),
            _ => warn!("Skipping malformed Coinbase candle row"),
        }
    }
    // Coinbase returns newest-first.
    candles.sort_by_key(|c| c.ts);
    Ok(candles)
}

/// Inner-join the two series on candle timestamp, ascending.
pub fn merge_on_timestamp(binance: &[Candle], coinbase: &[Candle]) -> Vec<MergedRow> {
    let coinbase_by_ts: HashMap<i64, f64> = coinbase.iter().map(|c| (c.ts, c.close)).collect();

    let mut merged: Vec<MergedRow> = binance
        .iter()
        .filter_map(|b| {
            coinbase_by_ts.get(&b.ts).map(|&c| MergedRow {
                ts: b.ts,
                binance_price: b.close,
                coinbase_price: c,
            })
        })
        .collect();
    merged.sort_by_key(|r| r.ts);
    merged.dedup_by_key(|r| r.ts);
    merged
}

/// Derive the spread features and profitability labels.
///
/// Rows without a full largest-window history are dropped, mirroring how
/// the training pipeline discards incomplete rolling features.
pub fn compute_features(
    rows: &[MergedRow],
    binance_fee: f64,
    coinbase_fee: f64,
) -> Vec<FeatureRow> {
    let spreads: Vec<f64> = rows
        .iter()
        .map(|r| (r.coinbase_price - r.binance_price) / r.binance_price * 100.0)
        .collect();

    let max_window = *FEATURE_WINDOWS.iter().max().unwrap_or(&0);
    let mut out = Vec::with_capacity(rows.len().saturating_sub(max_window));

    for (i, row) in rows.iter().enumerate() {
        // trend over the largest window needs max_window prior spreads.
        if i < max_window {
            continue;
        }

        let mut windows = [(0.0, 0.0, 0.0); 3];
        for (slot, &w) in FEATURE_WINDOWS.iter().enumerate() {
            let slice = &spreads[i + 1 - w..=i];
            let ma = slice.iter().copied().mean();
            let std = if w > 1 { slice.iter().copied().std_dev() } else { 0.0 };
            let trend = spreads[i] - spreads[i - w];
            windows[slot] = (ma, std, trend);
        }

        let price_diff = row.coinbase_price - row.binance_price;
        let binance_fee_cost = row.binance_price * binance_fee;
        let coinbase_fee_cost = row.coinbase_price * coinbase_fee;
        let total_fee_cost = binance_fee_cost + coinbase_fee_cost;
        let net_profit = price_diff - total_fee_cost;

        out.push(FeatureRow {
            ts: row.ts,
            binance_price: row.binance_price,
            coinbase_price: row.coinbase_price,
            price_diff,
            spread_pct: spreads[i],
            binance_fee: binance_fee_cost,
            coinbase_fee: coinbase_fee_cost,
            total_fee_cost,
            net_profit,
            label: u8::from(net_profit > 0.0),
            windows,
        });
    }
    out
}

pub fn csv_header() -> String {
    let mut header = String::from(
        "timestamp,binance_price,coinbase_price,price_diff,spread_pct,\
         binance_fee,coinbase_fee,total_fee_cost,net_profit,label",
    );
    for w in FEATURE_WINDOWS {
        header.push_str(&format!(",spread_ma_{w},spread_std_{w},spread_trend_{w}"));
    }
    header
}

pub fn write_csv(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);

    writeln!(out, "{}", csv_header())?;
    for row in rows {
        let datetime = Utc
            .timestamp_opt(row.ts, 0)
            .single()
            .unwrap_or_else(Utc::now);
        write!(
            out,
            "{},{},{},{},{},{},{},{},{},{}",
            datetime.to_rfc3339(),
            row.binance_price,
            row.coinbase_price,
            row.price_diff,
            row.spread_pct,
            row.binance_fee,
            row.coinbase_fee,
            row.total_fee_cost,
            row.net_profit,
            row.label,
        )?;
        for (ma, std, trend) in row.windows {
            write!(out, ",{},{},{}", ma, std, trend)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Fetch `days` of candles from both venues in API-sized chunks,
/// join, featurize, and write the dataset to `output`.
pub async fn collect_historical(
    client: &Client,
    binance_symbol: &str,
    product_id: &str,
    interval: &str,
    days: i64,
    binance_fee: f64,
    coinbase_fee: f64,
    output: &Path,
) -> Result<usize> {
    let step = interval_seconds(interval)?;
    let end = Utc::now();
    let start = end - chrono::Duration::days(days);
    info!(
        "Collecting {} days of {} candles: {} / {}",
        days, interval, binance_symbol, product_id
    );

    let mut binance = Vec::new();
    let mut cursor = start.timestamp();
    while cursor < end.timestamp() {
        let chunk_end = (cursor + step * BINANCE_CHUNK_CANDLES).min(end.timestamp());
        let chunk =
            fetch_binance_klines(client, binance_symbol, interval, cursor * 1000, chunk_end * 1000)
                .await?;
        binance.extend(chunk);
        cursor = chunk_end;
        tokio::time::sleep(REQUEST_PAUSE).await;
    }

    let mut coinbase = Vec::new();
    let mut cursor = start.timestamp();
    while cursor < end.timestamp() {
        let chunk_end = (cursor + step * COINBASE_CHUNK_CANDLES).min(end.timestamp());
        let chunk_start = Utc
            .timestamp_opt(cursor, 0)
            .single()
            .context("Invalid chunk start")?;
        let chunk_end_dt = Utc
            .timestamp_opt(chunk_end, 0)
            .single()
            .context("Invalid chunk end")?;
        let chunk =
            fetch_coinbase_candles(client, product_id, step, chunk_start, chunk_end_dt).await?;
        coinbase.extend(chunk);
        cursor = chunk_end;
        tokio::time::sleep(REQUEST_PAUSE).await;
    }

    info!(
        "Collected {} Binance and {} Coinbase candles",
        binance.len(),
        coinbase.len()
    );

    let merged = merge_on_timestamp(&binance, &coinbase);
    let features = compute_features(&merged, binance_fee, coinbase_fee);
    let profitable = features.iter().filter(|r| r.label == 1).count();
    info!(
        "Dataset: {} rows, {} profitable ({:.2}%)",
        features.len(),
        profitable,
        if features.is_empty() {
            0.0
        } else {
            profitable as f64 / features.len() as f64 * 100.0
        }
    );

    write_csv(output, &features)?;
    info!("Dataset written to {}", output.display());
    Ok(features.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[(i64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .map(|&(ts, close)| Candle { ts, close })
            .collect()
    }

    #[test]
    fn test_merge_is_inner_join_on_timestamp() {
        let binance = series(&[(60, 100.0), (120, 101.0), (180, 102.0)]);
        let coinbase = series(&[(120, 101.5), (180, 102.5), (240, 103.0)]);

        let merged = merge_on_timestamp(&binance, &coinbase);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].ts, 120);
        assert_eq!(merged[0].binance_price, 101.0);
        assert_eq!(merged[0].coinbase_price, 101.5);
        assert_eq!(merged[1].ts, 180);
    }

    #[test]
    fn test_features_drop_incomplete_windows() {
        let rows: Vec<MergedRow> = (0..30)
            .map(|i| MergedRow {
                ts: 60 * i,
                binance_price: 100.0,
                coinbase_price: 100.2,
            })
            .collect();

        let features = compute_features(&rows, 0.001, 0.005);
        // Largest window is 20, so the first 20 rows are dropped.
        assert_eq!(features.len(), 10);
    }

    #[test]
    fn test_constant_spread_features() {
        let rows: Vec<MergedRow> = (0..25)
            .map(|i| MergedRow {
                ts: 60 * i,
                binance_price: 100.0,
                coinbase_price: 101.0,
            })
            .collect();

        let features = compute_features(&rows, 0.001, 0.005);
        let row = &features[0];
        assert!((row.spread_pct - 1.0).abs() < 1e-12);
        for (ma, std, trend) in row.windows {
            assert!((ma - 1.0).abs() < 1e-12);
            assert!(std.abs() < 1e-9);
            assert!(trend.abs() < 1e-12);
        }
        // diff 1.0 clears fees 0.1 + 0.505.
        assert!((row.net_profit - (1.0 - 0.1 - 0.505)).abs() < 1e-12);
        assert_eq!(row.label, 1);
    }

    #[test]
    fn test_label_flips_on_fee_coverage() {
        // Spread too thin to cover fees.
        let thin: Vec<MergedRow> = (0..25)
            .map(|i| MergedRow {
                ts: 60 * i,
                binance_price: 100.0,
                coinbase_price: 100.2,
            })
            .collect();
        let features = compute_features(&thin, 0.001, 0.005);
        assert!(features.iter().all(|r| r.label == 0));
    }

    #[test]
    fn test_empty_venue_yields_header_only_csv() {
        // One venue returning nothing empties the inner join; the dataset
        // must still be a valid CSV with just the header.
        let coinbase = series(&[(60, 100.0), (120, 100.5)]);
        let merged = merge_on_timestamp(&[], &coinbase);
        assert!(merged.is_empty());

        let features = compute_features(&merged, 0.001, 0.005);
        assert!(features.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        write_csv(&path, &features).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim_end(), csv_header());
    }

    #[test]
    fn test_csv_header_lists_all_windows() {
        let header = csv_header();
        for w in FEATURE_WINDOWS {
            assert!(header.contains(&format!("spread_ma_{w}")));
            assert!(header.contains(&format!("spread_std_{w}")));
            assert!(header.contains(&format!("spread_trend_{w}")));
        }
    }

    #[test]
    fn test_interval_seconds() {
        assert_eq!(interval_seconds("1m").unwrap(), 60);
        assert_eq!(interval_seconds("1h").unwrap(), 3600);
        assert!(interval_seconds("2d").is_err());
    }
}
