//! Spread prediction model.
//!
//! Stand-in for the XGBoost classifier the training pipeline produces: a
//! fixed logistic scorer over the same rolling-window features
//! (moving average, volatility, trend of the recent spread series). The
//! decision boundary mirrors the bundled dummy model, which labels a window
//! profitable when its mean spread exceeds ~0.1%.
//!
//! Unlike the dashboard's placeholder panel, `accuracy` here is measured:
//! every executed trade resolves the prediction that triggered it.

use chrono::Utc;
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::time::Instant;

use crate::models::MlStats;

/// Spread observations required before the model will predict.
pub const SPREAD_WINDOW: usize = 10;

/// Resolved predictions kept for the rolling accuracy estimate.
const ACCURACY_WINDOW: usize = 100;

/// Decision boundary of the bundled model: window mean spread, in percent.
const MEAN_SPREAD_BOUNDARY: f64 = 0.1;

// Logistic weights. Mean dominates (it defines the label in training),
// trend adds momentum, volatility dampens.
const W_MEAN: f64 = 8.0;
const W_TREND: f64 = 1.5;
const W_STD: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub is_profitable: bool,
    pub confidence: f64,
}

pub struct SpreadModel {
    spreads: VecDeque<f64>,
    /// true = prediction matched the realized outcome.
    resolutions: VecDeque<bool>,
    min_spread_pct: f64,
    min_confidence: f64,
    last_stats: MlStats,
}

impl SpreadModel {
    pub fn new(min_spread_pct: f64, min_confidence: f64) -> Self {
        Self {
            spreads: VecDeque::with_capacity(SPREAD_WINDOW),
            resolutions: VecDeque::with_capacity(ACCURACY_WINDOW),
            min_spread_pct,
            min_confidence,
            last_stats: MlStats::default(),
        }
    }

    /// Push the latest observed spread (percent) into the window.
    pub fn update(&mut self, spread_pct: f64) {
        if !spread_pct.is_finite() {
            return;
        }
        self.spreads.push_back(spread_pct);
        while self.spreads.len() > SPREAD_WINDOW {
            self.spreads.pop_front();
        }
    }

    /// Score the current window. `None` until the window is full.
    pub fn predict(&mut self) -> Option<Prediction> {
        if self.spreads.len() < SPREAD_WINDOW {
            return None;
        }

        let started = Instant::now();

        let window: Vec<f64> = self.spreads.iter().copied().collect();
        let current = *window.last().expect("window is full");
        let mean = window.iter().mean();
        let std = window.iter().population_std_dev();
        let trend_5 = current - window[window.len() - 5];

        let z = W_MEAN * (mean - MEAN_SPREAD_BOUNDARY) + W_TREND * trend_5 - W_STD * std;
        let confidence = sigmoid(z);
        let is_profitable = confidence > 0.5;

        let latency_ms = started.elapsed().as_secs_f64() * 1e3;

        let prediction_label = if is_profitable && confidence >= self.min_confidence {
            "buy"
        } else if mean < -self.min_spread_pct {
            // Inverted spread: Coinbase cheaper than Binance. The simulator
            // only trades the forward direction, so this surfaces as "sell".
            "sell"
        } else {
            "hold"
        };

        self.last_stats = MlStats {
            confidence,
            signal_strength: signal_strength(current, self.min_spread_pct),
            accuracy: self.accuracy(),
            latency: latency_ms,
            prediction: prediction_label.to_string(),
            last_update: Utc::now(),
        };

        Some(Prediction {
            is_profitable,
            confidence,
        })
    }

    /// Resolve an executed trade's prediction against its realized outcome.
    pub fn resolve(&mut self, predicted_profitable: bool, realized_profitable: bool) {
        self.resolutions
            .push_back(predicted_profitable == realized_profitable);
        while self.resolutions.len() > ACCURACY_WINDOW {
            self.resolutions.pop_front();
        }
        self.last_stats.accuracy = self.accuracy();
    }

    /// Rolling prediction accuracy; 0.5 prior with no resolutions yet.
    pub fn accuracy(&self) -> f64 {
        if self.resolutions.is_empty() {
            return 0.5;
        }
        let correct = self.resolutions.iter().filter(|&&c| c).count();
        correct as f64 / self.resolutions.len() as f64
    }

    /// Latest panel payload (last prediction's numbers).
    pub fn stats(&self) -> MlStats {
        self.last_stats.clone()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Squash spread excess over the entry threshold into [0, 1].
fn signal_strength(spread_pct: f64, min_spread_pct: f64) -> f64 {
    if min_spread_pct <= 0.0 {
        return sigmoid(spread_pct);
    }
    ((spread_pct - min_spread_pct) / (3.0 * min_spread_pct)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_model(spread: f64) -> SpreadModel {
        let mut model = SpreadModel::new(0.05, 0.7);
        for _ in 0..SPREAD_WINDOW {
            model.update(spread);
        }
        model
    }

    #[test]
    fn test_no_prediction_until_window_full() {
        let mut model = SpreadModel::new(0.05, 0.7);
        for i in 0..SPREAD_WINDOW - 1 {
            model.update(0.2);
            assert!(model.predict().is_none(), "predicted after {} spreads", i + 1);
        }
        model.update(0.2);
        assert!(model.predict().is_some());
    }

    #[test]
    fn test_wide_stable_spread_is_profitable() {
        let mut model = filled_model(0.3);
        let prediction = model.predict().expect("window full");
        assert!(prediction.is_profitable);
        assert!(prediction.confidence > 0.7);
        assert_eq!(model.stats().prediction, "buy");
    }

    #[test]
    fn test_flat_spread_is_not_profitable() {
        let mut model = filled_model(0.0);
        let prediction = model.predict().expect("window full");
        assert!(!prediction.is_profitable);
        assert!(prediction.confidence < 0.5);
        assert_eq!(model.stats().prediction, "hold");
    }

    #[test]
    fn test_inverted_spread_reports_sell() {
        let mut model = filled_model(-0.3);
        let prediction = model.predict().expect("window full");
        assert!(!prediction.is_profitable);
        assert_eq!(model.stats().prediction, "sell");
    }

    #[test]
    fn test_volatility_dampens_confidence() {
        let mut stable = filled_model(0.2);
        let stable_conf = stable.predict().unwrap().confidence;

        let mut choppy = SpreadModel::new(0.05, 0.7);
        for i in 0..SPREAD_WINDOW {
            // Same mean (0.2) but alternating around it.
            let spread = if i % 2 == 0 { 0.5 } else { -0.1 };
            choppy.update(spread);
        }
        let choppy_conf = choppy.predict().unwrap().confidence;

        assert!(choppy_conf < stable_conf);
    }

    #[test]
    fn test_accuracy_tracks_resolutions() {
        let mut model = SpreadModel::new(0.05, 0.7);
        assert_eq!(model.accuracy(), 0.5);

        model.resolve(true, true);
        model.resolve(true, true);
        model.resolve(true, false);
        model.resolve(true, true);

        assert!((model.accuracy() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_spreads_skipped() {
        let mut model = SpreadModel::new(0.05, 0.7);
        for _ in 0..SPREAD_WINDOW {
            model.update(f64::NAN);
        }
        assert!(model.predict().is_none());
    }
}
