//! Market-snapshot preprocessing for the predictive model.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::TradeIntent;

/// Number of features produced by [`preprocess`]
pub const FEATURE_DIM: usize = 5;

/// Fixed-order feature vector fed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFeatures {
    pub values: Vec<f64>,
}

impl ModelFeatures {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Features: spread, momentum, realized volatility, log volume, and the
/// deviation of the intent's implied price from mid (all in bps except volume).
pub fn preprocess(intent: &TradeIntent) -> ModelFeatures {
    let snapshot = &intent.market;
    let spread_bps = snapshot.spread_bps.to_f64().unwrap_or(0.0);

    let prices: Vec<f64> = snapshot
        .recent_prices
        .iter()
        .filter_map(|p| p.to_f64())
        .filter(|p| *p > 0.0)
        .collect();

    let momentum_bps = match (prices.first(), prices.last()) {
        (Some(first), Some(last)) if prices.len() >= 2 => (last / first - 1.0) * 10_000.0,
        _ => 0.0,
    };

    let volatility_bps = if prices.len() >= 3 {
        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
        var.sqrt() * 10_000.0
    } else {
        0.0
    };

    let log_volume = snapshot.volume_24h.to_f64().unwrap_or(0.0).max(0.0).ln_1p();

    // A ratio outside Decimal range is unusable; NaN makes the model input non-finite
    let deviation_bps = match (intent.implied_price(), snapshot.mid_price) {
        (Some(implied), mid) if mid > Decimal::ZERO => match implied.checked_div(mid) {
            Some(ratio) => (ratio.to_f64().unwrap_or(1.0) - 1.0) * 10_000.0,
            None => f64::NAN,
        },
        _ => 0.0,
    };

    ModelFeatures {
        values: vec![spread_bps, momentum_bps, volatility_bps, log_volume, deviation_bps],
    }
}
