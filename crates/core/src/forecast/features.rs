use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Schema tag persisted with every trained model. Bump whenever the field
/// list below changes so stale artifacts are rejected on load.
pub const FEATURE_SET: &str = "v2";

pub const FEATURE_COUNT: usize = 10;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "dow",
    "lag_1",
    "lag_7",
    "lag_14",
    "roll_7",
    "roll_14",
    "roll_30",
    "std_7",
    "zero_rate_30",
    "days_hist",
];

/// Fixed-order feature tuple describing a history window as seen from a
/// target day.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Monday = 0 .. Sunday = 6.
    pub dow: u32,
    pub lag_1: f64,
    pub lag_7: f64,
    pub lag_14: f64,
    pub roll_7: f64,
    pub roll_14: f64,
    pub roll_30: f64,
    /// Population standard deviation.
    pub std_7: f64,
    pub zero_rate_30: f64,
    pub days_hist: usize,
}

impl FeatureVector {
    /// Featurize `history` (oldest first) for `day`. Windows longer than the
    /// history fall back to the whole history; lags beyond it read as zero.
    pub fn extract(history: &[f64], day: NaiveDate) -> Self {
        Self {
            dow: day.weekday().num_days_from_monday(),
            lag_1: lag(history, 1),
            lag_7: lag(history, 7),
            lag_14: lag(history, 14),
            roll_7: mean(window(history, 7)),
            roll_14: mean(window(history, 14)),
            roll_30: mean(window(history, 30)),
            std_7: std_dev(window(history, 7)),
            zero_rate_30: zero_rate(window(history, 30)),
            days_hist: history.len(),
        }
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.dow),
            self.lag_1,
            self.lag_7,
            self.lag_14,
            self.roll_7,
            self.roll_14,
            self.roll_30,
            self.std_7,
            self.zero_rate_30,
            self.days_hist as f64,
        ]
    }
}

fn lag(history: &[f64], n: usize) -> f64 {
    if history.len() >= n {
        history[history.len() - n]
    } else {
        0.0
    }
}

fn window(history: &[f64], n: usize) -> &[f64] {
    &history[history.len().saturating_sub(n)..]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance =
        values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

// No history is treated as "always zero".
fn zero_rate(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    values.iter().filter(|value| **value == 0.0).count() as f64 / values.len() as f64
}
