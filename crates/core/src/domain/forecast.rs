use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// Persisted demand forecast, keyed by `(product_id, forecast_days)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductForecast {
    pub product_id: ProductId,
    pub forecast_days: u32,
    pub predicted_qty: Decimal,
    pub recommended_reorder_qty: i64,
    pub generated_at: DateTime<Utc>,
}
