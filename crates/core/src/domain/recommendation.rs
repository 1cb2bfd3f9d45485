use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// Persisted co-purchase recommendation, keyed by
/// `(product_id, recommended_product_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRecommendation {
    pub product_id: ProductId,
    pub recommended_product_id: ProductId,
    pub score: Decimal,
    pub generated_at: DateTime<Utc>,
}
