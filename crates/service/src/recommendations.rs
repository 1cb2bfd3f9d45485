use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use demandcast_core::domain::product::ProductId;
use demandcast_core::domain::recommendation::ProductRecommendation;
use demandcast_core::recommend::SimilarityEngine;

use crate::error::ServiceError;
use crate::IntelligenceService;

const RECOMMENDATION_HINT: &str = "Run refresh_recommendations first.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationRefreshReport {
    pub updated_product_count: usize,
    pub k: usize,
    pub row_count: usize,
    /// Products whose list came from global popularity.
    pub fallback_product_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationListItem {
    pub recommended_product_id: ProductId,
    pub score: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationList {
    pub product_id: ProductId,
    pub k: usize,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<RecommendationListItem>,
}

fn require_k(k: usize) -> Result<(), ServiceError> {
    if k == 0 {
        return Err(ServiceError::invalid_input("k must be greater than zero"));
    }
    Ok(())
}

impl IntelligenceService {
    /// Recompute top-`k` lists for every catalog product from the full order
    /// history and replace the stored set in one transaction.
    pub async fn refresh_recommendations(
        &self,
        k: usize,
    ) -> Result<RecommendationRefreshReport, ServiceError> {
        require_k(k)?;

        let lines = self.repositories.orders.all_lines().await?;
        if lines.is_empty() {
            info!(event_name = "recommendations.refresh.skipped", "no order lines recorded");
            return Ok(RecommendationRefreshReport {
                updated_product_count: 0,
                k,
                row_count: 0,
                fallback_product_count: 0,
                message: Some("No order_item data".to_string()),
            });
        }

        let catalog: Vec<ProductId> = self
            .repositories
            .catalog
            .list_products()
            .await?
            .into_iter()
            .map(|product| product.id)
            .collect();

        let engine = SimilarityEngine::from_lines(&lines);
        let set = engine.recommend_all(&catalog, k);
        let generated_at = self.clock.now();

        let mut rows = Vec::with_capacity(set.row_count());
        for (product_id, items) in &set.by_product {
            for item in items {
                let score = Decimal::from_f64(item.score)
                    .ok_or_else(|| {
                        ServiceError::invalid_input(format!(
                            "similarity score for {product_id} -> {} is not representable",
                            item.product_id
                        ))
                    })?
                    .round_dp(6);
                rows.push(ProductRecommendation {
                    product_id: *product_id,
                    recommended_product_id: item.product_id,
                    score,
                    generated_at,
                });
            }
        }

        let row_count = self.repositories.recommendations.replace_all(rows).await?;
        let fallback_product_count = set.fallback_product_count();

        info!(
            event_name = "recommendations.refresh.completed",
            product_count = set.product_count(),
            similarity_products = engine.matrix().product_count(),
            row_count,
            fallback_product_count,
            k,
            "recommendations refreshed"
        );

        Ok(RecommendationRefreshReport {
            updated_product_count: set.product_count(),
            k,
            row_count,
            fallback_product_count,
            message: None,
        })
    }

    pub async fn get_recommendations(
        &self,
        product_id: ProductId,
        k: usize,
    ) -> Result<RecommendationList, ServiceError> {
        require_k(k)?;

        let rows = self.repositories.recommendations.find_top(product_id, k).await?;
        let Some(generated_at) = rows.iter().map(|row| row.generated_at).max() else {
            return Err(ServiceError::NotFound {
                what: format!("Recommendations for product {product_id}"),
                hint: RECOMMENDATION_HINT.to_string(),
            });
        };

        Ok(RecommendationList {
            product_id,
            k,
            generated_at,
            items: rows
                .into_iter()
                .map(|row| RecommendationListItem {
                    recommended_product_id: row.recommended_product_id,
                    score: row.score,
                })
                .collect(),
        })
    }
}
