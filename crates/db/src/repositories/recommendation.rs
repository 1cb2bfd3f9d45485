use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use demandcast_core::domain::product::ProductId;
use demandcast_core::domain::recommendation::ProductRecommendation;

use super::{format_timestamp, parse_timestamp, RecommendationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRecommendationRepository {
    pool: DbPool,
}

impl SqlRecommendationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn recommendation_from_row(row: SqliteRow) -> Result<ProductRecommendation, RepositoryError> {
    let product_id: i64 =
        row.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recommended_product_id: i64 = row
        .try_get("recommended_product_id")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let score: String = row.try_get("score").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let generated_at: String =
        row.try_get("generated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ProductRecommendation {
        product_id: ProductId(product_id),
        recommended_product_id: ProductId(recommended_product_id),
        score: Decimal::from_str(&score)
            .map_err(|e| RepositoryError::Decode(format!("score: {e}")))?,
        generated_at: parse_timestamp("generated_at", &generated_at)?,
    })
}

#[async_trait::async_trait]
impl RecommendationRepository for SqlRecommendationRepository {
    async fn replace_all(
        &self,
        recommendations: Vec<ProductRecommendation>,
    ) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM product_recommendation").execute(&mut *tx).await?;
        for recommendation in &recommendations {
            sqlx::query(
                "INSERT INTO product_recommendation (
                    product_id,
                    recommended_product_id,
                    score,
                    generated_at
                 ) VALUES (?, ?, ?, ?)
                 ON CONFLICT(product_id, recommended_product_id) DO UPDATE SET
                    score = excluded.score,
                    generated_at = excluded.generated_at",
            )
            .bind(recommendation.product_id.0)
            .bind(recommendation.recommended_product_id.0)
            .bind(recommendation.score.to_string())
            .bind(format_timestamp(recommendation.generated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(recommendations.len())
    }

    async fn find_top(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<ProductRecommendation>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT product_id, recommended_product_id, score, generated_at
             FROM product_recommendation
             WHERE product_id = ?
             ORDER BY CAST(score AS REAL) DESC, recommended_product_id ASC
             LIMIT ?",
        )
        .bind(product_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(recommendation_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use demandcast_core::domain::product::ProductId;
    use demandcast_core::domain::recommendation::ProductRecommendation;

    use super::SqlRecommendationRepository;
    use crate::repositories::{RecommendationRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn recommendation(product: i64, recommended: i64, score: Decimal) -> ProductRecommendation {
        ProductRecommendation {
            product_id: ProductId(product),
            recommended_product_id: ProductId(recommended),
            score,
            generated_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).single().expect("valid time"),
        }
    }

    #[tokio::test]
    async fn find_top_orders_numerically_and_limits() {
        let repo = SqlRecommendationRepository::new(setup().await);
        repo.replace_all(vec![
            recommendation(1, 2, Decimal::new(1, 1)),
            recommendation(1, 3, Decimal::new(894427, 6)),
            recommendation(1, 4, Decimal::ONE),
            recommendation(1, 5, Decimal::new(1, 1)),
            recommendation(2, 1, Decimal::new(5, 1)),
        ])
        .await
        .expect("replace");

        let top = repo.find_top(ProductId(1), 3).await.expect("find");
        let ids: Vec<i64> = top.iter().map(|row| row.recommended_product_id.0).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn replace_all_drops_stale_neighbors() {
        let repo = SqlRecommendationRepository::new(setup().await);
        repo.replace_all(vec![
            recommendation(1, 2, Decimal::new(5, 1)),
            recommendation(1, 3, Decimal::new(4, 1)),
        ])
        .await
        .expect("first");
        repo.replace_all(vec![recommendation(1, 4, Decimal::new(7, 1))]).await.expect("second");

        let top = repo.find_top(ProductId(1), 10).await.expect("find");
        assert_eq!(top, vec![recommendation(1, 4, Decimal::new(7, 1))]);
    }

    #[tokio::test]
    async fn failed_replace_keeps_previous_set() {
        let repo = SqlRecommendationRepository::new(setup().await);
        repo.replace_all(vec![recommendation(1, 2, Decimal::new(5, 1))]).await.expect("seed");

        // A self-recommendation violates the table CHECK and aborts the batch.
        let result = repo
            .replace_all(vec![
                recommendation(1, 3, Decimal::new(9, 1)),
                recommendation(1, 1, Decimal::ONE),
            ])
            .await;
        assert!(matches!(result, Err(RepositoryError::Database(_))));

        let top = repo.find_top(ProductId(1), 10).await.expect("find");
        assert_eq!(top, vec![recommendation(1, 2, Decimal::new(5, 1))]);
    }
}
