use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use demandcast_core::domain::forecast::ProductForecast;
use demandcast_core::domain::product::ProductId;

use super::{format_timestamp, parse_timestamp, ForecastRepository, RepositoryError};
use crate::DbPool;

pub struct SqlForecastRepository {
    pool: DbPool,
}

impl SqlForecastRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn forecast_from_row(row: SqliteRow) -> Result<ProductForecast, RepositoryError> {
    let product_id: i64 =
        row.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let forecast_days: i64 =
        row.try_get("forecast_days").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let predicted_qty: String =
        row.try_get("predicted_qty").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recommended_reorder_qty: i64 = row
        .try_get("recommended_reorder_qty")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let generated_at: String =
        row.try_get("generated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ProductForecast {
        product_id: ProductId(product_id),
        forecast_days: u32::try_from(forecast_days)
            .map_err(|e| RepositoryError::Decode(format!("forecast_days: {e}")))?,
        predicted_qty: Decimal::from_str(&predicted_qty)
            .map_err(|e| RepositoryError::Decode(format!("predicted_qty: {e}")))?,
        recommended_reorder_qty,
        generated_at: parse_timestamp("generated_at", &generated_at)?,
    })
}

#[async_trait::async_trait]
impl ForecastRepository for SqlForecastRepository {
    async fn upsert_all(&self, forecasts: Vec<ProductForecast>) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for forecast in &forecasts {
            sqlx::query(
                "INSERT INTO product_forecast (
                    product_id,
                    forecast_days,
                    predicted_qty,
                    recommended_reorder_qty,
                    generated_at
                 ) VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(product_id, forecast_days) DO UPDATE SET
                    predicted_qty = excluded.predicted_qty,
                    recommended_reorder_qty = excluded.recommended_reorder_qty,
                    generated_at = excluded.generated_at",
            )
            .bind(forecast.product_id.0)
            .bind(i64::from(forecast.forecast_days))
            .bind(forecast.predicted_qty.to_string())
            .bind(forecast.recommended_reorder_qty)
            .bind(format_timestamp(forecast.generated_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(forecasts.len())
    }

    async fn find_latest(
        &self,
        product_id: ProductId,
        forecast_days: u32,
    ) -> Result<Option<ProductForecast>, RepositoryError> {
        let row = sqlx::query(
            "SELECT product_id, forecast_days, predicted_qty, recommended_reorder_qty, generated_at
             FROM product_forecast
             WHERE product_id = ? AND forecast_days = ?
             ORDER BY generated_at DESC
             LIMIT 1",
        )
        .bind(product_id.0)
        .bind(i64::from(forecast_days))
        .fetch_optional(&self.pool)
        .await?;

        row.map(forecast_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use demandcast_core::domain::forecast::ProductForecast;
    use demandcast_core::domain::product::ProductId;

    use super::SqlForecastRepository;
    use crate::repositories::ForecastRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn forecast(
        product: i64,
        days: u32,
        qty: Decimal,
        reorder: i64,
        minutes: i64,
    ) -> ProductForecast {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().expect("valid time");
        ProductForecast {
            product_id: ProductId(product),
            forecast_days: days,
            predicted_qty: qty,
            recommended_reorder_qty: reorder,
            generated_at: base + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_row_for_same_key() {
        let repo = SqlForecastRepository::new(setup().await);
        repo.upsert_all(vec![forecast(1, 7, Decimal::new(1050, 2), 9, 0)]).await.expect("first");
        repo.upsert_all(vec![forecast(1, 7, Decimal::new(325, 2), 2, 5)]).await.expect("second");

        let latest = repo.find_latest(ProductId(1), 7).await.expect("find");
        assert_eq!(latest, Some(forecast(1, 7, Decimal::new(325, 2), 2, 5)));
    }

    #[tokio::test]
    async fn horizons_are_kept_apart() {
        let repo = SqlForecastRepository::new(setup().await);
        let written = repo
            .upsert_all(vec![
                forecast(1, 7, Decimal::new(700, 2), 6, 0),
                forecast(1, 14, Decimal::new(1400, 2), 13, 0),
            ])
            .await
            .expect("upsert");
        assert_eq!(written, 2);

        let two_weeks = repo.find_latest(ProductId(1), 14).await.expect("find");
        assert_eq!(two_weeks.map(|row| row.recommended_reorder_qty), Some(13));
        assert_eq!(repo.find_latest(ProductId(1), 30).await.expect("find"), None);
    }
}
