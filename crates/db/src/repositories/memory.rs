use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use demandcast_core::domain::forecast::ProductForecast;
use demandcast_core::domain::order::OrderLine;
use demandcast_core::domain::product::{CatalogProduct, ProductId};
use demandcast_core::domain::recommendation::ProductRecommendation;

use super::{
    CatalogRepository, ForecastRepository, OrderHistoryRepository, RecommendationRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemorySalesRepository {
    products: RwLock<BTreeMap<ProductId, CatalogProduct>>,
    lines: RwLock<Vec<OrderLine>>,
}

impl InMemorySalesRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OrderHistoryRepository for InMemorySalesRepository {
    async fn lines_since(&self, since: DateTime<Utc>) -> Result<Vec<OrderLine>, RepositoryError> {
        let lines = self.lines.read().await;
        Ok(lines.iter().filter(|line| line.ordered_at >= since).cloned().collect())
    }

    async fn all_lines(&self) -> Result<Vec<OrderLine>, RepositoryError> {
        let lines = self.lines.read().await;
        Ok(lines.clone())
    }

    async fn record_lines(&self, new_lines: Vec<OrderLine>) -> Result<(), RepositoryError> {
        let mut lines = self.lines.write().await;
        lines.extend(new_lines);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemorySalesRepository {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().cloned().collect())
    }

    async fn save_product(&self, product: CatalogProduct) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id, product);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryForecastRepository {
    rows: RwLock<BTreeMap<(ProductId, u32), ProductForecast>>,
}

impl InMemoryForecastRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ForecastRepository for InMemoryForecastRepository {
    async fn upsert_all(&self, forecasts: Vec<ProductForecast>) -> Result<usize, RepositoryError> {
        let mut rows = self.rows.write().await;
        let written = forecasts.len();
        for forecast in forecasts {
            rows.insert((forecast.product_id, forecast.forecast_days), forecast);
        }
        Ok(written)
    }

    async fn find_latest(
        &self,
        product_id: ProductId,
        forecast_days: u32,
    ) -> Result<Option<ProductForecast>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(product_id, forecast_days)).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRecommendationRepository {
    rows: RwLock<Vec<ProductRecommendation>>,
}

impl InMemoryRecommendationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecommendationRepository for InMemoryRecommendationRepository {
    async fn replace_all(
        &self,
        recommendations: Vec<ProductRecommendation>,
    ) -> Result<usize, RepositoryError> {
        let mut rows = self.rows.write().await;
        let written = recommendations.len();
        *rows = recommendations;
        Ok(written)
    }

    async fn find_top(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<ProductRecommendation>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<ProductRecommendation> =
            rows.iter().filter(|row| row.product_id == product_id).cloned().collect();
        matching.sort_by(|a, b| {
            b.score.cmp(&a.score).then(a.recommended_product_id.cmp(&b.recommended_product_id))
        });
        matching.truncate(limit);
        Ok(matching)
    }
}
