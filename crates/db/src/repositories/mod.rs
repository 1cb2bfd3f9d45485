use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use demandcast_core::domain::forecast::ProductForecast;
use demandcast_core::domain::order::OrderLine;
use demandcast_core::domain::product::{CatalogProduct, ProductId};
use demandcast_core::domain::recommendation::ProductRecommendation;

pub mod forecast;
pub mod memory;
pub mod recommendation;
pub mod sales;

pub use forecast::SqlForecastRepository;
pub use memory::{
    InMemoryForecastRepository, InMemoryRecommendationRepository, InMemorySalesRepository,
};
pub use recommendation::SqlRecommendationRepository;
pub use sales::SqlSalesRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Read side of raw order history, plus the append path used by seeding.
#[async_trait]
pub trait OrderHistoryRepository: Send + Sync {
    /// Lines whose order was placed at or after `since`.
    async fn lines_since(&self, since: DateTime<Utc>) -> Result<Vec<OrderLine>, RepositoryError>;

    async fn all_lines(&self) -> Result<Vec<OrderLine>, RepositoryError>;

    async fn record_lines(&self, lines: Vec<OrderLine>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, RepositoryError>;

    async fn save_product(&self, product: CatalogProduct) -> Result<(), RepositoryError>;
}

/// Rows keyed by `(product_id, forecast_days)`; writes upsert.
#[async_trait]
pub trait ForecastRepository: Send + Sync {
    /// Upsert every row in one transaction; returns the number written.
    async fn upsert_all(&self, forecasts: Vec<ProductForecast>) -> Result<usize, RepositoryError>;

    async fn find_latest(
        &self,
        product_id: ProductId,
        forecast_days: u32,
    ) -> Result<Option<ProductForecast>, RepositoryError>;
}

/// The whole recommendation table is one set, replaced atomically.
#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn replace_all(
        &self,
        recommendations: Vec<ProductRecommendation>,
    ) -> Result<usize, RepositoryError>;

    /// Best `limit` rows for `product_id`, score descending, ties by
    /// recommended id.
    async fn find_top(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<ProductRecommendation>, RepositoryError>;
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}
