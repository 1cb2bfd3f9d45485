//! The SQL and in-memory repositories must be interchangeable behind their
//! traits.

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use demandcast_core::domain::forecast::ProductForecast;
use demandcast_core::domain::order::{OrderId, OrderLine};
use demandcast_core::domain::product::{CatalogProduct, ProductId};
use demandcast_core::domain::recommendation::ProductRecommendation;
use demandcast_db::repositories::{
    CatalogRepository, ForecastRepository, InMemoryForecastRepository,
    InMemoryRecommendationRepository, InMemorySalesRepository, OrderHistoryRepository,
    RecommendationRepository, SqlForecastRepository, SqlRecommendationRepository,
    SqlSalesRepository,
};
use demandcast_db::{connect_with_settings, migrations};

async fn sqlite_pool() -> sqlx::SqlitePool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).single().expect("valid time")
}

async fn exercise_sales<R>(repo: &R) -> (Vec<CatalogProduct>, Vec<OrderLine>)
where
    R: OrderHistoryRepository + CatalogRepository,
{
    repo.save_product(CatalogProduct::new(2).with_category("snacks").with_stock(3))
        .await
        .expect("save product");
    repo.save_product(CatalogProduct::new(1)).await.expect("save product");

    let line = |order: i64, product: i64, quantity: i64, day: u32| OrderLine {
        order_id: OrderId(order),
        product_id: ProductId(product),
        quantity,
        ordered_at: at(day, 9),
    };
    repo.record_lines(vec![line(1, 1, 2, 1), line(2, 2, 1, 3), line(2, 1, 4, 3)])
    .await
    .expect("record lines");

    let products = repo.list_products().await.expect("list products");
    let recent = repo.lines_since(at(2, 0)).await.expect("recent lines");
    (products, recent)
}

async fn exercise_forecasts(repo: &dyn ForecastRepository) -> Option<ProductForecast> {
    let first = ProductForecast {
        product_id: ProductId(1),
        forecast_days: 7,
        predicted_qty: Decimal::new(1234, 2),
        recommended_reorder_qty: 12,
        generated_at: at(4, 0),
    };
    let second = ProductForecast {
        predicted_qty: Decimal::new(50, 2),
        recommended_reorder_qty: 0,
        generated_at: at(4, 0) + Duration::hours(1),
        ..first.clone()
    };
    repo.upsert_all(vec![first]).await.expect("upsert");
    repo.upsert_all(vec![second]).await.expect("upsert");
    repo.find_latest(ProductId(1), 7).await.expect("find")
}

async fn exercise_recommendations(
    repo: &dyn RecommendationRepository,
) -> Vec<ProductRecommendation> {
    let row = |recommended: i64, score: Decimal| ProductRecommendation {
        product_id: ProductId(1),
        recommended_product_id: ProductId(recommended),
        score,
        generated_at: at(5, 0),
    };
    repo.replace_all(vec![row(9, Decimal::new(3, 1))]).await.expect("replace");
    repo.replace_all(vec![
        row(4, Decimal::new(1, 1)),
        row(2, Decimal::new(707107, 6)),
        row(3, Decimal::new(1, 1)),
    ])
    .await
    .expect("replace");
    repo.find_top(ProductId(1), 10).await.expect("find")
}

#[tokio::test]
async fn sales_repositories_agree() {
    let sql = SqlSalesRepository::new(sqlite_pool().await);
    let memory = InMemorySalesRepository::new();

    let from_sql = exercise_sales(&sql).await;
    let from_memory = exercise_sales(&memory).await;

    assert_eq!(from_sql, from_memory);
    assert_eq!(from_sql.1.len(), 2);
}

#[tokio::test]
async fn forecast_repositories_agree() {
    let sql = SqlForecastRepository::new(sqlite_pool().await);
    let memory = InMemoryForecastRepository::new();

    let from_sql = exercise_forecasts(&sql).await;
    let from_memory = exercise_forecasts(&memory).await;

    assert_eq!(from_sql, from_memory);
    assert_eq!(from_sql.map(|row| row.recommended_reorder_qty), Some(0));
}

#[tokio::test]
async fn recommendation_repositories_agree() {
    let sql = SqlRecommendationRepository::new(sqlite_pool().await);
    let memory = InMemoryRecommendationRepository::new();

    let from_sql = exercise_recommendations(&sql).await;
    let from_memory = exercise_recommendations(&memory).await;

    assert_eq!(from_sql, from_memory);
    let ids: Vec<i64> = from_sql.iter().map(|row| row.recommended_product_id.0).collect();
    assert_eq!(ids, vec![2, 3, 4]);
}
