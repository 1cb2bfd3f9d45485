use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use demandcast_core::domain::order::{OrderId, OrderLine};
use demandcast_core::domain::product::{CatalogProduct, ProductId};

use super::{
    format_timestamp, parse_timestamp, CatalogRepository, OrderHistoryRepository, RepositoryError,
};
use crate::DbPool;

/// Order history and product catalog tables.
pub struct SqlSalesRepository {
    pool: DbPool,
}

impl SqlSalesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn line_from_row(row: SqliteRow) -> Result<OrderLine, RepositoryError> {
    let order_id: i64 =
        row.try_get("order_ref_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let product_id: i64 =
        row.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity: i64 =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(OrderLine {
        order_id: OrderId(order_id),
        product_id: ProductId(product_id),
        quantity,
        ordered_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn product_from_row(row: SqliteRow) -> Result<CatalogProduct, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: Option<String> =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stock: Option<i64> =
        row.try_get("stock").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(CatalogProduct { id: ProductId(id), category, stock })
}

#[async_trait::async_trait]
impl OrderHistoryRepository for SqlSalesRepository {
    async fn lines_since(&self, since: DateTime<Utc>) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT oi.order_ref_id, oi.product_id, oi.quantity, o.created_at
             FROM order_item oi
             INNER JOIN customer_order o ON o.id = oi.order_ref_id
             WHERE o.created_at >= ?
             ORDER BY o.created_at ASC, oi.id ASC",
        )
        .bind(format_timestamp(since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    async fn all_lines(&self) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT oi.order_ref_id, oi.product_id, oi.quantity, o.created_at
             FROM order_item oi
             INNER JOIN customer_order o ON o.id = oi.order_ref_id
             ORDER BY o.created_at ASC, oi.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    async fn record_lines(&self, lines: Vec<OrderLine>) -> Result<(), RepositoryError> {
        let mut orders: BTreeMap<OrderId, DateTime<Utc>> = BTreeMap::new();
        for line in &lines {
            orders.entry(line.order_id).or_insert(line.ordered_at);
        }

        let mut tx = self.pool.begin().await?;
        for (order_id, created_at) in orders {
            sqlx::query(
                "INSERT INTO customer_order (id, created_at) VALUES (?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(order_id.0)
            .bind(format_timestamp(created_at))
            .execute(&mut *tx)
            .await?;
        }
        for line in &lines {
            sqlx::query(
                "INSERT INTO order_item (order_ref_id, product_id, quantity) VALUES (?, ?, ?)",
            )
            .bind(line.order_id.0)
            .bind(line.product_id.0)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlSalesRepository {
    async fn list_products(&self) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let rows = sqlx::query("SELECT id, category, stock FROM product ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn save_product(&self, product: CatalogProduct) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product (id, category, stock) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                category = excluded.category,
                stock = excluded.stock",
        )
        .bind(product.id.0)
        .bind(product.category.as_deref())
        .bind(product.stock)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use demandcast_core::domain::order::{OrderId, OrderLine};
    use demandcast_core::domain::product::{CatalogProduct, ProductId};

    use super::SqlSalesRepository;
    use crate::repositories::{CatalogRepository, OrderHistoryRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn line(order: i64, product: i64, quantity: i64, days_ago: i64) -> OrderLine {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("valid time");
        OrderLine {
            order_id: OrderId(order),
            product_id: ProductId(product),
            quantity,
            ordered_at: now - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn records_and_reads_order_lines() {
        let repo = SqlSalesRepository::new(setup().await);
        let lines = vec![line(1, 10, 2, 3), line(1, 11, 1, 3), line(2, 10, 5, 1)];
        repo.record_lines(lines.clone()).await.expect("record");

        let stored = repo.all_lines().await.expect("read");
        assert_eq!(stored, lines);
    }

    #[tokio::test]
    async fn lines_since_filters_on_order_time() {
        let repo = SqlSalesRepository::new(setup().await);
        repo.record_lines(vec![line(1, 10, 2, 40), line(2, 10, 5, 5), line(3, 12, 1, 0)])
            .await
            .expect("record");

        let since = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).single().expect("valid time");
        let recent = repo.lines_since(since).await.expect("read");
        let orders: Vec<i64> = recent.iter().map(|line| line.order_id.0).collect();
        assert_eq!(orders, vec![2, 3]);
    }

    #[tokio::test]
    async fn catalog_upserts_by_id() {
        let repo = SqlSalesRepository::new(setup().await);
        repo.save_product(CatalogProduct::new(1).with_category("snacks").with_stock(4))
            .await
            .expect("save");
        repo.save_product(CatalogProduct::new(1).with_category("drinks")).await.expect("save");
        repo.save_product(CatalogProduct::new(2)).await.expect("save");

        let products = repo.list_products().await.expect("list");
        assert_eq!(
            products,
            vec![CatalogProduct::new(1).with_category("drinks"), CatalogProduct::new(2)]
        );
    }
}
