use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::connection::DbPool;
use crate::repositories::{format_timestamp, RepositoryError};

/// Demo catalog: `(id, name, category, stock)`. The last two products never
/// appear in an order and exercise the cold-start paths.
const DEMO_PRODUCTS: &[(i64, &str, Option<&str>, i64)] = &[
    (1, "Coffee Beans 1kg", Some("beverages"), 40),
    (2, "Paper Filters", Some("beverages"), 120),
    (3, "Ceramic Mug", Some("kitchen"), 25),
    (4, "Electric Kettle", Some("kitchen"), 6),
    (5, "Green Tea", Some("beverages"), 30),
    (6, "Butter Biscuits", Some("snacks"), 50),
    (7, "Rye Crackers", Some("snacks"), 18),
    (8, "Seasonal Sampler", Some("snacks"), 0),
    (9, "Gift Card", None, 10),
];

/// Baskets customers tend to buy together.
const DEMO_BUNDLES: &[&[i64]] =
    &[&[1, 2], &[1, 3], &[3, 4], &[5, 6], &[6, 7], &[1], &[5], &[6], &[2, 1, 3]];

/// Deterministic synthetic order history for trying the pipelines locally.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Replace catalog and order history with `days` days of generated orders
    /// ending at `today`.
    pub async fn load(
        pool: &DbPool,
        today: NaiveDate,
        days: u32,
        seed: u64,
    ) -> Result<SeedResult, RepositoryError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM order_item").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM customer_order").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM product").execute(&mut *tx).await?;

        for &(id, name, category, stock) in DEMO_PRODUCTS {
            sqlx::query("INSERT INTO product (id, name, category, stock) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(name)
                .bind(category)
                .bind(stock)
                .execute(&mut *tx)
                .await?;
        }

        let mut order_id = 0i64;
        let mut line_count = 0usize;
        for offset in (1..=u64::from(days)).rev() {
            let Some(day) = today.checked_sub_days(Days::new(offset)) else {
                continue;
            };
            let weekend = matches!(day.weekday(), Weekday::Sat | Weekday::Sun);
            let orders_today = if weekend { rng.gen_range(4..=9) } else { rng.gen_range(1..=5) };

            for _ in 0..orders_today {
                order_id += 1;
                let hour = rng.gen_range(8..20);
                let created_at = day.and_hms_opt(hour, rng.gen_range(0..60), 0).map(|naive| {
                    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
                });
                let Some(created_at) = created_at else {
                    continue;
                };

                sqlx::query("INSERT INTO customer_order (id, created_at) VALUES (?, ?)")
                    .bind(order_id)
                    .bind(format_timestamp(created_at))
                    .execute(&mut *tx)
                    .await?;

                let bundle = DEMO_BUNDLES[rng.gen_range(0..DEMO_BUNDLES.len())];
                for &product_id in bundle {
                    sqlx::query(
                        "INSERT INTO order_item (order_ref_id, product_id, quantity)
                         VALUES (?, ?, ?)",
                    )
                    .bind(order_id)
                    .bind(product_id)
                    .bind(rng.gen_range(1..=3i64))
                    .execute(&mut *tx)
                    .await?;
                    line_count += 1;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            event_name = "db.seed.loaded",
            products = DEMO_PRODUCTS.len(),
            orders = order_id,
            lines = line_count,
            "demo dataset loaded"
        );

        Ok(SeedResult {
            products: DEMO_PRODUCTS.len(),
            orders: usize::try_from(order_id).unwrap_or(usize::MAX),
            order_lines: line_count,
        })
    }

    /// Count what is currently stored in the seeded tables.
    pub async fn verify(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let products: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM product").fetch_one(pool).await?;
        let orders: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM customer_order").fetch_one(pool).await?;
        let order_lines: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM order_item").fetch_one(pool).await?;

        Ok(SeedResult {
            products: usize::try_from(products).unwrap_or_default(),
            orders: usize::try_from(orders).unwrap_or_default(),
            order_lines: usize::try_from(order_lines).unwrap_or_default(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub products: usize,
    pub orders: usize,
    pub order_lines: usize,
}
