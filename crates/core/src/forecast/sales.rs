use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};

use crate::domain::order::OrderLine;
use crate::domain::product::{CatalogProduct, ProductId};

/// Summed quantity per `(product, day)` for days with at least one order line.
pub type DailyTotals = BTreeMap<(ProductId, NaiveDate), f64>;

pub fn daily_totals(lines: &[OrderLine]) -> DailyTotals {
    let mut totals = DailyTotals::new();
    for line in lines {
        *totals.entry((line.product_id, line.order_day())).or_insert(0.0) += line.quantity as f64;
    }
    totals
}

/// A product's sales densified to one value per calendar day, from its first
/// to its last observed sale day. Missing days hold zero.
#[derive(Clone, Debug, PartialEq)]
pub struct DailySalesSeries {
    pub product_id: ProductId,
    pub start: NaiveDate,
    pub quantities: Vec<f64>,
}

impl DailySalesSeries {
    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Calendar day of the value at `index`.
    pub fn day_at(&self, index: usize) -> NaiveDate {
        self.start.checked_add_days(Days::new(index as u64)).unwrap_or(NaiveDate::MAX)
    }

    pub fn from_totals(totals: &DailyTotals) -> BTreeMap<ProductId, DailySalesSeries> {
        let mut grouped: BTreeMap<ProductId, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for (&(product_id, day), &quantity) in totals {
            grouped.entry(product_id).or_default().push((day, quantity));
        }

        grouped
            .into_iter()
            .filter_map(|(product_id, observed)| {
                let start = observed.first()?.0;
                let end = observed.last()?.0;
                let span = (end - start).num_days() as usize + 1;
                let mut quantities = vec![0.0; span];
                for (day, quantity) in observed {
                    quantities[(day - start).num_days() as usize] = quantity;
                }
                Some((product_id, DailySalesSeries { product_id, start, quantities }))
            })
            .collect()
    }

    pub fn from_lines(lines: &[OrderLine]) -> BTreeMap<ProductId, DailySalesSeries> {
        Self::from_totals(&daily_totals(lines))
    }
}

/// Cold-start fallback statistics: mean daily quantity per category and
/// overall, computed over the observed (non-densified) daily totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemandAverages {
    pub by_category: HashMap<String, f64>,
    pub global: f64,
}

impl DemandAverages {
    pub fn from_totals(totals: &DailyTotals, catalog: &[CatalogProduct]) -> Self {
        if totals.is_empty() {
            return Self::default();
        }

        let categories: HashMap<ProductId, &str> = catalog
            .iter()
            .filter_map(|product| {
                product.category.as_deref().map(|category| (product.id, category))
            })
            .collect();

        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        let mut global_sum = 0.0;
        for (&(product_id, _), &quantity) in totals {
            global_sum += quantity;
            if let Some(category) = categories.get(&product_id) {
                let entry = sums.entry((*category).to_string()).or_insert((0.0, 0));
                entry.0 += quantity;
                entry.1 += 1;
            }
        }

        let by_category = sums
            .into_iter()
            .map(|(category, (sum, count))| (category, sum / count as f64))
            .collect();

        Self { by_category, global: global_sum / totals.len() as f64 }
    }

    /// Category average when the category is known and observed, otherwise the
    /// global average.
    pub fn daily_average(&self, category: Option<&str>) -> f64 {
        category.and_then(|category| self.by_category.get(category)).copied().unwrap_or(self.global)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{daily_totals, DailySalesSeries, DemandAverages};
    use crate::domain::order::{OrderId, OrderLine};
    use crate::domain::product::{CatalogProduct, ProductId};

    fn line(order: i64, product: i64, quantity: i64, day: u32) -> OrderLine {
        OrderLine {
            order_id: OrderId(order),
            product_id: ProductId(product),
            quantity,
            ordered_at: Utc.with_ymd_and_hms(2024, 1, day, 10, 30, 0).single().expect("valid time"),
        }
    }

    #[test]
    fn series_is_densified_with_zero_fill() {
        let lines = vec![line(1, 1, 2, 1), line(2, 1, 3, 1), line(3, 1, 4, 4)];
        let series = DailySalesSeries::from_lines(&lines);
        let product = &series[&ProductId(1)];

        assert_eq!(product.start, NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"));
        assert_eq!(product.quantities, vec![5.0, 0.0, 0.0, 4.0]);
        assert_eq!(product.day_at(3), NaiveDate::from_ymd_opt(2024, 1, 4).expect("valid date"));
    }

    #[test]
    fn products_without_orders_are_absent() {
        let series = DailySalesSeries::from_lines(&[line(1, 1, 2, 1)]);
        assert!(series.contains_key(&ProductId(1)));
        assert!(!series.contains_key(&ProductId(2)));
    }

    #[test]
    fn zero_quantity_lines_keep_the_product() {
        let series = DailySalesSeries::from_lines(&[line(1, 9, 0, 2)]);
        assert_eq!(series[&ProductId(9)].quantities, vec![0.0]);
    }

    #[test]
    fn averages_use_observed_days_only() {
        let lines = vec![line(1, 1, 2, 1), line(2, 1, 4, 5), line(3, 2, 9, 3)];
        let catalog = vec![
            CatalogProduct::new(1).with_category("tools"),
            CatalogProduct::new(2),
        ];
        let averages = DemandAverages::from_totals(&daily_totals(&lines), &catalog);

        assert_eq!(averages.daily_average(Some("tools")), 3.0);
        assert_eq!(averages.daily_average(None), 5.0);
        assert_eq!(averages.daily_average(Some("garden")), 5.0);
    }
}
