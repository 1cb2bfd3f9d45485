use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::product::{CatalogProduct, ProductId};
use crate::forecast::features::FeatureVector;
use crate::forecast::regressor::{ForecastModel, Regressor};
use crate::forecast::sales::DemandAverages;

/// Minimum observed days before a usable model is consulted.
pub const MODEL_MIN_HISTORY: usize = 14;
/// Minimum observed days before the rolling-7 baseline is used.
pub const BASELINE_MIN_HISTORY: usize = 7;

/// Which policy branch produced a projected day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    RollingBaseline,
    CategoryAverage,
    GlobalAverage,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedDay {
    pub day: NaiveDate,
    pub quantity: f64,
    pub source: PredictionSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProductProjection {
    pub product_id: ProductId,
    pub days: Vec<ProjectedDay>,
    /// Unrounded sum over the horizon.
    pub predicted_qty: f64,
    pub recommended_reorder_qty: i64,
}

/// Inputs shared by every product in one refresh run.
pub struct ProjectionContext<'a> {
    pub today: NaiveDate,
    pub horizon_days: u32,
    pub model: Option<&'a ForecastModel>,
    pub averages: &'a DemandAverages,
}

/// One horizon step: a pure function of the history so far and the target
/// day. Returns the prediction and the history extended by it.
pub fn project_step(
    mut history: Vec<f64>,
    day: NaiveDate,
    model: Option<&ForecastModel>,
    cold_start_average: f64,
    cold_start_source: PredictionSource,
) -> (ProjectedDay, Vec<f64>) {
    let features = FeatureVector::extract(&history, day);

    let (quantity, source) = match model {
        Some(model) if history.len() >= MODEL_MIN_HISTORY => {
            (model.predict(&features.to_array()).max(0.0), PredictionSource::Model)
        }
        _ if history.len() >= BASELINE_MIN_HISTORY => {
            (features.roll_7.max(0.0), PredictionSource::RollingBaseline)
        }
        _ => (cold_start_average.max(0.0), cold_start_source),
    };

    history.push(quantity);
    (ProjectedDay { day, quantity, source }, history)
}

/// Fold [`project_step`] over `today + 1 ..= today + horizon_days`.
pub fn project_product(
    product: &CatalogProduct,
    history: &[f64],
    context: &ProjectionContext<'_>,
) -> ProductProjection {
    let category = product.category.as_deref();
    let (cold_start_average, cold_start_source) =
        match category.and_then(|category| context.averages.by_category.get(category)) {
            Some(average) => (*average, PredictionSource::CategoryAverage),
            None => (context.averages.global, PredictionSource::GlobalAverage),
        };

    let (days, _) = (1..=context.horizon_days).fold(
        (Vec::with_capacity(context.horizon_days as usize), history.to_vec()),
        |(mut days, history), offset| {
            let day = context
                .today
                .checked_add_days(Days::new(u64::from(offset)))
                .unwrap_or(NaiveDate::MAX);
            let (projected, history) =
                project_step(history, day, context.model, cold_start_average, cold_start_source);
            days.push(projected);
            (days, history)
        },
    );

    let predicted_qty: f64 = days.iter().map(|day| day.quantity).sum();
    ProductProjection {
        product_id: product.id,
        days,
        predicted_qty,
        recommended_reorder_qty: reorder_quantity(predicted_qty, product.stock_on_hand()),
    }
}

/// `ceil(predicted + 1 - stock)`, floored at zero. The extra unit is a
/// safety buffer.
pub fn reorder_quantity(predicted_qty: f64, stock: i64) -> i64 {
    let shortfall = predicted_qty + 1.0 - stock as f64;
    if shortfall > 0.0 {
        shortfall.ceil() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::{
        project_product, project_step, reorder_quantity, PredictionSource, ProjectionContext,
    };
    use crate::domain::product::CatalogProduct;
    use crate::forecast::forest::{ForestParams, RandomForest};
    use crate::forecast::regressor::ForecastModel;
    use crate::forecast::sales::DemandAverages;
    use crate::forecast::tree::{RegressionTree, TreeNode};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
    }

    fn averages() -> DemandAverages {
        DemandAverages {
            by_category: HashMap::from([("snacks".to_string(), 2.5)]),
            global: 1.0,
        }
    }

    fn constant_model(value: f64) -> ForecastModel {
        let mut forest = RandomForest::new(ForestParams {
            trees: 1,
            max_depth: 1,
            min_samples_leaf: 1,
            seed: 0,
        });
        forest.trees.push(RegressionTree { nodes: vec![TreeNode::leaf(value)] });
        ForecastModel::RandomForest(forest)
    }

    #[test]
    fn reorder_includes_one_unit_buffer() {
        assert_eq!(reorder_quantity(10.2, 5), 7);
        assert_eq!(reorder_quantity(4.0, 5), 0);
        assert_eq!(reorder_quantity(3.5, 5), 0);
        assert_eq!(reorder_quantity(0.0, 0), 1);
    }

    #[test]
    fn cold_start_uses_category_average() {
        let averages = averages();
        let context =
            ProjectionContext { today: today(), horizon_days: 7, model: None, averages: &averages };
        let product = CatalogProduct::new(9).with_category("snacks").with_stock(3);

        let projection = project_product(&product, &[], &context);

        // Seven predictions are appended, so the last step would switch to the
        // baseline only on day eight.
        assert!(projection
            .days
            .iter()
            .all(|day| day.source == PredictionSource::CategoryAverage));
        assert!((projection.predicted_qty - 17.5).abs() < 1e-9);
        assert_eq!(projection.recommended_reorder_qty, 16);
    }

    #[test]
    fn unknown_category_uses_global_average() {
        let averages = averages();
        let context =
            ProjectionContext { today: today(), horizon_days: 3, model: None, averages: &averages };
        let product = CatalogProduct::new(9).with_category("garden");

        let projection = project_product(&product, &[], &context);
        assert_eq!(projection.days[0].source, PredictionSource::GlobalAverage);
        assert!((projection.predicted_qty - 3.0).abs() < 1e-9);
        assert_eq!(projection.recommended_reorder_qty, 4);
    }

    #[test]
    fn predictions_feed_back_into_history() {
        let averages = averages();
        let context =
            ProjectionContext { today: today(), horizon_days: 3, model: None, averages: &averages };
        let history = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 7.0];

        let projection = project_product(&CatalogProduct::new(1), &history, &context);
        let quantities: Vec<f64> = projection.days.iter().map(|day| day.quantity).collect();

        // roll_7 over [0,0,0,0,0,0,7] = 1, then [0,0,0,0,0,7,1] = 8/7, ...
        assert_eq!(quantities[0], 1.0);
        assert!((quantities[1] - 8.0 / 7.0).abs() < 1e-12);
        assert!((quantities[2] - (7.0 + 1.0 + 8.0 / 7.0) / 7.0).abs() < 1e-12);
        assert!(projection.days.iter().all(|day| day.source == PredictionSource::RollingBaseline));
    }

    #[test]
    fn model_requires_fourteen_days_and_is_floored() {
        let model = constant_model(-3.0);

        let fallback = PredictionSource::GlobalAverage;
        let (short, _) = project_step(vec![2.0; 13], today(), Some(&model), 0.0, fallback);
        assert_eq!(short.source, PredictionSource::RollingBaseline);
        assert_eq!(short.quantity, 2.0);

        let (long, history) = project_step(vec![2.0; 14], today(), Some(&model), 0.0, fallback);
        assert_eq!(long.source, PredictionSource::Model);
        assert_eq!(long.quantity, 0.0);
        assert_eq!(history.len(), 15);
    }

    #[test]
    fn horizon_days_follow_today() {
        let averages = averages();
        let context =
            ProjectionContext { today: today(), horizon_days: 2, model: None, averages: &averages };
        let projection = project_product(&CatalogProduct::new(1), &[], &context);
        assert_eq!(projection.days[0].day, NaiveDate::from_ymd_opt(2024, 6, 2).expect("valid"));
        assert_eq!(projection.days[1].day, NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid"));
    }
}
