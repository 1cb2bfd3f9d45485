use std::collections::BTreeMap;

use chrono::Duration;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use demandcast_core::domain::forecast::ProductForecast;
use demandcast_core::domain::product::ProductId;
use demandcast_core::forecast::dataset::InsufficientData;
use demandcast_core::forecast::projection::{project_product, ProjectionContext};
use demandcast_core::forecast::sales::{daily_totals, DemandAverages};
use demandcast_core::forecast::trainer::{train, ModelMetadata, TrainingOutcome};
use demandcast_core::forecast::{DailySalesSeries, PredictionSource};

use crate::error::ServiceError;
use crate::IntelligenceService;

const FORECAST_HINT: &str = "Run refresh_forecasts first.";

/// Result of a training run. A skipped run is a normal outcome carrying the
/// reason, not an error.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainReport {
    pub trained: bool,
    #[serde(flatten)]
    pub metadata: Option<ModelMetadata>,
    #[serde(flatten)]
    pub skipped: Option<InsufficientData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastRefreshReport {
    pub updated_count: usize,
    pub forecast_days: u32,
    /// An artifact was loaded, whether or not its model was consulted.
    pub used_saved_model: bool,
    pub model_name: Option<String>,
    pub use_model: bool,
    pub mae_model: Option<f64>,
    pub mae_baseline: Option<f64>,
    pub beats_baseline: Option<bool>,
    /// Projected days per policy branch.
    pub sources: BTreeMap<PredictionSource, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ForecastRefreshReport {
    fn no_products(forecast_days: u32) -> Self {
        Self {
            updated_count: 0,
            forecast_days,
            used_saved_model: false,
            model_name: None,
            use_model: false,
            mae_model: None,
            mae_baseline: None,
            beats_baseline: None,
            sources: BTreeMap::new(),
            message: Some("No products".to_string()),
        }
    }
}

fn require_positive(name: &str, value: u32) -> Result<(), ServiceError> {
    if value == 0 {
        return Err(ServiceError::invalid_input(format!("{name} must be greater than zero")));
    }
    Ok(())
}

impl IntelligenceService {
    /// Fit the candidate regressors on the lookback window and replace the
    /// stored artifact with the best one.
    pub async fn train_forecast(
        &self,
        lookback_days: u32,
        eval_holdout_days: u32,
    ) -> Result<TrainReport, ServiceError> {
        require_positive("lookback_days", lookback_days)?;
        require_positive("eval_holdout_days", eval_holdout_days)?;

        let now = self.clock.now();
        let today = self.clock.today();
        let lines = self
            .repositories
            .orders
            .lines_since(now - Duration::days(i64::from(lookback_days)))
            .await?;
        let series = DailySalesSeries::from_lines(&lines);
        let training = self.training.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            train(&series, today, eval_holdout_days, &training, now)
        })
        .await
        .map_err(|error| ServiceError::Task(error.to_string()))??;

        match outcome {
            TrainingOutcome::Trained(artifact) => {
                self.artifacts.replace(&artifact)?;
                Ok(TrainReport {
                    trained: true,
                    metadata: Some(artifact.metadata),
                    skipped: None,
                    message: None,
                })
            }
            TrainingOutcome::Skipped(reason) => Ok(TrainReport {
                trained: false,
                metadata: None,
                message: Some(reason.to_string()),
                skipped: Some(reason),
            }),
        }
    }

    /// Project every catalog product over the horizon and upsert the results.
    pub async fn refresh_forecasts(
        &self,
        forecast_days: u32,
        lookback_days: u32,
    ) -> Result<ForecastRefreshReport, ServiceError> {
        require_positive("forecast_days", forecast_days)?;
        require_positive("lookback_days", lookback_days)?;

        let catalog = self.repositories.catalog.list_products().await?;
        if catalog.is_empty() {
            info!(event_name = "forecast.refresh.skipped", "catalog is empty");
            return Ok(ForecastRefreshReport::no_products(forecast_days));
        }

        let now = self.clock.now();
        let lines = self
            .repositories
            .orders
            .lines_since(now - Duration::days(i64::from(lookback_days)))
            .await?;
        let totals = daily_totals(&lines);
        let series = DailySalesSeries::from_totals(&totals);
        let averages = DemandAverages::from_totals(&totals, &catalog);

        let artifact = self.artifacts.load_or_absent();
        let context = ProjectionContext {
            today: self.clock.today(),
            horizon_days: forecast_days,
            model: artifact.as_ref().and_then(|artifact| artifact.usable_model()),
            averages: &averages,
        };

        let mut sources: BTreeMap<PredictionSource, usize> = BTreeMap::new();
        let mut rows = Vec::with_capacity(catalog.len());
        for product in &catalog {
            let history =
                series.get(&product.id).map(|series| series.quantities.as_slice()).unwrap_or(&[]);
            let projection = project_product(product, history, &context);
            for day in &projection.days {
                *sources.entry(day.source).or_default() += 1;
            }
            rows.push(ProductForecast {
                product_id: product.id,
                forecast_days,
                predicted_qty: to_decimal(product.id, projection.predicted_qty)?.round_dp(2),
                recommended_reorder_qty: projection.recommended_reorder_qty,
                generated_at: now,
            });
        }

        let updated_count = self.repositories.forecasts.upsert_all(rows).await?;
        let metadata = artifact.as_ref().map(|artifact| &artifact.metadata);

        info!(
            event_name = "forecast.refresh.completed",
            product_count = catalog.len(),
            updated_count,
            forecast_days,
            used_saved_model = artifact.is_some(),
            use_model = context.model.is_some(),
            model_days = sources.get(&PredictionSource::Model).copied().unwrap_or(0),
            baseline_days = sources.get(&PredictionSource::RollingBaseline).copied().unwrap_or(0),
            category_days = sources.get(&PredictionSource::CategoryAverage).copied().unwrap_or(0),
            global_days = sources.get(&PredictionSource::GlobalAverage).copied().unwrap_or(0),
            "forecasts refreshed"
        );

        Ok(ForecastRefreshReport {
            updated_count,
            forecast_days,
            used_saved_model: artifact.is_some(),
            model_name: metadata.map(|metadata| metadata.model_name.clone()),
            use_model: context.model.is_some(),
            mae_model: metadata.map(|metadata| metadata.mae_model),
            mae_baseline: metadata.map(|metadata| metadata.mae_baseline),
            beats_baseline: metadata.map(|metadata| metadata.beats_baseline),
            sources,
            message: None,
        })
    }

    pub async fn get_forecast(
        &self,
        product_id: ProductId,
        forecast_days: u32,
    ) -> Result<ProductForecast, ServiceError> {
        require_positive("forecast_days", forecast_days)?;

        self.repositories.forecasts.find_latest(product_id, forecast_days).await?.ok_or_else(
            || ServiceError::NotFound {
                what: format!("Forecast for product {product_id} over {forecast_days} days"),
                hint: FORECAST_HINT.to_string(),
            },
        )
    }
}

fn to_decimal(product_id: ProductId, value: f64) -> Result<Decimal, ServiceError> {
    Decimal::from_f64(value).ok_or_else(|| {
        ServiceError::invalid_input(format!(
            "projected quantity for product {product_id} is not representable: {value}"
        ))
    })
}
