use demandcast_core::config::LoadOptions;
use demandcast_core::domain::product::ProductId;

use crate::commands::{prepare, CommandResult};

pub fn refresh(options: LoadOptions) -> CommandResult {
    let (runtime, app) = match prepare("refresh-forecasts", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let forecast = &app.config.forecast;
    let result = runtime
        .block_on(app.service.refresh_forecasts(forecast.forecast_days, forecast.lookback_days));
    runtime.block_on(app.db_pool.close());

    match result {
        Ok(report) => {
            let message = report.message.clone().unwrap_or_else(|| {
                format!(
                    "updated {} forecasts over {} days",
                    report.updated_count, report.forecast_days
                )
            });
            CommandResult::report("refresh-forecasts", message, &report)
        }
        Err(error) => CommandResult::from_service_error("refresh-forecasts", &error),
    }
}

pub fn show(options: LoadOptions, product_id: i64) -> CommandResult {
    let (runtime, app) = match prepare("forecast", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(
        app.service.get_forecast(ProductId(product_id), app.config.forecast.forecast_days),
    );
    runtime.block_on(app.db_pool.close());

    match result {
        Ok(forecast) => CommandResult::report(
            "forecast",
            format!(
                "product {product_id}: {} units over {} days, reorder {}",
                forecast.predicted_qty, forecast.forecast_days, forecast.recommended_reorder_qty
            ),
            &forecast,
        ),
        Err(error) => CommandResult::from_service_error("forecast", &error),
    }
}
