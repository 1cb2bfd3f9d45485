use demandcast_core::config::LoadOptions;

use crate::commands::{prepare, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let (runtime, app) = match prepare("train", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let forecast = &app.config.forecast;
    let result = runtime
        .block_on(app.service.train_forecast(forecast.lookback_days, forecast.eval_holdout_days));
    runtime.block_on(app.db_pool.close());

    match result {
        Ok(report) => {
            let message = match (&report.metadata, &report.message) {
                (Some(metadata), _) => format!(
                    "selected {} (mae {:.4} vs baseline {:.4}, use_model={})",
                    metadata.model_name,
                    metadata.mae_model,
                    metadata.mae_baseline,
                    metadata.use_model
                ),
                (None, Some(reason)) => reason.clone(),
                (None, None) => "training skipped".to_string(),
            };
            CommandResult::report("train", message, &report)
        }
        Err(error) => CommandResult::from_service_error("train", &error),
    }
}
