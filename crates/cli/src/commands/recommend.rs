use demandcast_core::config::LoadOptions;
use demandcast_core::domain::product::ProductId;

use crate::commands::{prepare, CommandResult};

pub fn refresh(options: LoadOptions) -> CommandResult {
    let (runtime, app) = match prepare("refresh-recommendations", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result =
        runtime.block_on(app.service.refresh_recommendations(app.config.recommendations.top_k));
    runtime.block_on(app.db_pool.close());

    match result {
        Ok(report) => {
            let message = report.message.clone().unwrap_or_else(|| {
                format!(
                    "stored {} recommendations for {} products ({} from popularity)",
                    report.row_count, report.updated_product_count, report.fallback_product_count
                )
            });
            CommandResult::report("refresh-recommendations", message, &report)
        }
        Err(error) => CommandResult::from_service_error("refresh-recommendations", &error),
    }
}

pub fn show(options: LoadOptions, product_id: i64) -> CommandResult {
    let (runtime, app) = match prepare("recommend", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(
        app.service.get_recommendations(ProductId(product_id), app.config.recommendations.top_k),
    );
    runtime.block_on(app.db_pool.close());

    match result {
        Ok(list) => CommandResult::report(
            "recommend",
            format!("{} recommendations for product {product_id}", list.items.len()),
            &list,
        ),
        Err(error) => CommandResult::from_service_error("recommend", &error),
    }
}
