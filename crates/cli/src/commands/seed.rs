use chrono::Utc;
use demandcast_core::config::LoadOptions;
use demandcast_db::DemoSeedDataset;

use crate::commands::{prepare, CommandResult};

pub fn run(options: LoadOptions, days: u32, seed: u64) -> CommandResult {
    if days == 0 {
        return CommandResult::failure("seed", "invalid_input", "days must be greater than zero", 8);
    }

    let (runtime, app) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let today = Utc::now().date_naive();
        let loaded = DemoSeedDataset::load(&app.db_pool, today, days, seed)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
        let stored = DemoSeedDataset::verify(&app.db_pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let outcome = if stored == loaded {
            Ok(loaded)
        } else {
            Err((
                "seed_verification",
                format!("stored counts {stored:?} differ from loaded counts {loaded:?}"),
                6u8,
            ))
        };
        app.db_pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} products, {} orders, {} order lines over {days} days",
                seeded.products, seeded.orders, seeded.order_lines
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
