use demandcast_core::config::LoadOptions;

use crate::commands::{prepare, CommandResult};

/// Bootstrap applies pending migrations; this command stops there.
pub fn run(options: LoadOptions) -> CommandResult {
    let (runtime, app) = match prepare("migrate", options) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    runtime.block_on(app.db_pool.close());
    CommandResult::success("migrate", "applied pending migrations")
}
