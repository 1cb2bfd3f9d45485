//! One module per subcommand. Every command prints a single JSON object
//! `{command, status, error_class, message, data}`.
//!
//! Exit codes: 2 configuration, 3 runtime init, 4 database connectivity,
//! 5 migration, 6 operation failure, 7 not found, 8 invalid input.

pub mod config;
pub mod forecast;
pub mod migrate;
pub mod recommend;
pub mod seed;
pub mod train;

use demandcast_core::config::LoadOptions;
use demandcast_service::{bootstrap, Application, BootstrapError, ServiceError};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Success carrying an operation report under `data`.
    pub fn report(command: &str, message: impl Into<String>, data: &impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 6);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_service_error(command: &str, error: &ServiceError) -> Self {
        let exit_code = match error.error_class() {
            "not_found" => 7,
            "invalid_input" => 8,
            _ => 6,
        };
        Self::failure(command, error.error_class(), error.to_string(), exit_code)
    }

    fn from_bootstrap_error(command: &str, error: &BootstrapError) -> Self {
        let message = match error {
            BootstrapError::Config(error) => format!("configuration issue: {error}"),
            _ => error.to_string(),
        };
        Self::failure(command, error.error_class(), message, error.exit_code())
    }
}

/// Build a current-thread runtime and bootstrap the application on it.
pub(crate) fn prepare(
    command: &str,
    options: LoadOptions,
) -> Result<(Runtime, Application), CommandResult> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;

    let app = runtime
        .block_on(bootstrap(options))
        .map_err(|error| CommandResult::from_bootstrap_error(command, &error))?;
    Ok((runtime, app))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use demandcast_service::ServiceError;
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn report_nests_data_under_payload() {
        let result =
            CommandResult::report("train", "trained", &serde_json::json!({"trained": true}));
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["data"]["trained"], true);
        assert_eq!(payload["error_class"], Value::Null);
    }

    #[test]
    fn not_found_uses_dedicated_exit_code() {
        let error = ServiceError::NotFound {
            what: "Forecast for product 9".to_string(),
            hint: "Run refresh_forecasts first.".to_string(),
        };
        let result = CommandResult::from_service_error("forecast", &error);
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert_eq!(result.exit_code, 7);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload.get("data").is_none());
    }
}
