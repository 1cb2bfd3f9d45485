pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use demandcast_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "demandcast",
    about = "Demand forecasting and co-purchase recommendation operator CLI",
    long_about = "Train the demand model, refresh persisted forecasts and recommendations, and read them back.",
    after_help = "Examples:\n  demandcast migrate\n  demandcast train --lookback-days 365\n  demandcast refresh-forecasts --forecast-days 14\n  demandcast recommend 42 --k 6"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to a TOML config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override forecast.model_dir")]
    model_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Replace catalog and order history with a deterministic demo dataset")]
    Seed {
        #[arg(long, default_value_t = 120, help = "Days of order history to generate")]
        days: u32,
        #[arg(long, default_value_t = 42, help = "Random seed for the generated orders")]
        seed: u64,
    },
    #[command(about = "Fit candidate models on recent history and replace the model artifact")]
    Train {
        #[arg(long)]
        lookback_days: Option<u32>,
        #[arg(long)]
        eval_holdout_days: Option<u32>,
    },
    #[command(about = "Recompute and upsert forecasts for every catalog product")]
    RefreshForecasts {
        #[arg(long)]
        forecast_days: Option<u32>,
        #[arg(long)]
        lookback_days: Option<u32>,
    },
    #[command(about = "Recompute and replace the co-purchase recommendation set")]
    RefreshRecommendations {
        #[arg(long)]
        k: Option<usize>,
    },
    #[command(about = "Show the latest persisted forecast for a product")]
    Forecast {
        product_id: i64,
        #[arg(long)]
        forecast_days: Option<u32>,
    },
    #[command(about = "Show the persisted top-k recommendations for a product")]
    Recommend {
        product_id: i64,
        #[arg(long)]
        k: Option<usize>,
    },
    #[command(about = "Inspect effective configuration with source attribution and artifact status")]
    Config {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl GlobalArgs {
    fn load_options(&self, overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                model_dir: self.model_dir.clone(),
                log_level: self.log_level.clone(),
                ..overrides
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let global = &cli.global;

    let result = match cli.command {
        Command::Config { json } => {
            commands::config::run(global.load_options(ConfigOverrides::default()), json)
        }
        command => {
            let options = global.load_options(command_overrides(&command));
            if let Ok(config) = AppConfig::load(options.clone()) {
                init_logging(&config);
            }
            dispatch(command, options)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn command_overrides(command: &Command) -> ConfigOverrides {
    match *command {
        Command::Train { lookback_days, eval_holdout_days } => {
            ConfigOverrides { lookback_days, eval_holdout_days, ..ConfigOverrides::default() }
        }
        Command::RefreshForecasts { forecast_days, lookback_days } => {
            ConfigOverrides { forecast_days, lookback_days, ..ConfigOverrides::default() }
        }
        Command::Forecast { forecast_days, .. } => {
            ConfigOverrides { forecast_days, ..ConfigOverrides::default() }
        }
        Command::RefreshRecommendations { k } | Command::Recommend { k, .. } => {
            ConfigOverrides { top_k: k, ..ConfigOverrides::default() }
        }
        _ => ConfigOverrides::default(),
    }
}

fn dispatch(command: Command, options: LoadOptions) -> commands::CommandResult {
    match command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed { days, seed } => commands::seed::run(options, days, seed),
        Command::Train { .. } => commands::train::run(options),
        Command::RefreshForecasts { .. } => commands::forecast::refresh(options),
        Command::RefreshRecommendations { .. } => commands::recommend::refresh(options),
        Command::Forecast { product_id, .. } => commands::forecast::show(options, product_id),
        Command::Recommend { product_id, .. } => commands::recommend::show(options, product_id),
        Command::Config { json } => commands::config::run(options, json),
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // stdout carries the command result; logs go to stderr
    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .compact()
                .init();
        }
        Pretty => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .pretty()
                .init();
        }
        Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_max_level(log_level)
                .json()
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{command_overrides, Cli, Command};

    #[test]
    fn operation_flags_become_config_overrides() {
        let cli = Cli::parse_from([
            "demandcast",
            "refresh-forecasts",
            "--forecast-days",
            "14",
            "--database-url",
            "sqlite::memory:",
        ]);

        let overrides = command_overrides(&cli.command);
        assert_eq!(overrides.forecast_days, Some(14));
        assert_eq!(overrides.lookback_days, None);

        let options = cli.global.load_options(overrides);
        assert_eq!(options.overrides.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(options.overrides.forecast_days, Some(14));
        assert!(!options.require_file);
    }

    #[test]
    fn recommend_takes_positional_product_id() {
        let cli = Cli::parse_from(["demandcast", "recommend", "42", "--k", "3"]);
        match cli.command {
            Command::Recommend { product_id, k } => {
                assert_eq!(product_id, 42);
                assert_eq!(k, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(command_overrides(&cli.command).top_k, Some(3));
    }

    #[test]
    fn explicit_config_path_is_required_to_exist() {
        let cli = Cli::parse_from(["demandcast", "--config", "ops/demandcast.toml", "migrate"]);
        let options = cli.global.load_options(command_overrides(&cli.command));
        assert!(options.require_file);
    }
}
