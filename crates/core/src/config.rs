use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub forecast: ForecastConfig,
    pub recommendations: RecommendationConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ForecastConfig {
    pub forecast_days: u32,
    pub lookback_days: u32,
    pub eval_holdout_days: u32,
    pub model_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub top_k: usize,
}

/// Hyperparameters for the candidate regressors. Fixed per deployment; there
/// is no search over them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub seed: u64,
    pub forest_trees: usize,
    pub forest_max_depth: usize,
    pub forest_min_samples_leaf: usize,
    pub boosting_iterations: usize,
    pub boosting_learning_rate: f64,
    pub boosting_max_depth: usize,
    pub boosting_min_samples_leaf: usize,
    pub boosting_max_bins: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub forecast_days: Option<u32>,
    pub lookback_days: Option<u32>,
    pub eval_holdout_days: Option<u32>,
    pub model_dir: Option<PathBuf>,
    pub top_k: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://demandcast.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            forecast: ForecastConfig {
                forecast_days: 7,
                lookback_days: 365,
                eval_holdout_days: 30,
                model_dir: PathBuf::from("models"),
            },
            recommendations: RecommendationConfig { top_k: 6 },
            training: TrainingConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            forest_trees: 100,
            forest_max_depth: 12,
            forest_min_samples_leaf: 2,
            boosting_iterations: 100,
            boosting_learning_rate: 0.1,
            boosting_max_depth: 6,
            boosting_min_samples_leaf: 20,
            boosting_max_bins: 255,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("demandcast.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(forecast) = patch.forecast {
            if let Some(forecast_days) = forecast.forecast_days {
                self.forecast.forecast_days = forecast_days;
            }
            if let Some(lookback_days) = forecast.lookback_days {
                self.forecast.lookback_days = lookback_days;
            }
            if let Some(eval_holdout_days) = forecast.eval_holdout_days {
                self.forecast.eval_holdout_days = eval_holdout_days;
            }
            if let Some(model_dir) = forecast.model_dir {
                self.forecast.model_dir = model_dir;
            }
        }

        if let Some(recommendations) = patch.recommendations {
            if let Some(top_k) = recommendations.top_k {
                self.recommendations.top_k = top_k;
            }
        }

        if let Some(training) = patch.training {
            let current = &mut self.training;
            if let Some(seed) = training.seed {
                current.seed = seed;
            }
            if let Some(forest_trees) = training.forest_trees {
                current.forest_trees = forest_trees;
            }
            if let Some(forest_max_depth) = training.forest_max_depth {
                current.forest_max_depth = forest_max_depth;
            }
            if let Some(forest_min_samples_leaf) = training.forest_min_samples_leaf {
                current.forest_min_samples_leaf = forest_min_samples_leaf;
            }
            if let Some(boosting_iterations) = training.boosting_iterations {
                current.boosting_iterations = boosting_iterations;
            }
            if let Some(boosting_learning_rate) = training.boosting_learning_rate {
                current.boosting_learning_rate = boosting_learning_rate;
            }
            if let Some(boosting_max_depth) = training.boosting_max_depth {
                current.boosting_max_depth = boosting_max_depth;
            }
            if let Some(boosting_min_samples_leaf) = training.boosting_min_samples_leaf {
                current.boosting_min_samples_leaf = boosting_min_samples_leaf;
            }
            if let Some(boosting_max_bins) = training.boosting_max_bins {
                current.boosting_max_bins = boosting_max_bins;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEMANDCAST_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DEMANDCAST_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("DEMANDCAST_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DEMANDCAST_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DEMANDCAST_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEMANDCAST_FORECAST_DAYS") {
            self.forecast.forecast_days = parse_u32("DEMANDCAST_FORECAST_DAYS", &value)?;
        }
        if let Some(value) = read_env("DEMANDCAST_LOOKBACK_DAYS") {
            self.forecast.lookback_days = parse_u32("DEMANDCAST_LOOKBACK_DAYS", &value)?;
        }
        if let Some(value) = read_env("DEMANDCAST_EVAL_HOLDOUT_DAYS") {
            self.forecast.eval_holdout_days = parse_u32("DEMANDCAST_EVAL_HOLDOUT_DAYS", &value)?;
        }
        if let Some(value) = read_env("DEMANDCAST_MODEL_DIR") {
            self.forecast.model_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("DEMANDCAST_TOP_K") {
            self.recommendations.top_k = parse_usize("DEMANDCAST_TOP_K", &value)?;
        }

        if let Some(value) = read_env("DEMANDCAST_TRAINING_SEED") {
            self.training.seed = parse_u64("DEMANDCAST_TRAINING_SEED", &value)?;
        }

        let log_level =
            read_env("DEMANDCAST_LOGGING_LEVEL").or_else(|| read_env("DEMANDCAST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEMANDCAST_LOGGING_FORMAT").or_else(|| read_env("DEMANDCAST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(forecast_days) = overrides.forecast_days {
            self.forecast.forecast_days = forecast_days;
        }
        if let Some(lookback_days) = overrides.lookback_days {
            self.forecast.lookback_days = lookback_days;
        }
        if let Some(eval_holdout_days) = overrides.eval_holdout_days {
            self.forecast.eval_holdout_days = eval_holdout_days;
        }
        if let Some(model_dir) = overrides.model_dir {
            self.forecast.model_dir = model_dir;
        }
        if let Some(top_k) = overrides.top_k {
            self.recommendations.top_k = top_k;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_forecast(&self.forecast)?;
        validate_recommendations(&self.recommendations)?;
        validate_training(&self.training)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("demandcast.toml"), PathBuf::from("config/demandcast.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_forecast(forecast: &ForecastConfig) -> Result<(), ConfigError> {
    if forecast.forecast_days == 0 {
        return Err(ConfigError::Validation(
            "forecast.forecast_days must be greater than zero".to_string(),
        ));
    }
    if forecast.lookback_days == 0 {
        return Err(ConfigError::Validation(
            "forecast.lookback_days must be greater than zero".to_string(),
        ));
    }
    if forecast.eval_holdout_days == 0 || forecast.eval_holdout_days >= forecast.lookback_days {
        return Err(ConfigError::Validation(
            "forecast.eval_holdout_days must be in range 1..lookback_days".to_string(),
        ));
    }
    if forecast.model_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("forecast.model_dir must not be empty".to_string()));
    }

    Ok(())
}

fn validate_recommendations(recommendations: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendations.top_k == 0 {
        return Err(ConfigError::Validation(
            "recommendations.top_k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_training(training: &TrainingConfig) -> Result<(), ConfigError> {
    if training.forest_trees == 0 || training.boosting_iterations == 0 {
        return Err(ConfigError::Validation(
            "training.forest_trees and training.boosting_iterations must be greater than zero"
                .to_string(),
        ));
    }
    if training.forest_min_samples_leaf == 0 || training.boosting_min_samples_leaf == 0 {
        return Err(ConfigError::Validation(
            "training min_samples_leaf values must be greater than zero".to_string(),
        ));
    }
    if !(training.boosting_learning_rate > 0.0 && training.boosting_learning_rate <= 1.0) {
        return Err(ConfigError::Validation(
            "training.boosting_learning_rate must be in range (0, 1]".to_string(),
        ));
    }
    if training.boosting_max_bins < 2 || training.boosting_max_bins > 255 {
        return Err(ConfigError::Validation(
            "training.boosting_max_bins must be in range 2..=255".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    forecast: Option<ForecastPatch>,
    recommendations: Option<RecommendationPatch>,
    training: Option<TrainingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ForecastPatch {
    forecast_days: Option<u32>,
    lookback_days: Option<u32>,
    eval_holdout_days: Option<u32>,
    model_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationPatch {
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TrainingPatch {
    seed: Option<u64>,
    forest_trees: Option<usize>,
    forest_max_depth: Option<usize>,
    forest_min_samples_leaf: Option<usize>,
    boosting_iterations: Option<usize>,
    boosting_learning_rate: Option<f64>,
    boosting_max_depth: Option<usize>,
    boosting_min_samples_leaf: Option<usize>,
    boosting_max_bins: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
