use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use demandcast_core::config::{resolve_config_path, AppConfig, LoadOptions};
use demandcast_core::forecast::artifact::{ArtifactStore, FileArtifactStore};
use demandcast_core::forecast::trainer::ModelMetadata;
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ArtifactStatus {
    path: PathBuf,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ModelMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    entries: Vec<ConfigEntry>,
    artifact: ArtifactStatus,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let sources = SourceResolver {
        options: &options,
        doc: config_file_doc.as_ref(),
        path: config_file_path.as_deref(),
    };

    let report =
        ConfigReport { entries: entries(&config, &sources), artifact: artifact_status(&config) };

    if json_output {
        return CommandResult::report("config", "effective configuration", &report);
    }
    CommandResult { exit_code: 0, output: render_human(&report) }
}

fn entries(config: &AppConfig, sources: &SourceResolver<'_>) -> Vec<ConfigEntry> {
    let overrides = &sources.options.overrides;
    let training = &config.training;
    vec![
        sources.entry(
            "database.url",
            config.database.url.clone(),
            &["DEMANDCAST_DATABASE_URL"],
            overrides.database_url.is_some(),
        ),
        sources.entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["DEMANDCAST_DATABASE_MAX_CONNECTIONS"],
            false,
        ),
        sources.entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["DEMANDCAST_DATABASE_TIMEOUT_SECS"],
            false,
        ),
        sources.entry(
            "forecast.forecast_days",
            config.forecast.forecast_days.to_string(),
            &["DEMANDCAST_FORECAST_DAYS"],
            overrides.forecast_days.is_some(),
        ),
        sources.entry(
            "forecast.lookback_days",
            config.forecast.lookback_days.to_string(),
            &["DEMANDCAST_LOOKBACK_DAYS"],
            overrides.lookback_days.is_some(),
        ),
        sources.entry(
            "forecast.eval_holdout_days",
            config.forecast.eval_holdout_days.to_string(),
            &["DEMANDCAST_EVAL_HOLDOUT_DAYS"],
            overrides.eval_holdout_days.is_some(),
        ),
        sources.entry(
            "forecast.model_dir",
            config.forecast.model_dir.display().to_string(),
            &["DEMANDCAST_MODEL_DIR"],
            overrides.model_dir.is_some(),
        ),
        sources.entry(
            "recommendations.top_k",
            config.recommendations.top_k.to_string(),
            &["DEMANDCAST_TOP_K"],
            overrides.top_k.is_some(),
        ),
        sources.entry(
            "training.seed",
            training.seed.to_string(),
            &["DEMANDCAST_TRAINING_SEED"],
            false,
        ),
        sources.entry("training.forest_trees", training.forest_trees.to_string(), &[], false),
        sources.entry(
            "training.forest_max_depth",
            training.forest_max_depth.to_string(),
            &[],
            false,
        ),
        sources.entry(
            "training.boosting_iterations",
            training.boosting_iterations.to_string(),
            &[],
            false,
        ),
        sources.entry(
            "training.boosting_learning_rate",
            training.boosting_learning_rate.to_string(),
            &[],
            false,
        ),
        sources.entry(
            "training.boosting_max_depth",
            training.boosting_max_depth.to_string(),
            &[],
            false,
        ),
        sources.entry(
            "logging.level",
            config.logging.level.clone(),
            &["DEMANDCAST_LOGGING_LEVEL", "DEMANDCAST_LOG_LEVEL"],
            overrides.log_level.is_some(),
        ),
        sources.entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["DEMANDCAST_LOGGING_FORMAT", "DEMANDCAST_LOG_FORMAT"],
            false,
        ),
    ]
}

fn artifact_status(config: &AppConfig) -> ArtifactStatus {
    let store = FileArtifactStore::in_dir(&config.forecast.model_dir);
    let path = store.path().to_path_buf();
    match store.load() {
        Ok(Some(artifact)) => ArtifactStatus {
            path,
            status: "present",
            metadata: Some(artifact.metadata),
            error: None,
        },
        Ok(None) => ArtifactStatus { path, status: "absent", metadata: None, error: None },
        Err(error) => ArtifactStatus {
            path,
            status: "unreadable",
            metadata: None,
            error: Some(error.to_string()),
        },
    }
}

struct SourceResolver<'a> {
    options: &'a LoadOptions,
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl SourceResolver<'_> {
    fn entry(
        &self,
        key: &'static str,
        value: String,
        env_keys: &[&str],
        from_flag: bool,
    ) -> ConfigEntry {
        ConfigEntry { key, value, source: self.field_source(key, env_keys, from_flag) }
    }

    fn field_source(&self, key_path: &str, env_keys: &[&str], from_flag: bool) -> String {
        if from_flag {
            return "flag".to_string();
        }

        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_human(report: &ConfigReport) -> String {
    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    lines.extend(
        report
            .entries
            .iter()
            .map(|entry| format!("- {} = {} (source: {})", entry.key, entry.value, entry.source)),
    );

    let artifact = &report.artifact;
    lines.push(format!("model artifact: {} ({})", artifact.status, artifact.path.display()));
    if let Some(metadata) = &artifact.metadata {
        lines.push(format!(
            "- trained_at = {}, model = {}, mae_model = {:.4}, mae_baseline = {:.4}, use_model = {}",
            metadata.trained_at.to_rfc3339(),
            metadata.model_name,
            metadata.mae_model,
            metadata.mae_baseline,
            metadata.use_model
        ));
    }
    if let Some(error) = &artifact.error {
        lines.push(format!("- error = {error}"));
    }

    lines.join("\n")
}
