//! Persistence of the single current model snapshot.
//!
//! Readers see either the previous artifact or the new one in full: the file
//! store writes a sibling temp file and renames it over the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::errors::ArtifactError;
use crate::forecast::features::FEATURE_SET;
use crate::forecast::regressor::ForecastModel;
use crate::forecast::trainer::{ForecastArtifact, ModelMetadata};

pub const ARTIFACT_FILE_NAME: &str = "forecast_artifact.json";

pub trait ArtifactStore: Send + Sync {
    fn load(&self) -> Result<Option<ForecastArtifact>, ArtifactError>;

    fn replace(&self, artifact: &ForecastArtifact) -> Result<(), ArtifactError>;

    /// Load for inference. Anything unreadable counts as "no model", which
    /// sends the forecaster down its fallback path.
    fn load_or_absent(&self) -> Option<ForecastArtifact> {
        match self.load() {
            Ok(artifact) => artifact,
            Err(error) => {
                tracing::warn!(
                    event_name = "forecast.artifact.unreadable",
                    error = %error,
                    "ignoring unreadable model artifact"
                );
                None
            }
        }
    }
}

/// `model` holds the exact JSON text the checksum covers.
#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    metadata: ModelMetadata,
    checksum: String,
    model: Box<RawValue>,
}

fn checksum_of(model: &RawValue) -> String {
    blake3::hash(model.get().as_bytes()).to_hex().to_string()
}

pub struct FileArtifactStore {
    path: PathBuf,
}

impl FileArtifactStore {
    pub fn in_dir(model_dir: impl AsRef<Path>) -> Self {
        Self { path: model_dir.as_ref().join(ARTIFACT_FILE_NAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ArtifactError {
        ArtifactError::Io { path: self.path.clone(), source }
    }
}

impl ArtifactStore for FileArtifactStore {
    fn load(&self) -> Result<Option<ForecastArtifact>, ArtifactError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };

        let envelope: ArtifactEnvelope = serde_json::from_slice(&raw)?;
        if envelope.metadata.feature_set != FEATURE_SET {
            return Err(ArtifactError::FeatureSetMismatch {
                expected: FEATURE_SET.to_string(),
                found: envelope.metadata.feature_set,
            });
        }

        let actual = checksum_of(&envelope.model);
        if actual != envelope.checksum {
            return Err(ArtifactError::ChecksumMismatch { expected: envelope.checksum, actual });
        }

        let model: ForecastModel = serde_json::from_str(envelope.model.get())?;
        Ok(Some(ForecastArtifact { metadata: envelope.metadata, model }))
    }

    fn replace(&self, artifact: &ForecastArtifact) -> Result<(), ArtifactError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }

        let model = serde_json::value::to_raw_value(&artifact.model)?;
        let envelope = ArtifactEnvelope {
            metadata: artifact.metadata.clone(),
            checksum: checksum_of(&model),
            model,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(|error| self.io_error(error))?;
        file.write_all(&bytes).map_err(|error| self.io_error(error))?;
        file.sync_all().map_err(|error| self.io_error(error))?;
        drop(file);
        fs::rename(&temp_path, &self.path).map_err(|error| self.io_error(error))?;

        tracing::info!(
            event_name = "forecast.artifact.replaced",
            path = %self.path.display(),
            model_name = %artifact.metadata.model_name,
            bytes = bytes.len(),
            "model artifact replaced"
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryArtifactStore {
    current: RwLock<Option<ForecastArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn load(&self) -> Result<Option<ForecastArtifact>, ArtifactError> {
        let guard = self
            .current
            .read()
            .map_err(|_| ArtifactError::Unavailable("artifact lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn replace(&self, artifact: &ForecastArtifact) -> Result<(), ArtifactError> {
        let mut guard = self
            .current
            .write()
            .map_err(|_| ArtifactError::Unavailable("artifact lock poisoned".to_string()))?;
        *guard = Some(artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use chrono::{Days, NaiveDate, TimeZone, Utc};
    use tempfile::TempDir;

    use super::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
    use crate::config::TrainingConfig;
    use crate::domain::product::ProductId;
    use crate::errors::ArtifactError;
    use crate::forecast::forest::{ForestParams, RandomForest};
    use crate::forecast::regressor::ForecastModel;
    use crate::forecast::sales::DailySalesSeries;
    use crate::forecast::trainer::{train, ForecastArtifact, ModelMetadata, TrainingOutcome};
    use crate::forecast::tree::{RegressionTree, TreeNode};

    fn artifact(model_name: &str) -> ForecastArtifact {
        let mut forest = RandomForest::new(ForestParams {
            trees: 1,
            max_depth: 2,
            min_samples_leaf: 1,
            seed: 1,
        });
        forest.trees.push(RegressionTree { nodes: vec![TreeNode::leaf(2.5)] });

        ForecastArtifact {
            metadata: ModelMetadata {
                trained_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single().expect("valid time"),
                model_name: model_name.to_string(),
                mae_model: 1.25,
                mae_baseline: 1.5,
                beats_baseline: true,
                use_model: true,
                feature_set: "v2".to_string(),
                fit_examples: 120,
                eval_examples: 30,
                cutoff: NaiveDate::from_ymd_opt(2024, 4, 1).expect("valid date"),
            },
            model: ForecastModel::RandomForest(forest),
        }
    }

    #[test]
    fn missing_file_loads_as_absent() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileArtifactStore::in_dir(dir.path().join("nested"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn replace_overwrites_and_leaves_no_temp_file() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileArtifactStore::in_dir(dir.path());

        store.replace(&artifact("first")).expect("first write");
        store.replace(&artifact("second")).expect("second write");

        let loaded = store.load().expect("load").expect("artifact present");
        assert_eq!(loaded, artifact("second"));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn tampered_model_fails_checksum() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileArtifactStore::in_dir(dir.path());
        store.replace(&artifact("forest")).expect("write");

        let raw = fs::read_to_string(store.path()).expect("read");
        fs::write(store.path(), raw.replace("2.5", "9.5")).expect("tamper");

        assert!(matches!(store.load(), Err(ArtifactError::ChecksumMismatch { .. })));
        assert!(store.load_or_absent().is_none());
    }

    #[test]
    fn stale_feature_set_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileArtifactStore::in_dir(dir.path());
        let mut stale = artifact("forest");
        stale.metadata.feature_set = "v1".to_string();
        store.replace(&stale).expect("write");

        assert!(matches!(store.load(), Err(ArtifactError::FeatureSetMismatch { .. })));
    }

    #[test]
    fn garbage_file_is_treated_as_absent() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileArtifactStore::in_dir(dir.path());
        fs::write(store.path(), b"not json").expect("write");
        assert!(store.load_or_absent().is_none());
    }

    #[test]
    fn trained_ensemble_reloads_unchanged() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let series: BTreeMap<ProductId, DailySalesSeries> = (1..=5)
            .map(|id| {
                let quantities = (0..150u32)
                    .map(|day| f64::from((day * 7 + id * 3) % 11) / 3.0 + f64::from(day % 7 == 0))
                    .collect();
                let product_id = ProductId(i64::from(id));
                (product_id, DailySalesSeries { product_id, start, quantities })
            })
            .collect();
        let config = TrainingConfig {
            forest_trees: 20,
            boosting_iterations: 40,
            ..TrainingConfig::default()
        };
        let trained_at = Utc.with_ymd_and_hms(2024, 5, 30, 6, 0, 0).single().expect("valid time");

        let outcome = train(&series, start + Days::new(150), 30, &config, trained_at)
            .expect("training runs");
        let TrainingOutcome::Trained(artifact) = outcome else {
            panic!("expected a trained artifact");
        };

        let dir = TempDir::new().expect("temp dir");
        let store = FileArtifactStore::in_dir(dir.path());
        store.replace(&artifact).expect("write");

        let loaded = store.load().expect("load").expect("artifact present");
        assert_eq!(loaded, *artifact);
        assert_eq!(store.load_or_absent().as_ref(), Some(&*artifact));
    }

    #[test]
    fn in_memory_store_round_trips() {
        let store = InMemoryArtifactStore::new();
        assert!(store.load().expect("load").is_none());
        store.replace(&artifact("forest")).expect("replace");
        assert_eq!(store.load_or_absent(), Some(artifact("forest")));
    }
}
