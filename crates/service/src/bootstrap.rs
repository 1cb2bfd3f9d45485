use std::sync::Arc;

use demandcast_core::clock::SystemClock;
use demandcast_core::config::{AppConfig, ConfigError, LoadOptions};
use demandcast_core::forecast::artifact::FileArtifactStore;
use demandcast_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::{IntelligenceService, Repositories};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: IntelligenceService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_validation",
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
        }
    }

    /// Process exit code reported by the CLI for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::DatabaseConnect(_) => 4,
            Self::Migration(_) => 5,
        }
    }
}

/// Load configuration, open the pool, apply pending migrations and wire the
/// service against SQL repositories and the on-disk model artifact.
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let service = IntelligenceService::new(
        Repositories::sql(db_pool.clone()),
        Arc::new(FileArtifactStore::in_dir(&config.forecast.model_dir)),
        Arc::new(SystemClock),
        config.training.clone(),
    );

    Ok(Application { config, db_pool, service })
}

#[cfg(test)]
mod tests {
    use demandcast_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://localhost/demandcast".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let error = result.err().expect("non-sqlite url must be rejected");
        assert_eq!(error.error_class(), "config_validation");
        assert_eq!(error.exit_code(), 2);
        assert!(error.to_string().contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_a_fresh_database_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let database_url = format!("sqlite://{}", dir.path().join("bootstrap.db").display());

        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url),
                model_dir: Some(dir.path().join("models")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('product', 'customer_order', 'order_item', 'product_forecast', 'product_recommendation')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(table_count, 5);
        assert!(app.service.artifacts().load().expect("load").is_none());
    }
}
