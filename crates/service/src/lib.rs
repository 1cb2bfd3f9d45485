//! Operations over order history: train the demand model, refresh forecasts
//! and recommendations, and read the persisted results back.

pub mod bootstrap;
pub mod error;
pub mod forecasting;
pub mod recommendations;

use std::sync::Arc;

use demandcast_core::clock::Clock;
use demandcast_core::config::TrainingConfig;
use demandcast_core::forecast::artifact::ArtifactStore;
use demandcast_db::repositories::{
    CatalogRepository, ForecastRepository, InMemoryForecastRepository,
    InMemoryRecommendationRepository, InMemorySalesRepository, OrderHistoryRepository,
    RecommendationRepository, SqlForecastRepository, SqlRecommendationRepository,
    SqlSalesRepository,
};
use demandcast_db::DbPool;

pub use bootstrap::{bootstrap, Application, BootstrapError};
pub use error::ServiceError;
pub use forecasting::{ForecastRefreshReport, TrainReport};
pub use recommendations::{RecommendationList, RecommendationListItem, RecommendationRefreshReport};

/// Storage seams the service runs against.
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderHistoryRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub forecasts: Arc<dyn ForecastRepository>,
    pub recommendations: Arc<dyn RecommendationRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        let sales = Arc::new(SqlSalesRepository::new(pool.clone()));
        Self {
            orders: sales.clone(),
            catalog: sales,
            forecasts: Arc::new(SqlForecastRepository::new(pool.clone())),
            recommendations: Arc::new(SqlRecommendationRepository::new(pool)),
        }
    }

    /// In-memory repositories; returns the shared sales store so callers can
    /// seed it.
    pub fn in_memory() -> (Self, Arc<InMemorySalesRepository>) {
        let sales = Arc::new(InMemorySalesRepository::new());
        let repositories = Self {
            orders: sales.clone(),
            catalog: sales.clone(),
            forecasts: Arc::new(InMemoryForecastRepository::new()),
            recommendations: Arc::new(InMemoryRecommendationRepository::new()),
        };
        (repositories, sales)
    }
}

pub struct IntelligenceService {
    repositories: Repositories,
    artifacts: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    training: TrainingConfig,
}

impl IntelligenceService {
    pub fn new(
        repositories: Repositories,
        artifacts: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        training: TrainingConfig,
    ) -> Self {
        Self { repositories, artifacts, clock, training }
    }

    pub fn artifacts(&self) -> &dyn ArtifactStore {
        self.artifacts.as_ref()
    }
}
