//! Component assembly
//!
//! Wires the window store, scoring engine, broker, stores and router from a
//! [`PlantConfig`]. The binary runs the result under its task supervisor;
//! integration tests drive it directly with a manual clock.

use std::sync::Arc;
use thiserror::Error;

use crate::api::ApiState;
use crate::broker::{AnomalyBroker, AnomalySink};
use crate::clock::SharedClock;
use crate::config::PlantConfig;
use crate::pipeline::SampleIngestor;
use crate::router::{AnomalyRouter, EventConsumer};
use crate::scoring::{
    AlertGate, CoefficientStore, EngineSettings, FeatureExtractor, FileCoefficientSource,
    MetadataCatalog, RiskScorer, ScoringEngine, TrendEstimator,
};
use crate::storage::{
    open_database, AuditLog, InMemoryPredictionStore, PredictionStore, RecommendationStore,
    RecordError, SledPredictionStore, StoreError,
};
use crate::window::WindowStore;
use crate::workflow::{WorkflowContext, WorkflowServices};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("prediction store: {0}")]
    Store(#[from] StoreError),
    #[error("record store: {0}")]
    Record(#[from] RecordError),
}

// ============================================================================
// Stores
// ============================================================================

/// The three persistent stores, either all sled-backed or all in memory.
#[derive(Clone)]
pub struct Stores {
    pub predictions: Arc<dyn PredictionStore>,
    pub recommendations: Arc<RecommendationStore>,
    pub audit: Arc<AuditLog>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            predictions: Arc::new(InMemoryPredictionStore::new()),
            recommendations: Arc::new(RecommendationStore::in_memory()),
            audit: Arc::new(AuditLog::in_memory()),
        }
    }

    /// Open every store in one sled database under `data_dir`, reloading
    /// recommendations and audit records written by a previous run.
    pub fn open(data_dir: &std::path::Path) -> Result<Self, AppError> {
        let db = open_database(data_dir)?;
        let stores = Self {
            predictions: Arc::new(SledPredictionStore::open(&db)?),
            recommendations: Arc::new(RecommendationStore::open(&db)?),
            audit: Arc::new(AuditLog::open(&db)?),
        };
        tracing::info!(
            recommendations = stores.recommendations.len(),
            automated_actions = stores.audit.len(),
            "Stores opened"
        );
        Ok(stores)
    }

    /// In-memory when the config asks for it, sled otherwise.
    pub fn from_config(config: &PlantConfig) -> Result<Self, AppError> {
        if config.storage.in_memory {
            tracing::info!("Storage: in-memory (nothing survives a restart)");
            Ok(Self::in_memory())
        } else {
            Self::open(&config.storage.data_dir)
        }
    }
}

// ============================================================================
// Core
// ============================================================================

/// Every long-lived component, shared by the tasks and the HTTP API.
pub struct AppCore {
    pub windows: Arc<WindowStore>,
    pub engine: Arc<ScoringEngine>,
    pub ingestor: Arc<SampleIngestor>,
    pub broker: Arc<AnomalyBroker>,
    pub router: Arc<AnomalyRouter>,
    critical_queue: String,
    high_queue: String,
}

impl AppCore {
    pub fn build(
        config: &PlantConfig,
        clock: SharedClock,
        stores: Stores,
        services: WorkflowServices,
    ) -> Self {
        let windows = Arc::new(WindowStore::new(config.scoring.horizon()));
        let broker = Arc::new(AnomalyBroker::from_config(&config.broker));

        let coefficients = Arc::new(match &config.coefficients.path {
            Some(path) => CoefficientStore::with_source(
                config.scoring.model_id.clone(),
                Arc::new(FileCoefficientSource::new(path.clone())),
            ),
            None => CoefficientStore::with_defaults(config.scoring.model_id.clone()),
        });

        let engine = Arc::new(ScoringEngine::new(
            Arc::clone(&windows),
            FeatureExtractor::new(
                config.calibration.clone(),
                TrendEstimator::new(&config.trend),
                config.scoring.min_window_samples,
            ),
            RiskScorer::new(coefficients, config.risk.clone()),
            MetadataCatalog::load_or_default(&config.metadata),
            stores.predictions,
            Arc::clone(&broker) as Arc<dyn AnomalySink>,
            AlertGate::new(config.alerts.default_level),
            Arc::clone(&clock),
            EngineSettings {
                model_id: config.scoring.model_id.clone(),
                facility_prefix_len: config.scoring.facility_prefix_len,
                reconnect_threshold: config.scoring.reconnect_threshold,
            },
        ));

        let ctx = Arc::new(WorkflowContext::new(
            services,
            config.workflow.clone(),
            config.notifications.recipient.clone(),
            Arc::clone(&clock),
        ));
        let router = Arc::new(AnomalyRouter::new(ctx, stores.recommendations, stores.audit));
        let ingestor = Arc::new(SampleIngestor::new(Arc::clone(&windows), clock));

        Self {
            windows,
            engine,
            ingestor,
            broker,
            router,
            critical_queue: config.broker.critical_queue.clone(),
            high_queue: config.broker.high_queue.clone(),
        }
    }

    pub fn api_state(&self) -> ApiState {
        ApiState::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.ingestor),
            Arc::clone(&self.router),
            Arc::clone(&self.broker),
        )
    }

    pub fn critical_consumer(&self) -> EventConsumer {
        EventConsumer::new(
            Arc::clone(&self.router),
            Arc::clone(&self.broker),
            self.critical_queue.clone(),
        )
    }

    pub fn high_consumer(&self) -> EventConsumer {
        EventConsumer::new(
            Arc::clone(&self.router),
            Arc::clone(&self.broker),
            self.high_queue.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::workflow::SimulatedPlant;

    #[test]
    fn test_sled_stores_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let stores = Stores::open(dir.path()).unwrap();
            assert!(stores.recommendations.is_empty());
            assert_eq!(stores.predictions.backend_name(), "Sled");
        }
        let reopened = Stores::open(dir.path()).unwrap();
        assert!(reopened.audit.is_empty());
    }

    #[test]
    fn test_build_uses_config_queues() {
        let clock: SharedClock = Arc::new(SystemClock);
        let plant = SimulatedPlant::new(Arc::clone(&clock));
        let config = PlantConfig::default();
        let core = AppCore::build(&config, clock, Stores::in_memory(), plant.services());

        assert_eq!(core.critical_queue, "orchestrator.critical");
        assert_eq!(core.high_queue, "orchestrator.high");
        assert_eq!(core.windows.horizon().num_seconds(), 180);
        assert_eq!(
            core.engine.coefficients().current().model_id,
            "failure_predictor_v1"
        );
    }
}
