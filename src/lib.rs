//! forgewatch: equipment failure scoring and anomaly response
//!
//! Continuous pipeline for a fleet of CNC machines:
//!
//! ## Architecture
//!
//! - **Ingestion**: sensor messages from stdin, TCP or HTTP land in
//!   per-equipment rolling windows
//! - **Scoring**: every interval each window becomes a feature vector, a
//!   logistic failure probability, a risk tier and a probable cause
//! - **Publication**: predictions are written in one batch; HIGH and
//!   CRITICAL predictions become anomaly events on the broker
//! - **Response**: CRITICAL events run the automated remediation workflow;
//!   HIGH events become recommendations held for human approval
//! - **API**: predictions, recommendations and the action log under `/api/v1`

pub mod api;
pub mod app;
pub mod broker;
pub mod clock;
pub mod config;
pub mod pipeline;
pub mod router;
pub mod scoring;
pub mod storage;
pub mod types;
pub mod window;
pub mod workflow;

// Re-export configuration
pub use config::PlantConfig;

// Re-export commonly used types
pub use types::{
    AlertLevel, AnomalyEvent, AutomatedAction, FaultType, Prediction, Recommendation,
    RecommendationStatus, RiskLevel, SensorMessage, SensorSample, SensorType,
};

// Re-export assembly and the main components
pub use app::{AppCore, AppError, Stores};
pub use router::AnomalyRouter;
pub use scoring::ScoringEngine;
