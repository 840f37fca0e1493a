//! Failure-risk scoring
//!
//! Window -> features -> logistic score -> diagnosis -> prediction.
//!
//! - [`trend`]: least-squares slope with the point/span/R² gate
//! - [`features`]: per-sensor means, normalization, trend rates
//! - [`coefficients`]: hot-swappable coefficient snapshots
//! - [`scorer`]: logit, probability, tier and drivers
//! - [`diagnosis`]: ordered rule table for the probable cause
//! - [`metadata`]: maintenance context per equipment
//! - [`engine`] / [`scheduler`]: the periodic scoring cycle

pub mod coefficients;
pub mod diagnosis;
pub mod engine;
pub mod features;
pub mod metadata;
pub mod scheduler;
pub mod scorer;
pub mod trend;

pub use coefficients::{
    CoefficientError, CoefficientSet, CoefficientSource, CoefficientStore, FileCoefficientSource,
    StaticCoefficientSource,
};
pub use diagnosis::{diagnose, Diagnosis};
pub use engine::{
    AlertGate, CycleReport, EngineSettings, ResetReport, ScoringEngine, HIGH_CAP_PROBABILITY,
    HIGH_CAP_TREND_RATE,
};
pub use features::{ExtractedFeatures, FeatureError, FeatureExtractor};
pub use metadata::{EquipmentContext, EquipmentRecord, MetadataCatalog, MetadataError};
pub use scheduler::ScoringScheduler;
pub use scorer::{classify, logistic, RiskScore, RiskScorer};
pub use trend::{least_squares, LinearFit, TrendEstimator};
