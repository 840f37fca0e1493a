//! Shared data structures for the scoring and response pipeline
//!
//! - Ingress: SensorMessage (wire) -> SensorSample (validated)
//! - Scoring: FeatureVector, SensorAverages, Prediction, RiskLevel
//! - Egress: AnomalyEvent (routed by tier), AlertLevel (publication gate)
//! - Response: Recommendation, AutomatedAction, ReservedPart and the two
//!   workflow response records

mod anomaly;
mod prediction;
mod remediation;
mod sensor;

pub use anomaly::*;
pub use prediction::*;
pub use remediation::*;
pub use sensor::*;
