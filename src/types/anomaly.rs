//! Anomaly events emitted by the scoring cycle and the per-equipment
//! publication gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FaultType, Prediction, RiskLevel, SensorAverages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyEventType {
    AnomalyCritical,
    AnomalyHigh,
}

impl AnomalyEventType {
    /// Event type for a tier, `None` for tiers that never produce events.
    pub const fn for_risk(level: RiskLevel) -> Option<Self> {
        match level {
            RiskLevel::Critical => Some(Self::AnomalyCritical),
            RiskLevel::High => Some(Self::AnomalyHigh),
            RiskLevel::Low | RiskLevel::Medium => None,
        }
    }
}

impl std::fmt::Display for AnomalyEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyEventType::AnomalyCritical => write!(f, "ANOMALY_CRITICAL"),
            AnomalyEventType::AnomalyHigh => write!(f, "ANOMALY_HIGH"),
        }
    }
}

/// A HIGH or CRITICAL prediction on its way to the response workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub event_id: String,
    pub event_type: AnomalyEventType,
    pub timestamp: DateTime<Utc>,
    pub equipment_id: String,
    pub facility_id: String,
    pub risk_level: RiskLevel,
    pub failure_probability: f64,
    pub probable_cause: String,
    #[serde(default)]
    pub fault_type: FaultType,
    #[serde(flatten)]
    pub averages: SensorAverages,
    pub scored_at: DateTime<Utc>,
}

impl AnomalyEvent {
    /// Build an event from a prediction, or `None` when the prediction's
    /// tier does not warrant one.
    pub fn from_prediction(
        prediction: &Prediction,
        facility_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let event_type = AnomalyEventType::for_risk(prediction.risk_level)?;
        Some(Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: now,
            equipment_id: prediction.equipment_id.clone(),
            facility_id: facility_id.into(),
            risk_level: prediction.risk_level,
            failure_probability: prediction.failure_probability,
            probable_cause: prediction.probable_cause.clone(),
            fault_type: prediction.fault_type,
            averages: prediction.averages,
            scored_at: prediction.scored_at,
        })
    }
}

/// Facility code embedded in an equipment ID (`PHX-CNC-007` -> `PHX`).
pub fn facility_of(equipment_id: &str, prefix_len: usize) -> String {
    equipment_id.chars().take(prefix_len).collect()
}

/// Highest tier an equipment is allowed to publish events for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    /// Publish HIGH and CRITICAL.
    #[default]
    Critical,
    /// Cap at HIGH: CRITICAL scores are clamped into the HIGH band.
    High,
    /// Publish nothing.
    None,
}

impl AlertLevel {
    pub const fn allows(self, level: RiskLevel) -> bool {
        match self {
            AlertLevel::Critical => level.is_anomalous(),
            AlertLevel::High => matches!(level, RiskLevel::High),
            AlertLevel::None => false,
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Critical => write!(f, "CRITICAL"),
            AlertLevel::High => write!(f, "HIGH"),
            AlertLevel::None => write!(f, "NONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facility_prefix() {
        assert_eq!(facility_of("PHX-CNC-007", 3), "PHX");
        assert_eq!(facility_of("AB", 3), "AB");
    }

    #[test]
    fn test_alert_level_gate() {
        assert!(AlertLevel::Critical.allows(RiskLevel::Critical));
        assert!(AlertLevel::Critical.allows(RiskLevel::High));
        assert!(!AlertLevel::Critical.allows(RiskLevel::Medium));
        assert!(AlertLevel::High.allows(RiskLevel::High));
        assert!(!AlertLevel::High.allows(RiskLevel::Critical));
        assert!(!AlertLevel::None.allows(RiskLevel::High));
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&AnomalyEventType::AnomalyCritical).unwrap(),
            "\"ANOMALY_CRITICAL\""
        );
        assert_eq!(AnomalyEventType::for_risk(RiskLevel::Medium), None);
    }
}
