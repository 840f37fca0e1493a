//! Scoring outputs: features, risk tiers and the published prediction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk tier derived from failure probability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl RiskLevel {
    /// Whether this tier produces an anomaly event.
    pub const fn is_anomalous(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Failure family a diagnosis points at. Drives part selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaultType {
    Bearing,
    Motor,
    Spindle,
    Coolant,
    Electrical,
    #[default]
    General,
}

impl FaultType {
    /// Catalog roles of the parts that repair this fault, primary first.
    pub const fn part_roles(self) -> &'static [&'static str] {
        match self {
            Self::Bearing => &["spindle_bearing", "ball_screw_bearing", "spindle_seal"],
            Self::Motor => &[
                "spindle_motor",
                "motor_controller",
                "encoder",
                "contactor",
                "overload_relay",
            ],
            Self::Spindle => &[
                "spindle_cartridge",
                "spindle_drawbar",
                "spindle_seal",
                "spindle_bearing",
            ],
            Self::Coolant => &[
                "coolant_pump",
                "coolant_pump_hp",
                "coolant_filter",
                "coolant_sensor",
                "coolant_chiller",
            ],
            Self::Electrical => &[
                "motor_controller",
                "power_supply",
                "circuit_breaker",
                "surge_protector",
                "emc_filter",
            ],
            Self::General => &[
                "spindle_bearing",
                "spindle_motor",
                "motor_controller",
                "spindle_cartridge",
                "coolant_pump",
                "circuit_breaker",
            ],
        }
    }
}

impl std::fmt::Display for FaultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultType::Bearing => "BEARING",
            FaultType::Motor => "MOTOR",
            FaultType::Spindle => "SPINDLE",
            FaultType::Coolant => "COOLANT",
            FaultType::Electrical => "ELECTRICAL",
            FaultType::General => "GENERAL",
        };
        f.write_str(s)
    }
}

/// Raw per-sensor means over a window, with neutral defaults filled in
/// for sensor types that had no samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SensorAverages {
    pub vibration_avg: f64,
    pub temperature_avg: f64,
    pub power_avg: f64,
    pub rpm_avg: f64,
    pub pressure_avg: f64,
    pub torque_avg: f64,
}

/// Feature names as they appear in a coefficient set.
pub mod feature {
    pub const VIBRATION_NORMALIZED: &str = "vibration_normalized";
    pub const TEMPERATURE_NORMALIZED: &str = "temperature_normalized";
    pub const POWER_NORMALIZED: &str = "power_normalized";
    pub const RPM_NORMALIZED: &str = "rpm_normalized";
    pub const PRESSURE_NORMALIZED: &str = "pressure_normalized";
    pub const TORQUE_NORMALIZED: &str = "torque_normalized";
    pub const VIBRATION_TREND_RATE: &str = "vibration_trend_rate";
    pub const TEMPERATURE_TREND_RATE: &str = "temperature_trend_rate";
    pub const DAYS_SINCE_MAINTENANCE: &str = "days_since_maintenance";
    pub const EQUIPMENT_AGE_YEARS: &str = "equipment_age_years";
    pub const ANOMALY_COUNT: &str = "anomaly_count";

    pub const ALL: [&str; 11] = [
        VIBRATION_NORMALIZED,
        TEMPERATURE_NORMALIZED,
        POWER_NORMALIZED,
        RPM_NORMALIZED,
        PRESSURE_NORMALIZED,
        TORQUE_NORMALIZED,
        VIBRATION_TREND_RATE,
        TEMPERATURE_TREND_RATE,
        DAYS_SINCE_MAINTENANCE,
        EQUIPMENT_AGE_YEARS,
        ANOMALY_COUNT,
    ];
}

/// Classifier input for one equipment in one cycle. Never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureVector {
    pub vibration_normalized: f64,
    pub temperature_normalized: f64,
    pub power_normalized: f64,
    pub rpm_normalized: f64,
    pub pressure_normalized: f64,
    pub torque_normalized: f64,
    pub vibration_trend_rate: f64,
    pub temperature_trend_rate: f64,
    pub days_since_maintenance: f64,
    pub equipment_age_years: f64,
    pub anomaly_count: f64,
}

impl FeatureVector {
    /// Named feature values in [`feature::ALL`] order.
    pub fn named(&self) -> [(&'static str, f64); 11] {
        [
            (feature::VIBRATION_NORMALIZED, self.vibration_normalized),
            (feature::TEMPERATURE_NORMALIZED, self.temperature_normalized),
            (feature::POWER_NORMALIZED, self.power_normalized),
            (feature::RPM_NORMALIZED, self.rpm_normalized),
            (feature::PRESSURE_NORMALIZED, self.pressure_normalized),
            (feature::TORQUE_NORMALIZED, self.torque_normalized),
            (feature::VIBRATION_TREND_RATE, self.vibration_trend_rate),
            (feature::TEMPERATURE_TREND_RATE, self.temperature_trend_rate),
            (feature::DAYS_SINCE_MAINTENANCE, self.days_since_maintenance),
            (feature::EQUIPMENT_AGE_YEARS, self.equipment_age_years),
            (feature::ANOMALY_COUNT, self.anomaly_count),
        ]
    }
}

/// A feature whose contribution to the logit exceeded the driver threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub feature: String,
    pub contribution: f64,
}

/// Latest failure assessment for one equipment. One entry per equipment
/// in the prediction store, last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub equipment_id: String,
    pub failure_probability: f64,
    pub risk_level: RiskLevel,
    pub probable_cause: String,
    #[serde(default)]
    pub fault_type: FaultType,
    #[serde(flatten)]
    pub averages: SensorAverages,
    pub vibration_trend: f64,
    pub temperature_trend: f64,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    pub window_size: usize,
    pub model_id: String,
    pub scored_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering_and_display() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert_eq!(RiskLevel::Critical.to_string(), "CRITICAL");
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"MEDIUM\"");
        assert!(RiskLevel::High.is_anomalous());
        assert!(!RiskLevel::Medium.is_anomalous());
    }

    #[test]
    fn test_feature_vector_names_match_catalog() {
        let names: Vec<&str> = FeatureVector::default().named().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, feature::ALL.to_vec());
    }

    #[test]
    fn test_prediction_flattens_averages() {
        let p = Prediction {
            equipment_id: "PHX-CNC-001".into(),
            failure_probability: 0.4,
            risk_level: RiskLevel::Medium,
            probable_cause: "none".into(),
            fault_type: FaultType::General,
            averages: SensorAverages {
                vibration_avg: 2.1,
                ..SensorAverages::default()
            },
            vibration_trend: 0.0,
            temperature_trend: 0.0,
            drivers: vec![],
            window_size: 12,
            model_id: "failure_predictor_v1".into(),
            scored_at: Utc::now(),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["vibration_avg"], 2.1);
        assert_eq!(v["risk_level"], "MEDIUM");
        let back: Prediction = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }
}
