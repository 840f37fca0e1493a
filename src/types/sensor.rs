//! Sensor samples and the ingress wire message they are parsed from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed set of sensor channels a machine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Vibration,
    Temperature,
    #[serde(alias = "power_draw")]
    Power,
    #[serde(alias = "spindle_speed")]
    Rpm,
    Pressure,
    Torque,
}

impl SensorType {
    pub const ALL: [Self; 6] = [
        Self::Vibration,
        Self::Temperature,
        Self::Power,
        Self::Rpm,
        Self::Pressure,
        Self::Torque,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vibration => "vibration",
            Self::Temperature => "temperature",
            Self::Power => "power",
            Self::Rpm => "rpm",
            Self::Pressure => "pressure",
            Self::Torque => "torque",
        }
    }

    /// Parse a wire name, accepting the legacy channel aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vibration" => Some(Self::Vibration),
            "temperature" => Some(Self::Temperature),
            "power" | "power_draw" => Some(Self::Power),
            "rpm" | "spindle_speed" => Some(Self::Rpm),
            "pressure" => Some(Self::Pressure),
            "torque" => Some(Self::Torque),
            _ => None,
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated reading. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub equipment_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorSample {
    pub fn new(
        equipment_id: impl Into<String>,
        sensor_type: SensorType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            sensor_type,
            value,
            timestamp,
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// Reasons an inbound message is dropped.
#[derive(Debug, Error, PartialEq)]
pub enum SampleRejection {
    #[error("malformed message: {0}")]
    Json(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("unknown sensor type `{0}`")]
    UnknownSensorType(String),
    #[error("value is not numeric")]
    NonNumericValue,
    #[error("value is not finite")]
    NonFiniteValue,
    #[error("unparseable timestamp `{0}`")]
    BadTimestamp(String),
}

/// A reading as published by the plant telemetry feed.
///
/// Every field is optional at the serde level so that a missing field is
/// reported as a [`SampleRejection`] rather than a generic parse error.
/// Both `camelCase` and `snake_case` field names are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorMessage {
    #[serde(default, alias = "equipmentId")]
    pub equipment_id: Option<String>,
    #[serde(default, alias = "sensorType")]
    pub sensor_type: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

impl SensorMessage {
    /// Parse a single JSON document into a message.
    pub fn from_json(line: &str) -> Result<Self, SampleRejection> {
        serde_json::from_str(line).map_err(|e| SampleRejection::Json(e.to_string()))
    }

    /// Validate into a [`SensorSample`], stamping `received_at` when the
    /// message carries no timestamp of its own.
    pub fn into_sample(self, received_at: DateTime<Utc>) -> Result<SensorSample, SampleRejection> {
        let equipment_id = self
            .equipment_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(SampleRejection::MissingField("equipment_id"))?;

        let raw_type = self
            .sensor_type
            .ok_or(SampleRejection::MissingField("sensor_type"))?;
        let sensor_type =
            SensorType::parse(&raw_type).ok_or(SampleRejection::UnknownSensorType(raw_type))?;

        let value = self
            .value
            .ok_or(SampleRejection::MissingField("value"))?
            .as_f64()
            .ok_or(SampleRejection::NonNumericValue)?;
        if !value.is_finite() {
            return Err(SampleRejection::NonFiniteValue);
        }

        let timestamp = match self.timestamp.as_deref().map(str::trim) {
            None | Some("") => received_at,
            Some(ts) => DateTime::parse_from_rfc3339(ts)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| SampleRejection::BadTimestamp(ts.to_string()))?,
        };

        Ok(SensorSample {
            equipment_id,
            sensor_type,
            value,
            timestamp,
        })
    }
}

/// Parse and validate one JSON line in a single step.
pub fn parse_sample(line: &str, received_at: DateTime<Utc>) -> Result<SensorSample, SampleRejection> {
    SensorMessage::from_json(line)?.into_sample(received_at)
}
