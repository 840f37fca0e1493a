//! Plant configuration: every calibration constant and policy knob as an
//! operator-tunable TOML value.
//!
//! Each section implements `Default` from [`super::defaults`], so an empty
//! or partial file keeps the stock behaviour for everything it omits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::types::{AlertLevel, SensorType};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FORGEWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "forgewatch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one deployment.
///
/// Load with `PlantConfig::load()` which searches:
/// 1. `$FORGEWATCH_CONFIG` env var
/// 2. `./forgewatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    pub plant: PlantInfo,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scoring: ScoringConfig,
    pub calibration: CalibrationConfig,
    pub trend: TrendConfig,
    pub risk: RiskConfig,
    pub metadata: MetadataConfig,
    pub coefficients: CoefficientsConfig,
    pub alerts: AlertsConfig,
    pub broker: BrokerConfig,
    pub workflow: WorkflowConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("config parse error ({0}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl PlantConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that fails to parse or validate is logged and skipped; the
    /// next candidate (ultimately the defaults) is used instead.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), plant = %config.plant.name, "Loaded plant config from {}", CONFIG_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(plant = %config.plant.name, "Loaded plant config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// - Risk thresholds must satisfy `0 < medium < high < critical < 1`
    /// - Calibration critical constants must be positive
    /// - Periods and sample minimums must be non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let r = &self.risk;
        if !(0.0 < r.medium && r.medium < r.high && r.high < r.critical && r.critical < 1.0) {
            errors.push(format!(
                "risk thresholds must satisfy 0 < medium ({}) < high ({}) < critical ({}) < 1",
                r.medium, r.high, r.critical
            ));
        }

        for sensor in SensorType::ALL {
            let cal = self.calibration.for_sensor(sensor);
            if !(cal.critical.is_finite() && cal.critical > 0.0) {
                errors.push(format!(
                    "calibration.{sensor}.critical must be positive, got {}",
                    cal.critical
                ));
            }
        }

        if self.scoring.interval_secs == 0 {
            errors.push("scoring.interval_secs must be > 0".to_string());
        }
        if self.scoring.horizon_secs == 0 {
            errors.push("scoring.horizon_secs must be > 0".to_string());
        }
        if self.scoring.min_window_samples == 0 {
            errors.push("scoring.min_window_samples must be > 0".to_string());
        }
        if self.trend.min_points < 2 {
            errors.push("trend.min_points must be >= 2".to_string());
        }
        if self.trend.clamp <= 0.0 {
            errors.push("trend.clamp must be positive".to_string());
        }
        if self.broker.max_deliveries == 0 {
            errors.push("broker.max_deliveries must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantInfo {
    pub name: String,
    pub site: String,
}

impl Default for PlantInfo {
    fn default() -> Self {
        Self {
            name: "Unnamed Plant".to_string(),
            site: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Keep every store in memory (nothing survives a restart).
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub horizon_secs: u64,
    pub min_window_samples: usize,
    pub interval_secs: u64,
    pub initial_delay_secs: u64,
    pub model_id: String,
    pub reconnect_threshold: u32,
    pub facility_prefix_len: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            horizon_secs: defaults::WINDOW_HORIZON_SECS,
            min_window_samples: defaults::MIN_WINDOW_SAMPLES,
            interval_secs: defaults::SCORING_INTERVAL_SECS,
            initial_delay_secs: defaults::SCORING_INITIAL_DELAY_SECS,
            model_id: defaults::MODEL_ID.to_string(),
            reconnect_threshold: defaults::RECONNECT_THRESHOLD,
            facility_prefix_len: defaults::FACILITY_PREFIX_LEN,
        }
    }
}

impl ScoringConfig {
    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.horizon_secs).unwrap_or(i64::MAX))
    }

    pub const fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub const fn initial_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.initial_delay_secs)
    }
}

/// Normalization constant and neutral fill-in value for one sensor type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    /// Reading at which the sensor is considered critical; averages are
    /// divided by this before entering the classifier.
    pub critical: f64,
    /// Mean assumed when the window has no samples of this type.
    pub neutral: f64,
    /// Cap the normalized value at 1.0.
    #[serde(default)]
    pub clamp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub vibration: SensorCalibration,
    pub temperature: SensorCalibration,
    pub power: SensorCalibration,
    pub rpm: SensorCalibration,
    pub pressure: SensorCalibration,
    pub torque: SensorCalibration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let cal = |critical, neutral, clamp| SensorCalibration {
            critical,
            neutral,
            clamp,
        };
        Self {
            vibration: cal(defaults::VIBRATION_CRITICAL, defaults::VIBRATION_NEUTRAL, true),
            temperature: cal(defaults::TEMPERATURE_CRITICAL, defaults::TEMPERATURE_NEUTRAL, true),
            power: cal(defaults::POWER_CRITICAL, defaults::POWER_NEUTRAL, false),
            rpm: cal(defaults::RPM_CRITICAL, defaults::RPM_NEUTRAL, false),
            pressure: cal(defaults::PRESSURE_CRITICAL, defaults::PRESSURE_NEUTRAL, false),
            torque: cal(defaults::TORQUE_CRITICAL, defaults::TORQUE_NEUTRAL, false),
        }
    }
}

impl CalibrationConfig {
    pub const fn for_sensor(&self, sensor: SensorType) -> &SensorCalibration {
        match sensor {
            SensorType::Vibration => &self.vibration,
            SensorType::Temperature => &self.temperature,
            SensorType::Power => &self.power,
            SensorType::Rpm => &self.rpm,
            SensorType::Pressure => &self.pressure,
            SensorType::Torque => &self.torque,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub min_points: usize,
    pub min_span_secs: f64,
    pub min_r_squared: f64,
    pub clamp: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_points: defaults::TREND_MIN_POINTS,
            min_span_secs: defaults::TREND_MIN_SPAN_SECS,
            min_r_squared: defaults::TREND_MIN_R_SQUARED,
            clamp: defaults::TREND_CLAMP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub driver_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            critical: defaults::RISK_CRITICAL,
            high: defaults::RISK_HIGH,
            medium: defaults::RISK_MEDIUM,
            driver_threshold: defaults::DRIVER_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Optional TOML/JSON file with per-equipment maintenance history.
    pub path: Option<PathBuf>,
    pub default_days_since_maintenance: f64,
    pub max_days_since_maintenance: f64,
    pub default_equipment_age_years: f64,
    pub max_equipment_age_years: f64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_days_since_maintenance: defaults::DEFAULT_DAYS_SINCE_MAINTENANCE,
            max_days_since_maintenance: defaults::MAX_DAYS_SINCE_MAINTENANCE,
            default_equipment_age_years: defaults::DEFAULT_EQUIPMENT_AGE_YEARS,
            max_equipment_age_years: defaults::MAX_EQUIPMENT_AGE_YEARS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoefficientsConfig {
    /// Optional feature -> coefficient file. Absent means built-in defaults.
    pub path: Option<PathBuf>,
    /// Poll the file for changes every N seconds. 0 disables polling.
    pub poll_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Alert level for equipment without an explicit override.
    pub default_level: AlertLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub critical_routing_key: String,
    pub high_routing_key: String,
    pub critical_queue: String,
    pub high_queue: String,
    pub max_deliveries: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            critical_routing_key: defaults::CRITICAL_ROUTING_KEY.to_string(),
            high_routing_key: defaults::HIGH_ROUTING_KEY.to_string(),
            critical_queue: defaults::CRITICAL_QUEUE.to_string(),
            high_queue: defaults::HIGH_QUEUE.to_string(),
            max_deliveries: defaults::MAX_DELIVERIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub recommendation_ttl_hours: i64,
    pub labor_hours: f64,
    pub labor_rate: f64,
    pub rul_horizon_hours: f64,
    pub immediate_rul_hours: f64,
    pub regulated_prefixes: Vec<String>,
    pub default_approver: String,
    pub default_dismiss_reason: String,
    pub resolved_limit: usize,
    pub recent_actions_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            recommendation_ttl_hours: defaults::RECOMMENDATION_TTL_HOURS,
            labor_hours: defaults::LABOR_HOURS,
            labor_rate: defaults::LABOR_RATE,
            rul_horizon_hours: defaults::RUL_HORIZON_HOURS,
            immediate_rul_hours: defaults::IMMEDIATE_RUL_HOURS,
            regulated_prefixes: defaults::REGULATED_PREFIXES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            default_approver: defaults::DEFAULT_APPROVER.to_string(),
            default_dismiss_reason: defaults::DEFAULT_DISMISS_REASON.to_string(),
            resolved_limit: defaults::RESOLVED_LIMIT,
            recent_actions_limit: defaults::RECENT_ACTIONS_LIMIT,
        }
    }
}

impl WorkflowConfig {
    pub fn labor_cost(&self) -> f64 {
        self.labor_hours * self.labor_rate
    }

    pub fn is_regulated(&self, equipment_id: &str) -> bool {
        self.regulated_prefixes
            .iter()
            .any(|p| equipment_id.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// JSON-RPC endpoint of the communications service. When unset,
    /// notifications are written to the log only.
    pub endpoint: Option<String>,
    pub recipient: String,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            recipient: defaults::NOTIFICATION_RECIPIENT.to_string(),
            timeout_secs: defaults::NOTIFICATION_TIMEOUT_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlantConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scoring.horizon_secs, 180);
        assert_eq!(config.calibration.vibration.critical, 5.0);
        assert!(config.calibration.temperature.clamp);
        assert!(!config.calibration.power.clamp);
        assert!(config.workflow.is_regulated("TYO-CNC-001"));
        assert!(!config.workflow.is_regulated("PHX-CNC-001"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[plant]
name = "Phoenix Works"

[calibration.vibration]
critical = 6.0
neutral = 2.5
clamp = true

[risk]
critical = 0.8
"#
        )
        .unwrap();

        let config = PlantConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.plant.name, "Phoenix Works");
        assert_eq!(config.calibration.vibration.critical, 6.0);
        assert_eq!(config.calibration.temperature.critical, 85.0);
        assert_eq!(config.risk.critical, 0.8);
        assert_eq!(config.risk.high, 0.5);
        assert_eq!(config.scoring.model_id, "failure_predictor_v1");
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = PlantConfig::default();
        config.risk.high = 0.75;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("risk thresholds"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = PlantConfig::default();
        config.scoring.interval_secs = 0;
        config.calibration.power.critical = 0.0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
    }
}
