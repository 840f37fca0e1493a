//! System-wide default constants.
//!
//! Every value here seeds a field of [`PlantConfig`](super::PlantConfig), so an
//! empty config file reproduces the calibration the `failure_predictor_v1`
//! model was fit against. Grouped by subsystem for easy discovery.

// ============================================================================
// Server / Storage
// ============================================================================

/// HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Directory holding the sled databases.
pub const DATA_DIR: &str = "./data";

// ============================================================================
// Scoring
// ============================================================================

/// Window retention horizon (seconds). 180 = 3 minutes.
pub const WINDOW_HORIZON_SECS: u64 = 180;

/// Minimum samples in a window before an equipment is scored.
pub const MIN_WINDOW_SAMPLES: usize = 4;

/// Period of the scoring cycle (seconds).
pub const SCORING_INTERVAL_SECS: u64 = 30;

/// Delay before the first scoring cycle so windows can fill (seconds).
pub const SCORING_INITIAL_DELAY_SECS: u64 = 15;

/// Identifier stamped on every prediction.
pub const MODEL_ID: &str = "failure_predictor_v1";

/// Consecutive failed cycles before the prediction store is reconnected.
pub const RECONNECT_THRESHOLD: u32 = 3;

/// Number of leading equipment-ID characters that name the facility.
pub const FACILITY_PREFIX_LEN: usize = 3;

// ============================================================================
// Sensor calibration (critical constant, neutral default)
// ============================================================================

pub const VIBRATION_CRITICAL: f64 = 5.0;
pub const VIBRATION_NEUTRAL: f64 = 2.0;

pub const TEMPERATURE_CRITICAL: f64 = 85.0;
pub const TEMPERATURE_NEUTRAL: f64 = 50.0;

pub const POWER_CRITICAL: f64 = 50.0;
pub const POWER_NEUTRAL: f64 = 15.0;

pub const RPM_CRITICAL: f64 = 10_000.0;
pub const RPM_NEUTRAL: f64 = 8_500.0;

pub const PRESSURE_CRITICAL: f64 = 10.0;
pub const PRESSURE_NEUTRAL: f64 = 6.0;

pub const TORQUE_CRITICAL: f64 = 80.0;
pub const TORQUE_NEUTRAL: f64 = 45.0;

// ============================================================================
// Trend gate
// ============================================================================

/// Minimum points before a slope is trusted.
pub const TREND_MIN_POINTS: usize = 20;

/// The series must span strictly more than this (seconds).
pub const TREND_MIN_SPAN_SECS: f64 = 60.0;

/// The fit must explain strictly more than this share of variance.
pub const TREND_MIN_R_SQUARED: f64 = 0.5;

/// Normalized trend rates are clamped to `[-TREND_CLAMP, TREND_CLAMP]`.
pub const TREND_CLAMP: f64 = 0.5;

// ============================================================================
// Risk tiers
// ============================================================================

pub const RISK_CRITICAL: f64 = 0.70;
pub const RISK_HIGH: f64 = 0.50;
pub const RISK_MEDIUM: f64 = 0.30;

/// Contributions above this are reported as drivers.
pub const DRIVER_THRESHOLD: f64 = 0.5;

// ============================================================================
// Equipment metadata
// ============================================================================

pub const DEFAULT_DAYS_SINCE_MAINTENANCE: f64 = 30.0;
pub const MAX_DAYS_SINCE_MAINTENANCE: f64 = 90.0;
pub const DEFAULT_EQUIPMENT_AGE_YEARS: f64 = 2.0;
pub const MAX_EQUIPMENT_AGE_YEARS: f64 = 20.0;

// ============================================================================
// Broker
// ============================================================================

pub const CRITICAL_ROUTING_KEY: &str = "anomaly.critical";
pub const HIGH_ROUTING_KEY: &str = "anomaly.high";
pub const CRITICAL_QUEUE: &str = "orchestrator.critical";
pub const HIGH_QUEUE: &str = "orchestrator.high";

/// Deliveries attempted before a message is dead-lettered.
pub const MAX_DELIVERIES: u32 = 5;

// ============================================================================
// Workflows
// ============================================================================

/// Lifetime of a pending recommendation (hours).
pub const RECOMMENDATION_TTL_HOURS: i64 = 48;

/// Labor estimate attached to every recommendation with parts.
pub const LABOR_HOURS: f64 = 6.0;
pub const LABOR_RATE: f64 = 75.0;

/// Remaining-useful-life estimate at probability 0 (hours).
///
/// RUL shrinks linearly to zero as probability approaches 1.
pub const RUL_HORIZON_HOURS: f64 = 240.0;

/// RUL below which the critical path is treated as immediate.
pub const IMMEDIATE_RUL_HOURS: f64 = 24.0;

/// Equipment ID prefixes of facilities under regulatory oversight.
pub const REGULATED_PREFIXES: &[&str] = &["TYO", "MUN"];

pub const DEFAULT_APPROVER: &str = "dashboard-user";
pub const DEFAULT_DISMISS_REASON: &str = "Dismissed by operator";

pub const RESOLVED_LIMIT: usize = 50;
pub const RECENT_ACTIONS_LIMIT: usize = 20;

// ============================================================================
// Notifications
// ============================================================================

pub const NOTIFICATION_RECIPIENT: &str = "maintenance-team@plant.local";
pub const NOTIFICATION_TIMEOUT_SECS: u64 = 10;
