//! Records produced by the response workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FaultType, RiskLevel};

/// Lifecycle of a recommendation.
///
/// `Pending -> Approved -> Completed` on approval, `Pending -> Dismissed` on
/// rejection and `Pending -> Superseded` when a CRITICAL event for the same
/// equipment arrives first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Dismissed,
    Superseded,
    Completed,
}

impl RecommendationStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Dismissed | Self::Superseded)
    }
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecommendationStatus::Pending => "PENDING",
            RecommendationStatus::Approved => "APPROVED",
            RecommendationStatus::Dismissed => "DISMISSED",
            RecommendationStatus::Superseded => "SUPERSEDED",
            RecommendationStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// A part held for a repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedPart {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub reservation_id: String,
}

impl ReservedPart {
    pub fn line_cost(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// A HIGH-risk finding held for human approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_id: String,
    pub equipment_id: String,
    pub facility_id: String,
    /// Anomaly event the recommendation was created from.
    pub event_id: String,
    pub risk_level: RiskLevel,
    pub failure_probability: f64,
    pub probable_cause: String,
    #[serde(default)]
    pub fault_type: FaultType,
    pub recommended_action: String,
    pub reserved_parts: Vec<ReservedPart>,
    pub estimated_cost: f64,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub work_order_id: Option<String>,
    pub notes: Option<String>,
}

impl Recommendation {
    pub fn is_pending(&self) -> bool {
        self.status == RecommendationStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    CriticalResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Completed,
}

/// Audit record of one completed automated CRITICAL response.
/// Written once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatedAction {
    pub action_id: String,
    pub event_id: String,
    pub equipment_id: String,
    pub facility_id: String,
    pub action_type: ActionType,
    pub risk_level: RiskLevel,
    pub failure_probability: f64,
    pub probable_cause: String,
    pub work_order_id: String,
    pub reserved_parts: Vec<ReservedPart>,
    pub notification_sent: bool,
    pub status: ActionStatus,
    pub executed_at: DateTime<Utc>,
    pub summary: String,
}

/// Outcome of the automated CRITICAL workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalAnomalyResponse {
    pub equipment_id: String,
    pub work_order_id: String,
    pub reserved_parts: Vec<ReservedPart>,
    pub notification_sent: bool,
    pub summary: String,
}

/// Outcome of the HIGH workflow, persisted by the router as a PENDING
/// recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighAnomalyResponse {
    pub equipment_id: String,
    /// Assigned when the router persists the recommendation.
    pub recommendation_id: Option<String>,
    pub reserved_parts: Vec<ReservedPart>,
    pub recommended_action: String,
    pub estimated_cost: f64,
    pub summary: String,
}

/// Short uppercase identifier with a fixed prefix, e.g. `REC-1A2B3C4D`.
pub fn short_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", uuid[..8].to_ascii_uppercase())
}
