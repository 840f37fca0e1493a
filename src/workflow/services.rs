//! Collaborator interfaces used by the response workflows.
//!
//! Inventory, logistics, maintenance scheduling, compliance and
//! notification are external systems. The workflows only see these
//! traits; [`super::simulated`] provides in-process implementations and
//! [`super::notify`] a JSON-RPC notifier.
//!
//! Every mutating call takes an idempotency key. Repeating a call with the
//! same key returns the original result instead of acting twice, which is
//! what makes redelivered anomaly events safe to re-run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FaultType, ReservedPart};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
    #[error("Insufficient stock for {sku} at {facility_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        facility_id: String,
        requested: u32,
        available: u32,
    },
    #[error("Unknown part {0}")]
    UnknownPart(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("Remote error: {0}")]
    Remote(String),
}

// ============================================================================
// Inventory
// ============================================================================

/// A catalog part that can repair a fault, with its stock position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPart {
    pub sku: String,
    pub name: String,
    pub role: String,
    pub unit_price: f64,
    /// Units on hand at the equipment's facility.
    pub local_stock: u32,
    /// Units on hand across all facilities.
    pub total_stock: u32,
}

/// One line of a reservation: `quantity` units of `sku` held at
/// `facility_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRequest {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub facility_id: String,
}

impl PartRequest {
    pub fn from_catalog(part: &CatalogPart, facility_id: &str, quantity: u32) -> Self {
        Self {
            sku: part.sku.clone(),
            name: part.name.clone(),
            quantity,
            unit_price: part.unit_price,
            facility_id: facility_id.to_string(),
        }
    }

    pub fn line_cost(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// Parts whose role repairs `fault`, in catalog order (primary roles
    /// first), with stock positions relative to `facility_id`.
    async fn compatible_parts(
        &self,
        facility_id: &str,
        fault: FaultType,
    ) -> Result<Vec<CatalogPart>, ServiceError>;

    /// Closest facility other than `facility_id` holding at least
    /// `quantity` units of `sku`.
    async fn nearest_stock(
        &self,
        sku: &str,
        facility_id: &str,
        quantity: u32,
    ) -> Result<Option<String>, ServiceError>;

    /// Hold every line of `parts`. All-or-nothing; idempotent by `key`.
    async fn reserve(
        &self,
        key: &str,
        parts: &[PartRequest],
    ) -> Result<Vec<ReservedPart>, ServiceError>;

    /// Return the stock held under `key`. Returns the number of lines
    /// released, 0 if nothing was held.
    async fn release(&self, key: &str) -> Result<usize, ServiceError>;
}

// ============================================================================
// Logistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub transfer_id: String,
    pub from_facility: String,
    pub to_facility: String,
    pub skus: Vec<String>,
    pub estimated_arrival: DateTime<Utc>,
}

#[async_trait]
pub trait Logistics: Send + Sync {
    /// Arrange a cross-facility shipment. Idempotent by `key`.
    async fn transfer(
        &self,
        key: &str,
        from_facility: &str,
        to_facility: &str,
        parts: &[PartRequest],
    ) -> Result<TransferOrder, ServiceError>;
}

// ============================================================================
// Maintenance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkOrderPriority {
    Emergency,
    Scheduled,
}

impl std::fmt::Display for WorkOrderPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkOrderPriority::Emergency => write!(f, "EMERGENCY"),
            WorkOrderPriority::Scheduled => write!(f, "SCHEDULED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRequest {
    pub equipment_id: String,
    pub facility_id: String,
    pub priority: WorkOrderPriority,
    pub fault: FaultType,
    pub description: String,
    pub parts: Vec<ReservedPart>,
    pub due_by: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    /// `WO-YYYY-NNNNN`
    pub work_order_id: String,
    pub equipment_id: String,
    pub facility_id: String,
    pub priority: WorkOrderPriority,
    pub description: String,
    pub parts: Vec<ReservedPart>,
    pub created_at: DateTime<Utc>,
    pub due_by: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownConfirmation {
    pub equipment_id: String,
    pub confirmed_at: DateTime<Utc>,
}

#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Create a work order. Idempotent by `key`.
    async fn create_work_order(
        &self,
        key: &str,
        request: WorkOrderRequest,
    ) -> Result<WorkOrder, ServiceError>;

    /// Ask the floor to take the machine out of service. Idempotent by `key`.
    async fn confirm_shutdown(
        &self,
        key: &str,
        equipment_id: &str,
    ) -> Result<ShutdownConfirmation, ServiceError>;
}

// ============================================================================
// Compliance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Cleared,
    HoldRequired,
    ReviewNeeded,
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComplianceStatus::Cleared => "CLEARED",
            ComplianceStatus::HoldRequired => "HOLD_REQUIRED",
            ComplianceStatus::ReviewNeeded => "REVIEW_NEEDED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegulatoryFramework {
    #[serde(rename = "FAA")]
    Faa,
    #[serde(rename = "ISO_13485")]
    Iso13485,
    #[serde(rename = "AS9100")]
    As9100,
}

impl std::fmt::Display for RegulatoryFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegulatoryFramework::Faa => "FAA",
            RegulatoryFramework::Iso13485 => "ISO_13485",
            RegulatoryFramework::As9100 => "AS9100",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerification {
    pub equipment_id: String,
    pub status: ComplianceStatus,
    pub framework: RegulatoryFramework,
    /// Production batch traced for the audit trail.
    pub material_batch_id: String,
}

#[async_trait]
pub trait Compliance: Send + Sync {
    async fn verify(
        &self,
        equipment_id: &str,
        facility_id: &str,
        fault: FaultType,
    ) -> Result<ComplianceVerification, ServiceError>;
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    MaintenanceAlert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub equipment_id: String,
    pub work_order_id: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError>;
    fn backend_name(&self) -> &'static str;
}
