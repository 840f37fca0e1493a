//! Anomaly response workflows
//!
//! - [`critical`]: fully automated response to a CRITICAL anomaly, ending
//!   in one audit record
//! - [`high`]: proactive part reservation for a HIGH anomaly, returned to
//!   the router as a recommendation awaiting approval
//! - [`remediation`]: the repair run when a recommendation is approved
//!
//! Collaborators are reached only through the traits in [`services`].
//! All of their mutating calls are keyed by [`idempotency_key`], so running
//! a workflow twice for the same event has the effects of running it once.

pub mod critical;
pub mod decisions;
pub mod high;
pub mod notify;
pub mod remediation;
pub mod services;
pub mod simulated;

pub use critical::CriticalWorkflow;
pub use decisions::{
    assess_parts, assess_urgency, route_compliance, ComplianceRouting, PartsAssessment, Urgency,
};
pub use high::HighWorkflow;
pub use notify::{HttpNotifier, LogNotifier};
pub use remediation::RemediationWorkflow;
pub use services::*;
pub use simulated::SimulatedPlant;

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::WorkflowConfig;
use crate::storage::RecordError;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    Shutdown,
    PartsAssessment,
    Transfer,
    Reservation,
    WorkOrder,
    Compliance,
    Notification,
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStep::Shutdown => "shutdown confirmation",
            WorkflowStep::PartsAssessment => "parts assessment",
            WorkflowStep::Transfer => "parts transfer",
            WorkflowStep::Reservation => "parts reservation",
            WorkflowStep::WorkOrder => "work order",
            WorkflowStep::Compliance => "compliance verification",
            WorkflowStep::Notification => "notification",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{step} failed for {equipment_id}: {source}")]
    Step {
        step: WorkflowStep,
        equipment_id: String,
        #[source]
        source: ServiceError,
    },
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

impl WorkflowError {
    pub fn step(&self) -> Option<WorkflowStep> {
        match self {
            WorkflowError::Step { step, .. } => Some(*step),
            WorkflowError::Record(_) => None,
        }
    }
}

/// Attach the failing step and equipment to a collaborator error.
pub(crate) fn at(step: WorkflowStep, equipment_id: &str) -> impl FnOnce(ServiceError) -> WorkflowError + '_ {
    move |source| WorkflowError::Step {
        step,
        equipment_id: equipment_id.to_string(),
        source,
    }
}

// ============================================================================
// Context
// ============================================================================

/// Key under which every collaborator call for one event is deduplicated.
pub fn idempotency_key(equipment_id: &str, event_id: &str) -> String {
    format!("{equipment_id}:{event_id}")
}

/// Event ID used for the remediation run of an approved recommendation.
pub fn approval_event_id(recommendation_id: &str) -> String {
    format!("APPROVAL-{recommendation_id}")
}

#[derive(Clone)]
pub struct WorkflowServices {
    pub inventory: Arc<dyn Inventory>,
    pub logistics: Arc<dyn Logistics>,
    pub maintenance: Arc<dyn Maintenance>,
    pub compliance: Arc<dyn Compliance>,
    pub notifier: Arc<dyn Notifier>,
}

/// Everything a workflow run needs besides the event itself.
pub struct WorkflowContext {
    pub services: WorkflowServices,
    pub policy: WorkflowConfig,
    /// Alert recipient; the equipment's facility when empty.
    pub recipient: String,
    pub clock: SharedClock,
}

impl WorkflowContext {
    pub fn new(
        services: WorkflowServices,
        policy: WorkflowConfig,
        recipient: impl Into<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            services,
            policy,
            recipient: recipient.into(),
            clock,
        }
    }

    pub(crate) fn recipient_for(&self, facility_id: &str) -> String {
        if self.recipient.trim().is_empty() {
            facility_id.to_string()
        } else {
            self.recipient.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn test_keys() {
        assert_eq!(idempotency_key("PHX-CNC-007", "evt-1"), "PHX-CNC-007:evt-1");
        assert_eq!(approval_event_id("REC-1A2B3C4D"), "APPROVAL-REC-1A2B3C4D");
    }

    #[test]
    fn test_empty_recipient_falls_back_to_facility() {
        let clock: SharedClock = Arc::new(SystemClock);
        let plant = SimulatedPlant::new(Arc::clone(&clock));
        let ctx = WorkflowContext::new(plant.services(), WorkflowConfig::default(), " ", clock);
        assert_eq!(ctx.recipient_for("PHX"), "PHX");
    }

    #[test]
    fn test_step_error_message() {
        let err = at(WorkflowStep::WorkOrder, "PHX-1")(ServiceError::Remote("down".into()));
        assert_eq!(err.to_string(), "work order failed for PHX-1: Remote error: down");
        assert_eq!(err.step(), Some(WorkflowStep::WorkOrder));
    }
}
