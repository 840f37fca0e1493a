//! Automated CRITICAL response.
//!
//! urgency -> (shutdown) -> parts -> (transfer) -> reservation -> work
//! order -> compliance -> notification -> audit record.
//!
//! Any failing step aborts the run before the audit record is written, so
//! the event can be redelivered. Every collaborator call is keyed by
//! `equipment:event`, so a redelivered run picks up the reservation and
//! work order created by the failed one instead of duplicating them.

use std::sync::Arc;
use tracing::{info, warn};

use super::decisions::{
    assess_parts, assess_urgency, percent, route_compliance, PartsAssessment, Urgency,
};
use super::services::{Notification, NotificationKind, TransferOrder, WorkOrder, WorkOrderRequest};
use super::{at, idempotency_key, WorkflowContext, WorkflowError, WorkflowStep};
use crate::storage::AuditLog;
use crate::types::{
    short_id, ActionStatus, ActionType, AnomalyEvent, AutomatedAction, CriticalAnomalyResponse,
};

pub struct CriticalWorkflow {
    ctx: Arc<WorkflowContext>,
    audit: Arc<AuditLog>,
}

impl CriticalWorkflow {
    pub fn new(ctx: Arc<WorkflowContext>, audit: Arc<AuditLog>) -> Self {
        Self { ctx, audit }
    }

    pub async fn run(&self, event: &AnomalyEvent) -> Result<CriticalAnomalyResponse, WorkflowError> {
        let services = &self.ctx.services;
        let policy = &self.ctx.policy;
        let equipment_id = event.equipment_id.as_str();
        let facility_id = event.facility_id.as_str();
        let key = idempotency_key(equipment_id, &event.event_id);

        info!(
            equipment_id,
            event_id = %event.event_id,
            probability = event.failure_probability,
            fault = %event.fault_type,
            "Critical workflow started"
        );

        let urgency = assess_urgency(event.failure_probability, policy);
        if let Urgency::Immediate { rul_hours } = urgency {
            let confirmation = services
                .maintenance
                .confirm_shutdown(&key, equipment_id)
                .await
                .map_err(at(WorkflowStep::Shutdown, equipment_id))?;
            warn!(
                equipment_id,
                rul_hours,
                confirmed_at = %confirmation.confirmed_at,
                "Emergency shutdown confirmed"
            );
        }

        let assessment = assess_parts(
            services.inventory.as_ref(),
            facility_id,
            event.fault_type,
            policy,
        )
        .await
        .map_err(at(WorkflowStep::PartsAssessment, equipment_id))?;

        let transfer = match &assessment {
            PartsAssessment::Available { .. } => None,
            PartsAssessment::Unavailable {
                needed,
                nearest_facility,
                ..
            } => Some(
                services
                    .logistics
                    .transfer(&key, nearest_facility, facility_id, needed)
                    .await
                    .map_err(at(WorkflowStep::Transfer, equipment_id))?,
            ),
        };

        let reserved_parts = services
            .inventory
            .reserve(&key, &assessment.lines())
            .await
            .map_err(at(WorkflowStep::Reservation, equipment_id))?;

        let now = self.ctx.clock.now();
        let order = services
            .maintenance
            .create_work_order(
                &key,
                WorkOrderRequest {
                    equipment_id: equipment_id.to_string(),
                    facility_id: facility_id.to_string(),
                    priority: urgency.priority(),
                    fault: event.fault_type,
                    description: event.probable_cause.clone(),
                    parts: reserved_parts.clone(),
                    due_by: urgency.due_by(now),
                },
            )
            .await
            .map_err(at(WorkflowStep::WorkOrder, equipment_id))?;

        let compliance = route_compliance(
            services.compliance.as_ref(),
            policy,
            equipment_id,
            facility_id,
            event.fault_type,
        )
        .await
        .map_err(at(WorkflowStep::Compliance, equipment_id))?;

        let mut summary = Self::summarize(event, &order, transfer.as_ref());
        if let Some(line) = compliance.describe() {
            summary = format!("{summary} | {line}");
        }

        let notification = Notification {
            kind: NotificationKind::MaintenanceAlert,
            recipient: self.ctx.recipient_for(facility_id),
            subject: format!(
                "CRITICAL: {equipment_id} {} fault ({}% failure probability)",
                event.fault_type,
                percent(event.failure_probability)
            ),
            body: format!("{}\n\n{summary}", event.probable_cause),
            equipment_id: equipment_id.to_string(),
            work_order_id: order.work_order_id.clone(),
        };
        services
            .notifier
            .send(&notification)
            .await
            .map_err(at(WorkflowStep::Notification, equipment_id))?;

        let action = self.audit.append(AutomatedAction {
            action_id: short_id("ACT"),
            event_id: event.event_id.clone(),
            equipment_id: equipment_id.to_string(),
            facility_id: facility_id.to_string(),
            action_type: ActionType::CriticalResponse,
            risk_level: event.risk_level,
            failure_probability: event.failure_probability,
            probable_cause: event.probable_cause.clone(),
            work_order_id: order.work_order_id.clone(),
            reserved_parts,
            notification_sent: true,
            status: ActionStatus::Completed,
            executed_at: self.ctx.clock.now(),
            summary,
        })?;

        info!(
            equipment_id,
            action_id = %action.action_id,
            work_order_id = %action.work_order_id,
            "Critical workflow completed"
        );

        Ok(CriticalAnomalyResponse {
            equipment_id: action.equipment_id,
            work_order_id: action.work_order_id,
            reserved_parts: action.reserved_parts,
            notification_sent: action.notification_sent,
            summary: action.summary,
        })
    }

    fn summarize(event: &AnomalyEvent, order: &WorkOrder, transfer: Option<&TransferOrder>) -> String {
        let mut summary = format!(
            "{} work order {} for {} fault ({}% failure probability), {} part line(s) reserved",
            order.priority,
            order.work_order_id,
            event.fault_type,
            percent(event.failure_probability),
            order.parts.len()
        );
        if let Some(t) = transfer {
            summary.push_str(&format!(
                " | Parts shipping from {}, arriving {} (transfer {})",
                t.from_facility,
                t.estimated_arrival.format("%Y-%m-%d %H:%M UTC"),
                t.transfer_id
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SharedClock};
    use crate::config::WorkflowConfig;
    use crate::types::{AnomalyEventType, FaultType, RiskLevel, SensorAverages};
    use crate::workflow::SimulatedPlant;
    use chrono::{TimeZone, Utc};

    fn event(equipment_id: &str, probability: f64, fault: FaultType) -> AnomalyEvent {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AnomalyEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: AnomalyEventType::AnomalyCritical,
            timestamp: now,
            equipment_id: equipment_id.into(),
            facility_id: equipment_id[..3].into(),
            risk_level: RiskLevel::Critical,
            failure_probability: probability,
            probable_cause: "Bearing degradation: vibration 4.2 mm/s and rising".into(),
            fault_type: fault,
            averages: SensorAverages::default(),
            scored_at: now,
        }
    }

    fn setup() -> (SimulatedPlant, Arc<AuditLog>, CriticalWorkflow) {
        let clock: SharedClock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let plant = SimulatedPlant::new(Arc::clone(&clock));
        let ctx = Arc::new(WorkflowContext::new(
            plant.services(),
            WorkflowConfig::default(),
            "maintenance@plant.local",
            clock,
        ));
        let audit = Arc::new(AuditLog::in_memory());
        let workflow = CriticalWorkflow::new(ctx, Arc::clone(&audit));
        (plant, audit, workflow)
    }

    #[tokio::test]
    async fn test_immediate_bearing_response() {
        let (plant, audit, workflow) = setup();
        let response = workflow
            .run(&event("PHX-CNC-007", 0.93, FaultType::Bearing))
            .await
            .unwrap();

        assert_eq!(response.work_order_id, "WO-2026-00001");
        assert_eq!(response.reserved_parts.len(), 3);
        assert!(response.notification_sent);
        assert!(response.summary.starts_with("EMERGENCY work order WO-2026-00001"));
        assert_eq!(plant.maintenance.shutdown_count(), 1);
        assert_eq!(plant.notifier.sent_count(), 1);
        assert_eq!(audit.len(), 1);
        assert_eq!(plant.logistics.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_deferrable_spindle_response_transfers_parts() {
        let (plant, _audit, workflow) = setup();
        let response = workflow
            .run(&event("PHX-CNC-002", 0.75, FaultType::Spindle))
            .await
            .unwrap();

        assert!(response.summary.starts_with("SCHEDULED work order"));
        assert!(response.summary.contains("Parts shipping from MUN"));
        assert_eq!(plant.maintenance.shutdown_count(), 0);
        assert_eq!(plant.logistics.transfer_count(), 1);
        assert_eq!(plant.inventory.stock("MUN", "SKU-SPN-9000"), 1);
    }

    #[tokio::test]
    async fn test_regulated_equipment_carries_compliance() {
        let (_plant, _audit, workflow) = setup();
        let response = workflow
            .run(&event("MUN-CNC-004", 0.9, FaultType::Motor))
            .await
            .unwrap();
        assert!(response
            .summary
            .contains("Compliance: HOLD_REQUIRED (AS9100) | Batch: BATCH-MUN-20260301"));
    }

    #[tokio::test]
    async fn test_redelivery_reuses_work_order() {
        let (plant, audit, workflow) = setup();
        let evt = event("PHX-CNC-007", 0.93, FaultType::Bearing);
        let first = workflow.run(&evt).await.unwrap();
        let second = workflow.run(&evt).await.unwrap();

        assert_eq!(first.work_order_id, second.work_order_id);
        assert_eq!(plant.maintenance.work_order_count(), 1);
        assert_eq!(plant.inventory.reservation_count(), 1);
        assert_eq!(plant.inventory.stock("PHX", "SKU-BRG-7420"), 3);
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_leaves_no_audit_record() {
        let (plant, audit, workflow) = setup();
        plant.notifier.fail_next(1);
        let evt = event("PHX-CNC-007", 0.93, FaultType::Bearing);

        let err = workflow.run(&evt).await.unwrap_err();
        assert_eq!(err.step(), Some(WorkflowStep::Notification));
        assert!(audit.is_empty());

        // Retry completes with the same work order and reservation.
        let response = workflow.run(&evt).await.unwrap();
        assert_eq!(response.work_order_id, "WO-2026-00001");
        assert_eq!(plant.maintenance.work_order_count(), 1);
        assert_eq!(plant.inventory.reservation_count(), 1);
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_work_order_failure_aborts_run() {
        let (plant, audit, workflow) = setup();
        plant.maintenance.fail_next(1);
        let err = workflow
            .run(&event("PHX-CNC-007", 0.93, FaultType::Bearing))
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some(WorkflowStep::WorkOrder));
        assert_eq!(plant.notifier.sent_count(), 0);
        assert!(audit.is_empty());
    }
}
