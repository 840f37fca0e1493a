//! Repair for an approved recommendation.
//!
//! Uses the parts already reserved by the HIGH workflow and keys the work
//! order by `APPROVAL-<recommendationId>`, so a retried approval yields the
//! same work order.

use std::sync::Arc;
use tracing::info;

use super::decisions::{assess_urgency, percent};
use super::services::{Notification, NotificationKind, WorkOrder, WorkOrderRequest};
use super::{approval_event_id, at, idempotency_key, WorkflowContext, WorkflowError, WorkflowStep};
use crate::types::Recommendation;

pub struct RemediationWorkflow {
    ctx: Arc<WorkflowContext>,
}

impl RemediationWorkflow {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, rec: &Recommendation, approved_by: &str) -> Result<WorkOrder, WorkflowError> {
        let services = &self.ctx.services;
        let equipment_id = rec.equipment_id.as_str();
        let key = idempotency_key(equipment_id, &approval_event_id(&rec.recommendation_id));
        let urgency = assess_urgency(rec.failure_probability, &self.ctx.policy);

        let order = services
            .maintenance
            .create_work_order(
                &key,
                WorkOrderRequest {
                    equipment_id: equipment_id.to_string(),
                    facility_id: rec.facility_id.clone(),
                    priority: urgency.priority(),
                    fault: rec.fault_type,
                    description: format!("{} ({})", rec.recommended_action, rec.probable_cause),
                    parts: rec.reserved_parts.clone(),
                    due_by: urgency.due_by(self.ctx.clock.now()),
                },
            )
            .await
            .map_err(at(WorkflowStep::WorkOrder, equipment_id))?;

        services
            .notifier
            .send(&Notification {
                kind: NotificationKind::MaintenanceAlert,
                recipient: self.ctx.recipient_for(&rec.facility_id),
                subject: format!(
                    "Approved: {equipment_id} maintenance ({}% failure probability)",
                    percent(rec.failure_probability)
                ),
                body: format!(
                    "{}\nApproved by {approved_by} from recommendation {}.",
                    rec.recommended_action, rec.recommendation_id
                ),
                equipment_id: equipment_id.to_string(),
                work_order_id: order.work_order_id.clone(),
            })
            .await
            .map_err(at(WorkflowStep::Notification, equipment_id))?;

        info!(
            equipment_id,
            recommendation_id = %rec.recommendation_id,
            work_order_id = %order.work_order_id,
            approved_by,
            "Remediation scheduled"
        );
        Ok(order)
    }
}
