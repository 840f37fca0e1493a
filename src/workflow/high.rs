//! HIGH response: reserve parts ahead of time and propose a repair.
//!
//! No work order is created. The router persists the result as a PENDING
//! recommendation; approval later runs [`super::remediation`] with the
//! parts held here.

use chrono::Duration;
use std::sync::Arc;
use tracing::info;

use super::decisions::{assess_parts, assess_urgency, percent, recommended_action};
use super::{at, idempotency_key, WorkflowContext, WorkflowError, WorkflowStep};
use crate::types::{
    short_id, AnomalyEvent, HighAnomalyResponse, Recommendation, RecommendationStatus,
};

pub struct HighWorkflow {
    ctx: Arc<WorkflowContext>,
}

impl HighWorkflow {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, event: &AnomalyEvent) -> Result<HighAnomalyResponse, WorkflowError> {
        let services = &self.ctx.services;
        let policy = &self.ctx.policy;
        let equipment_id = event.equipment_id.as_str();

        let urgency = assess_urgency(event.failure_probability, policy);
        let assessment = assess_parts(
            services.inventory.as_ref(),
            &event.facility_id,
            event.fault_type,
            policy,
        )
        .await
        .map_err(at(WorkflowStep::PartsAssessment, equipment_id))?;

        let lines = assessment.lines();
        let reserved_parts = if lines.is_empty() {
            Vec::new()
        } else {
            services
                .inventory
                .reserve(&idempotency_key(equipment_id, &event.event_id), &lines)
                .await
                .map_err(at(WorkflowStep::Reservation, equipment_id))?
        };

        let response = HighAnomalyResponse {
            equipment_id: equipment_id.to_string(),
            recommendation_id: None,
            recommended_action: recommended_action(&urgency, event.fault_type, &assessment),
            estimated_cost: assessment.cost(),
            summary: format!(
                "Diagnosed {} with {}% failure probability",
                event.fault_type,
                percent(event.failure_probability)
            ),
            reserved_parts,
        };
        info!(
            equipment_id,
            parts = response.reserved_parts.len(),
            estimated_cost = response.estimated_cost,
            "High workflow prepared recommendation"
        );
        Ok(response)
    }

    /// PENDING recommendation for a workflow result.
    pub fn recommendation(&self, event: &AnomalyEvent, response: &HighAnomalyResponse) -> Recommendation {
        let now = self.ctx.clock.now();
        Recommendation {
            recommendation_id: response
                .recommendation_id
                .clone()
                .unwrap_or_else(|| short_id("REC")),
            equipment_id: event.equipment_id.clone(),
            facility_id: event.facility_id.clone(),
            event_id: event.event_id.clone(),
            risk_level: event.risk_level,
            failure_probability: event.failure_probability,
            probable_cause: event.probable_cause.clone(),
            fault_type: event.fault_type,
            recommended_action: response.recommended_action.clone(),
            reserved_parts: response.reserved_parts.clone(),
            estimated_cost: response.estimated_cost,
            status: RecommendationStatus::Pending,
            created_at: now,
            expires_at: now + Duration::hours(self.ctx.policy.recommendation_ttl_hours),
            approved_at: None,
            approved_by: None,
            work_order_id: None,
            notes: None,
        }
    }
}
