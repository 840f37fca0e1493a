//! Anomaly event router
//!
//! Sends each anomaly event to its workflow and owns the per-equipment
//! recommendation state machine:
//!
//! | state            | input    | effect                                        |
//! |------------------|----------|-----------------------------------------------|
//! | none / terminal  | HIGH     | reserve parts, create PENDING recommendation  |
//! | PENDING          | HIGH     | skip                                          |
//! | PENDING          | CRITICAL | supersede, release its parts, run CRITICAL    |
//! | none / terminal  | CRITICAL | run CRITICAL                                  |
//! | PENDING          | approve  | remediation, then COMPLETED                   |
//! | PENDING          | dismiss  | release parts, DISMISSED                      |
//!
//! Every input for one equipment runs under that equipment's async mutex;
//! inputs for different equipment run in parallel.

mod consumer;

pub use consumer::{ConsumerReport, EventConsumer};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::storage::{AuditLog, RecommendationStore, RecordError};
use crate::types::{AnomalyEvent, AnomalyEventType, CriticalAnomalyResponse, Recommendation};
use crate::workflow::{
    idempotency_key, CriticalWorkflow, HighWorkflow, RemediationWorkflow, WorkflowContext,
    WorkflowError,
};

/// Note written on a recommendation replaced by a CRITICAL response.
pub const SUPERSEDED_NOTE: &str = "Superseded by CRITICAL alert - auto-response triggered";

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Recommendation not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Debug, Clone)]
pub enum CriticalOutcome {
    Completed(CriticalAnomalyResponse),
    /// The event was already handled; carries the recorded action ID.
    AlreadyHandled { action_id: String },
}

#[derive(Debug, Clone)]
pub enum HighOutcome {
    Created(Recommendation),
    /// A PENDING recommendation already covers the equipment.
    Skipped { pending_id: String },
}

/// Result of an approve or dismiss request.
#[derive(Debug, Clone)]
pub enum Resolution {
    Applied(Recommendation),
    /// Nothing changed; the recommendation was no longer PENDING.
    NotPending(Recommendation),
}

#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Critical(CriticalOutcome),
    High(HighOutcome),
}

pub struct AnomalyRouter {
    ctx: Arc<WorkflowContext>,
    recommendations: Arc<RecommendationStore>,
    audit: Arc<AuditLog>,
    critical: CriticalWorkflow,
    high: HighWorkflow,
    remediation: RemediationWorkflow,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AnomalyRouter {
    pub fn new(
        ctx: Arc<WorkflowContext>,
        recommendations: Arc<RecommendationStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            critical: CriticalWorkflow::new(Arc::clone(&ctx), Arc::clone(&audit)),
            high: HighWorkflow::new(Arc::clone(&ctx)),
            remediation: RemediationWorkflow::new(Arc::clone(&ctx)),
            ctx,
            recommendations,
            audit,
            locks: DashMap::new(),
        }
    }

    pub fn recommendations(&self) -> &Arc<RecommendationStore> {
        &self.recommendations
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn context(&self) -> &Arc<WorkflowContext> {
        &self.ctx
    }

    fn equipment_lock(&self, equipment_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(equipment_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Dispatch on the event type.
    pub async fn route(&self, event: &AnomalyEvent) -> Result<RouteOutcome, RouterError> {
        match event.event_type {
            AnomalyEventType::AnomalyCritical => {
                self.handle_critical(event).await.map(RouteOutcome::Critical)
            }
            AnomalyEventType::AnomalyHigh => self.handle_high(event).await.map(RouteOutcome::High),
        }
    }

    pub async fn handle_critical(&self, event: &AnomalyEvent) -> Result<CriticalOutcome, RouterError> {
        let lock = self.equipment_lock(&event.equipment_id);
        let _guard = lock.lock().await;

        if let Some(action) = self.audit.by_event(&event.event_id) {
            info!(
                equipment_id = %event.equipment_id,
                event_id = %event.event_id,
                "Critical event already handled"
            );
            return Ok(CriticalOutcome::AlreadyHandled {
                action_id: action.action_id,
            });
        }

        if let Some(superseded) = self
            .recommendations
            .supersede_pending(&event.equipment_id, SUPERSEDED_NOTE)?
        {
            self.release_parts(&superseded).await;
        }

        let response = self.critical.run(event).await?;
        Ok(CriticalOutcome::Completed(response))
    }

    pub async fn handle_high(&self, event: &AnomalyEvent) -> Result<HighOutcome, RouterError> {
        let lock = self.equipment_lock(&event.equipment_id);
        let _guard = lock.lock().await;

        if let Some(pending) = self.recommendations.pending_for(&event.equipment_id)? {
            info!(
                equipment_id = %event.equipment_id,
                recommendation_id = %pending.recommendation_id,
                "Pending recommendation exists, skipping HIGH event"
            );
            return Ok(HighOutcome::Skipped {
                pending_id: pending.recommendation_id,
            });
        }

        let response = self.high.run(event).await?;
        let rec = self.high.recommendation(event, &response);
        match self.recommendations.create(rec) {
            Ok(created) => Ok(HighOutcome::Created(created)),
            Err(RecordError::PendingExists {
                recommendation_id, ..
            }) => {
                self.release_key(&idempotency_key(&event.equipment_id, &event.event_id))
                    .await;
                Ok(HighOutcome::Skipped {
                    pending_id: recommendation_id,
                })
            }
            Err(e) => {
                self.release_key(&idempotency_key(&event.equipment_id, &event.event_id))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Approve a PENDING recommendation and run its remediation. A failed
    /// remediation puts the recommendation back to PENDING.
    pub async fn approve(&self, id: &str, approved_by: Option<&str>) -> Result<Resolution, RouterError> {
        let rec = self.find(id)?;
        let lock = self.equipment_lock(&rec.equipment_id);
        let _guard = lock.lock().await;

        let approver = approved_by
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(self.ctx.policy.default_approver.as_str());
        let Some(approved) = self
            .recommendations
            .begin_approval(id, approver, self.ctx.clock.now())?
        else {
            return Ok(Resolution::NotPending(self.find(id)?));
        };

        match self.remediation.run(&approved, approver).await {
            Ok(order) => {
                let completed = self.recommendations.complete(id, &order.work_order_id)?;
                info!(
                    recommendation_id = id,
                    work_order_id = %order.work_order_id,
                    approved_by = approver,
                    "Recommendation completed"
                );
                Ok(Resolution::Applied(completed))
            }
            Err(e) => {
                warn!(recommendation_id = id, error = %e, "Remediation failed, approval reverted");
                self.recommendations
                    .revert_approval(id, &format!("Remediation failed: {e}"))?;
                Err(e.into())
            }
        }
    }

    /// Dismiss a PENDING recommendation and release its parts.
    pub async fn dismiss(&self, id: &str, reason: Option<&str>) -> Result<Resolution, RouterError> {
        let rec = self.find(id)?;
        let lock = self.equipment_lock(&rec.equipment_id);
        let _guard = lock.lock().await;

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(self.ctx.policy.default_dismiss_reason.as_str());
        match self.recommendations.dismiss(id, reason)? {
            Some(dismissed) => {
                self.release_parts(&dismissed).await;
                info!(recommendation_id = id, reason, "Recommendation dismissed");
                Ok(Resolution::Applied(dismissed))
            }
            None => Ok(Resolution::NotPending(self.find(id)?)),
        }
    }

    fn find(&self, id: &str) -> Result<Recommendation, RouterError> {
        self.recommendations
            .get(id)?
            .ok_or_else(|| RouterError::NotFound(id.to_string()))
    }

    async fn release_parts(&self, rec: &Recommendation) {
        if rec.reserved_parts.is_empty() {
            return;
        }
        self.release_key(&idempotency_key(&rec.equipment_id, &rec.event_id))
            .await;
    }

    // A failed release leaves stock held but never blocks the caller.
    async fn release_key(&self, key: &str) {
        if let Err(e) = self.ctx.services.inventory.release(key).await {
            warn!(key, error = %e, "Failed to release reserved parts");
        }
    }
}
