//! Model endpoints: active coefficients, reload and scoring status

use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::scoring::{CoefficientError, CoefficientSet, CycleReport};

use super::ApiState;

// ============================================================================
// Response types
// ============================================================================

/// Response for `/api/v1/ml/status`
#[derive(Debug, Serialize)]
pub struct ScoringStatus {
    pub model_id: String,
    pub coefficients_source: String,
    pub last_cycle: Option<CycleReport>,
    pub consecutive_store_failures: u32,
    pub equipment_tracked: usize,
    pub buffered_samples: usize,
    pub window_horizon_secs: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/ml/model - The coefficient set scoring currently uses
pub async fn get_model(State(state): State<ApiState>) -> Response {
    let current: Arc<CoefficientSet> = state.engine.coefficients().current();
    ApiResponse::ok(current.as_ref().clone())
}

/// POST /api/v1/ml/coefficients/reload
///
/// On failure the previous set stays active.
pub async fn reload_coefficients(State(state): State<ApiState>) -> Response {
    match state.engine.coefficients().reload() {
        Ok(set) => {
            tracing::info!(source = %set.source, "Coefficients reloaded via API");
            ApiResponse::ok(set.as_ref().clone())
        }
        Err(e @ CoefficientError::NoSource) => ApiErrorResponse::bad_request(e.to_string()),
        Err(e @ (CoefficientError::Parse(..) | CoefficientError::NotFinite(_))) => {
            ApiErrorResponse::bad_request(format!("Reload rejected: {e}"))
        }
        Err(e @ CoefficientError::Io(..)) => {
            ApiErrorResponse::internal(format!("Reload failed: {e}"))
        }
    }
}

/// GET /api/v1/ml/status
pub async fn get_scoring_status(State(state): State<ApiState>) -> Response {
    let engine = &state.engine;
    let current = engine.coefficients().current();
    ApiResponse::ok(ScoringStatus {
        model_id: current.model_id.clone(),
        coefficients_source: current.source.clone(),
        last_cycle: engine.last_cycle(),
        consecutive_store_failures: engine.consecutive_failures(),
        equipment_tracked: engine.windows().len(),
        buffered_samples: engine.windows().sample_count(),
        window_horizon_secs: engine.windows().horizon().num_seconds(),
    })
}
