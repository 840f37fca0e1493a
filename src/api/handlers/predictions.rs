//! Prediction endpoints: latest per-equipment predictions and the reset

use axum::extract::{Path, State};
use axum::response::Response;

use crate::api::envelope::{ApiErrorResponse, ApiResponse};

use super::ApiState;

/// GET /api/v1/predictions - Latest prediction for every equipment
pub async fn list_predictions(State(state): State<ApiState>) -> Response {
    match state.engine.store().all() {
        Ok(predictions) => ApiResponse::ok(predictions),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read predictions");
            ApiErrorResponse::service_unavailable(format!("Prediction store unavailable: {e}"))
        }
    }
}

/// GET /api/v1/predictions/:equipment_id
pub async fn get_prediction(
    State(state): State<ApiState>,
    Path(equipment_id): Path<String>,
) -> Response {
    match state.engine.store().get(&equipment_id) {
        Ok(Some(prediction)) => ApiResponse::ok(prediction),
        Ok(None) => ApiErrorResponse::not_found(format!("No prediction for {equipment_id}")),
        Err(e) => {
            ApiErrorResponse::service_unavailable(format!("Prediction store unavailable: {e}"))
        }
    }
}

/// POST /api/v1/predictions/reset - Clear windows, predictions and alert flags
pub async fn reset_predictions(State(state): State<ApiState>) -> Response {
    match state.engine.reset() {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => {
            tracing::error!(error = %e, "Prediction reset failed");
            ApiErrorResponse::service_unavailable(format!("Reset failed: {e}"))
        }
    }
}
