//! Automated-action log endpoints

use axum::extract::{Path, Query, State};
use axum::response::Response;

use crate::api::envelope::{ApiErrorResponse, ApiResponse};

use super::{ApiState, LimitQuery};

/// GET /api/v1/automated-actions - Most recent first
pub async fn list_actions(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(state.router.context().policy.recent_actions_limit);
    ApiResponse::ok(state.router.audit().recent(limit))
}

/// GET /api/v1/automated-actions/:id
pub async fn get_action(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.router.audit().by_id(&id) {
        Some(action) => ApiResponse::ok(action),
        None => ApiErrorResponse::not_found(format!("Automated action not found: {id}")),
    }
}

/// GET /api/v1/automated-actions/equipment/:equipment_id
pub async fn list_actions_for_equipment(
    State(state): State<ApiState>,
    Path(equipment_id): Path<String>,
) -> Response {
    ApiResponse::ok(state.router.audit().by_equipment(&equipment_id))
}
