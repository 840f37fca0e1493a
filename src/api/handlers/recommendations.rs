//! Recommendation review endpoints
//!
//! Approve and dismiss go through the router so they serialize with
//! anomaly handling for the same equipment. Both answer 409 when the
//! recommendation is no longer PENDING and leave it untouched.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::router::Resolution;

use super::{record_error, router_error, ApiState, LimitQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default, alias = "approved_by")]
    pub approved_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DismissRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

fn resolution(result: Resolution) -> Response {
    match result {
        Resolution::Applied(rec) => ApiResponse::ok(rec),
        Resolution::NotPending(rec) => ApiErrorResponse::conflict(format!(
            "Recommendation {} is {}, not PENDING",
            rec.recommendation_id, rec.status
        )),
    }
}

/// GET /api/v1/recommendations - PENDING, highest probability first
pub async fn list_pending(State(state): State<ApiState>) -> Response {
    match state.router.recommendations().pending() {
        Ok(recs) => ApiResponse::ok(recs),
        Err(e) => record_error(&e),
    }
}

/// GET /api/v1/recommendations/resolved - Most recently resolved first
pub async fn list_resolved(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(state.router.context().policy.resolved_limit);
    match state.router.recommendations().resolved(limit) {
        Ok(recs) => ApiResponse::ok(recs),
        Err(e) => record_error(&e),
    }
}

/// GET /api/v1/recommendations/:id
pub async fn get_recommendation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    match state.router.recommendations().get(&id) {
        Ok(Some(rec)) => ApiResponse::ok(rec),
        Ok(None) => ApiErrorResponse::not_found(format!("Recommendation not found: {id}")),
        Err(e) => record_error(&e),
    }
}

/// POST /api/v1/recommendations/:id/approve
///
/// Body is optional: `{"approvedBy": "..."}`.
pub async fn approve_recommendation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<ApproveRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    match state
        .router
        .approve(&id, request.approved_by.as_deref())
        .await
    {
        Ok(result) => resolution(result),
        Err(e) => router_error(&e),
    }
}

/// POST /api/v1/recommendations/:id/dismiss
///
/// Body is optional: `{"reason": "..."}`.
pub async fn dismiss_recommendation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<DismissRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    match state.router.dismiss(&id, request.reason.as_deref()).await {
        Ok(result) => resolution(result),
        Err(e) => router_error(&e),
    }
}
