//! Telemetry ingress and per-equipment alert levels

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::{AlertLevel, SensorMessage};

use super::ApiState;

// ============================================================================
// POST /api/v1/samples
// ============================================================================

/// Body of `POST /samples`: one message or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SampleBatch {
    Many(Vec<SensorMessage>),
    One(SensorMessage),
}

impl SampleBatch {
    fn into_messages(self) -> Vec<SensorMessage> {
        match self {
            SampleBatch::Many(messages) => messages,
            SampleBatch::One(message) => vec![message],
        }
    }
}

/// A message that was dropped, by its position in the request.
#[derive(Debug, Serialize)]
pub struct RejectedSample {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub dropped: usize,
    pub rejected: Vec<RejectedSample>,
}

/// POST /api/v1/samples - Push sensor messages into the windows
///
/// Malformed messages are dropped and reported; the rest are accepted.
pub async fn post_samples(
    State(state): State<ApiState>,
    body: Result<Json<SampleBatch>, JsonRejection>,
) -> Response {
    let Json(batch) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let mut accepted = 0;
    let mut rejected = Vec::new();
    for (index, message) in batch.into_messages().into_iter().enumerate() {
        match state.ingestor.ingest(message) {
            Ok(()) => accepted += 1,
            Err(reason) => rejected.push(RejectedSample {
                index,
                reason: reason.to_string(),
            }),
        }
    }

    ApiResponse::ok(IngestResponse {
        accepted,
        dropped: rejected.len(),
        rejected,
    })
}

// ============================================================================
// PUT /api/v1/equipment/:id/alert-level
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AlertLevelRequest {
    pub level: AlertLevel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLevelResponse {
    pub equipment_id: String,
    pub level: AlertLevel,
}

/// PUT /api/v1/equipment/:id/alert-level - Highest tier the equipment may publish
pub async fn put_alert_level(
    State(state): State<ApiState>,
    Path(equipment_id): Path<String>,
    body: Result<Json<AlertLevelRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return ApiErrorResponse::bad_request(format!(
                "Expected {{\"level\": \"CRITICAL\" | \"HIGH\" | \"NONE\"}}: {}",
                rejection.body_text()
            ))
        }
    };

    state.engine.alerts().set_level(&equipment_id, request.level);
    tracing::info!(equipment_id = %equipment_id, level = %request.level, "Alert level updated");
    ApiResponse::ok(AlertLevelResponse {
        equipment_id,
        level: request.level,
    })
}
