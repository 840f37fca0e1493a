//! Service health endpoint

use axum::extract::State;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;

use crate::api::envelope::ApiResponse;
use crate::broker::BrokerStats;
use crate::pipeline::IngestStats;

use super::ApiState;

/// Response for `/api/v1/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "UP" when the prediction store answers, "DEGRADED" otherwise
    pub status: &'static str,
    pub uptime_secs: i64,
    pub store_backend: &'static str,
    pub store_reachable: bool,
    pub consecutive_store_failures: u32,
    pub equipment_tracked: usize,
    pub buffered_samples: usize,
    pub ingest: IngestStats,
    pub broker: BrokerStats,
    pub automated_actions: usize,
}

/// GET /api/v1/health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    let store = state.engine.store();
    let store_reachable = match store.ping() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Prediction store unreachable from health check");
            false
        }
    };
    let windows = state.engine.windows();

    ApiResponse::ok(HealthResponse {
        status: if store_reachable { "UP" } else { "DEGRADED" },
        uptime_secs: (Utc::now() - state.started_at).num_seconds().max(0),
        store_backend: store.backend_name(),
        store_reachable,
        consecutive_store_failures: state.engine.consecutive_failures(),
        equipment_tracked: windows.len(),
        buffered_samples: windows.sample_count(),
        ingest: state.ingestor.stats(),
        broker: state.broker.stats(),
        automated_actions: state.router.audit().len(),
    })
}
