//! API route handlers
//!
//! Request handling logic for all API endpoints including:
//! - Service health and scoring status
//! - Stored predictions and the operator reset
//! - Model coefficients and their reload
//! - Sample ingress and per-equipment alert levels
//! - Recommendation review (approve / dismiss) and the automated-action log

mod actions;
mod ml;
mod predictions;
mod recommendations;
mod samples;
mod status;

pub use actions::*;
pub use ml::*;
pub use predictions::*;
pub use recommendations::*;
pub use samples::*;
pub use status::*;

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::envelope::ApiErrorResponse;
use crate::broker::AnomalyBroker;
use crate::pipeline::SampleIngestor;
use crate::router::{AnomalyRouter, RouterError};
use crate::scoring::ScoringEngine;
use crate::storage::RecordError;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Scoring engine: windows, prediction store, coefficients, alert gate
    pub engine: Arc<ScoringEngine>,
    /// Validation and window append for pushed samples
    pub ingestor: Arc<SampleIngestor>,
    /// Recommendation state machine and audit log
    pub router: Arc<AnomalyRouter>,
    /// Queue depths for the health endpoint
    pub broker: Arc<AnomalyBroker>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(
        engine: Arc<ScoringEngine>,
        ingestor: Arc<SampleIngestor>,
        router: Arc<AnomalyRouter>,
        broker: Arc<AnomalyBroker>,
    ) -> Self {
        Self {
            engine,
            ingestor,
            router,
            broker,
            started_at: Utc::now(),
        }
    }
}

/// `?limit=N` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

fn record_error(e: &RecordError) -> Response {
    tracing::error!(error = %e, "Record store request failed");
    ApiErrorResponse::internal(e.to_string())
}

fn router_error(e: &RouterError) -> Response {
    match e {
        RouterError::NotFound(id) => {
            ApiErrorResponse::not_found(format!("Recommendation not found: {id}"))
        }
        RouterError::Workflow(inner) => ApiErrorResponse::bad_gateway(inner.to_string()),
        RouterError::Record(inner) => record_error(inner),
    }
}
