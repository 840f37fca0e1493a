//! API route definitions
//!
//! Endpoints under `/api/v1`:
//! - /health - Store reachability, ingest counters, queue depths
//! - /predictions - Latest prediction per equipment, and the reset
//! - /ml - Active coefficients, reload, scoring status
//! - /samples - Telemetry ingress
//! - /equipment/:id/alert-level - Per-equipment publication level
//! - /recommendations - Review queue, approve, dismiss
//! - /automated-actions - CRITICAL response log

use axum::routing::{get, post, put};
use axum::Router;

use super::handlers::{self, ApiState};

/// Create all `/api/v1` routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        // Predictions
        .route("/predictions", get(handlers::list_predictions))
        .route("/predictions/reset", post(handlers::reset_predictions))
        .route("/predictions/:equipment_id", get(handlers::get_prediction))
        // Model
        .route("/ml/model", get(handlers::get_model))
        .route("/ml/coefficients/reload", post(handlers::reload_coefficients))
        .route("/ml/status", get(handlers::get_scoring_status))
        // Ingress
        .route("/samples", post(handlers::post_samples))
        .route("/equipment/:equipment_id/alert-level", put(handlers::put_alert_level))
        // Recommendations (resolved before parameterized route to avoid capture)
        .route("/recommendations", get(handlers::list_pending))
        .route("/recommendations/resolved", get(handlers::list_resolved))
        .route("/recommendations/:id", get(handlers::get_recommendation))
        .route("/recommendations/:id/approve", post(handlers::approve_recommendation))
        .route("/recommendations/:id/dismiss", post(handlers::dismiss_recommendation))
        // Automated actions
        .route("/automated-actions", get(handlers::list_actions))
        .route(
            "/automated-actions/equipment/:equipment_id",
            get(handlers::list_actions_for_equipment),
        )
        .route("/automated-actions/:id", get(handlers::get_action))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::AnomalyBroker;
    use crate::clock::{ManualClock, SharedClock};
    use crate::config::{BrokerConfig, CalibrationConfig, RiskConfig, TrendConfig, WorkflowConfig};
    use crate::pipeline::SampleIngestor;
    use crate::router::AnomalyRouter;
    use crate::scoring::{
        AlertGate, CoefficientStore, EngineSettings, FeatureExtractor, MetadataCatalog,
        RiskScorer, ScoringEngine, TrendEstimator,
    };
    use crate::storage::{AuditLog, InMemoryPredictionStore, RecommendationStore};
    use crate::types::{
        AlertLevel, AnomalyEvent, AnomalyEventType, FaultType, RiskLevel, SensorAverages,
    };
    use crate::window::WindowStore;
    use crate::workflow::{SimulatedPlant, WorkflowContext};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Fixture {
        state: ApiState,
        plant: SimulatedPlant,
    }

    fn fixture() -> Fixture {
        let clock: SharedClock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let windows = Arc::new(WindowStore::new(Duration::seconds(180)));
        let broker = Arc::new(AnomalyBroker::from_config(&BrokerConfig::default()));
        let engine = Arc::new(ScoringEngine::new(
            Arc::clone(&windows),
            FeatureExtractor::new(
                CalibrationConfig::default(),
                TrendEstimator::new(&TrendConfig::default()),
                4,
            ),
            RiskScorer::new(
                Arc::new(CoefficientStore::with_defaults("failure_predictor_v1")),
                RiskConfig::default(),
            ),
            MetadataCatalog::default(),
            Arc::new(InMemoryPredictionStore::new()),
            broker.clone(),
            AlertGate::new(AlertLevel::Critical),
            Arc::clone(&clock),
            EngineSettings {
                model_id: "failure_predictor_v1".into(),
                facility_prefix_len: 3,
                reconnect_threshold: 3,
            },
        ));
        let plant = SimulatedPlant::new(Arc::clone(&clock));
        let ctx = Arc::new(WorkflowContext::new(
            plant.services(),
            WorkflowConfig::default(),
            "",
            Arc::clone(&clock),
        ));
        let router = Arc::new(AnomalyRouter::new(
            ctx,
            Arc::new(RecommendationStore::in_memory()),
            Arc::new(AuditLog::in_memory()),
        ));
        let ingestor = Arc::new(SampleIngestor::new(windows, clock));
        Fixture {
            state: ApiState::new(engine, ingestor, router, broker),
            plant,
        }
    }

    fn event(equipment_id: &str, risk: RiskLevel, probability: f64) -> AnomalyEvent {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        AnomalyEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: AnomalyEventType::for_risk(risk).unwrap(),
            timestamp: now,
            equipment_id: equipment_id.into(),
            facility_id: equipment_id[..3].into(),
            risk_level: risk,
            failure_probability: probability,
            probable_cause: "Bearing degradation: vibration 5.5 mm/s".into(),
            fault_type: FaultType::Bearing,
            averages: SensorAverages::default(),
            scored_at: now,
        }
    }

    async fn send(state: &ApiState, method: &str, uri: &str, body: Option<&str>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        };
        api_routes(state.clone())
            .oneshot(request.unwrap())
            .await
            .unwrap()
    }

    async fn json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn pending_id(f: &Fixture) -> String {
        f.state
            .router
            .handle_high(&event("PHX-CNC-007", RiskLevel::High, 0.62))
            .await
            .unwrap();
        f.state.router.recommendations().pending().unwrap()[0]
            .recommendation_id
            .clone()
    }

    #[tokio::test]
    async fn test_health_reports_store_and_counters() {
        let f = fixture();
        let resp = send(&f.state, "GET", "/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let v = json(resp).await;
        assert_eq!(v["data"]["status"], "UP");
        assert_eq!(v["data"]["store_backend"], "InMemory");
        assert_eq!(v["data"]["ingest"]["accepted"], 0);
    }

    #[tokio::test]
    async fn test_samples_single_and_batch() {
        let f = fixture();
        let resp = send(
            &f.state,
            "POST",
            "/samples",
            Some(r#"{"equipmentId":"PHX-CNC-007","sensorType":"vibration","value":2.4}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["data"]["accepted"], 1);

        let resp = send(
            &f.state,
            "POST",
            "/samples",
            Some(
                r#"[
                    {"equipmentId":"PHX-CNC-007","sensorType":"power_draw","value":15.0},
                    {"equipmentId":"PHX-CNC-007","sensorType":"humidity","value":40.0},
                    {"equipmentId":"","sensorType":"rpm","value":8500}
                ]"#,
            ),
        )
        .await;
        let v = json(resp).await;
        assert_eq!(v["data"]["accepted"], 1);
        assert_eq!(v["data"]["dropped"], 2);
        assert_eq!(v["data"]["rejected"][0]["index"], 1);
        assert_eq!(f.state.engine.windows().sample_count(), 2);
    }

    #[tokio::test]
    async fn test_samples_rejects_invalid_json() {
        let f = fixture();
        let resp = send(&f.state, "POST", "/samples", Some("{not json")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_prediction_lookup_and_reset() {
        let f = fixture();
        let resp = send(&f.state, "GET", "/predictions/PHX-CNC-007", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        send(
            &f.state,
            "POST",
            "/samples",
            Some(r#"{"equipmentId":"PHX-CNC-007","sensorType":"vibration","value":2.4}"#),
        )
        .await;
        let resp = send(&f.state, "POST", "/predictions/reset", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["data"]["windows_cleared"], 1);
        assert!(f.state.engine.windows().is_empty());

        let resp = send(&f.state, "GET", "/predictions", None).await;
        assert_eq!(json(resp).await["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_model_and_reload_without_source() {
        let f = fixture();
        let v = json(send(&f.state, "GET", "/ml/model", None).await).await;
        assert_eq!(v["data"]["model_id"], "failure_predictor_v1");
        assert_eq!(v["data"]["intercept"], 20.5);

        let resp = send(&f.state, "POST", "/ml/coefficients/reload", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let v = json(send(&f.state, "GET", "/ml/status", None).await).await;
        assert_eq!(v["data"]["window_horizon_secs"], 180);
        assert!(v["data"]["last_cycle"].is_null());
    }

    #[tokio::test]
    async fn test_alert_level_update() {
        let f = fixture();
        let resp = send(
            &f.state,
            "PUT",
            "/equipment/PHX-CNC-007/alert-level",
            Some(r#"{"level":"HIGH"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(f.state.engine.alerts().level("PHX-CNC-007"), AlertLevel::High);

        let resp = send(
            &f.state,
            "PUT",
            "/equipment/PHX-CNC-007/alert-level",
            Some(r#"{"level":"LOUD"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.state.engine.alerts().level("PHX-CNC-007"), AlertLevel::High);
    }

    #[tokio::test]
    async fn test_approve_then_dismiss_conflicts() {
        let f = fixture();
        let id = pending_id(&f).await;

        let v = json(send(&f.state, "GET", "/recommendations", None).await).await;
        assert_eq!(v["data"].as_array().unwrap().len(), 1);

        let resp = send(
            &f.state,
            "POST",
            &format!("/recommendations/{id}/approve"),
            Some(r#"{"approvedBy":"j.ortiz"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json(resp).await;
        assert_eq!(v["data"]["status"], "COMPLETED");
        assert_eq!(v["data"]["approved_by"], "j.ortiz");
        assert!(v["data"]["work_order_id"].as_str().unwrap().starts_with("WO-2026-"));

        let resp = send(&f.state, "POST", &format!("/recommendations/{id}/dismiss"), None).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let v = json(send(&f.state, "GET", &format!("/recommendations/{id}"), None).await).await;
        assert_eq!(v["data"]["status"], "COMPLETED");

        let v = json(send(&f.state, "GET", "/recommendations/resolved", None).await).await;
        assert_eq!(v["data"][0]["recommendation_id"], id.as_str());
    }

    #[tokio::test]
    async fn test_dismiss_uses_default_reason() {
        let f = fixture();
        let id = pending_id(&f).await;

        let resp = send(&f.state, "POST", &format!("/recommendations/{id}/dismiss"), None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json(resp).await;
        assert_eq!(v["data"]["status"], "DISMISSED");
        assert_eq!(v["data"]["notes"], "Dismissed by operator");
        assert_eq!(f.plant.inventory.reservation_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_approval_reports_upstream_error() {
        let f = fixture();
        let id = pending_id(&f).await;
        f.plant.maintenance.fail_next(1);

        let resp = send(&f.state, "POST", &format!("/recommendations/{id}/approve"), None).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let v = json(send(&f.state, "GET", &format!("/recommendations/{id}"), None).await).await;
        assert_eq!(v["data"]["status"], "PENDING");
    }

    #[tokio::test]
    async fn test_unknown_recommendation_is_not_found() {
        let f = fixture();
        let resp = send(&f.state, "POST", "/recommendations/REC-MISSING/approve", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_automated_action_queries() {
        let f = fixture();
        f.state
            .router
            .handle_critical(&event("PHX-CNC-007", RiskLevel::Critical, 0.93))
            .await
            .unwrap();

        let v = json(send(&f.state, "GET", "/automated-actions", None).await).await;
        let action_id = v["data"][0]["action_id"].as_str().unwrap().to_string();
        assert!(action_id.starts_with("ACT-"));

        let resp = send(&f.state, "GET", &format!("/automated-actions/{action_id}"), None).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let v = json(
            send(&f.state, "GET", "/automated-actions/equipment/PHX-CNC-007", None).await,
        )
        .await;
        assert_eq!(v["data"].as_array().unwrap().len(), 1);

        let resp = send(&f.state, "GET", "/automated-actions/ACT-NOPE", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
