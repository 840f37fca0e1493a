//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use forgewatch::api::create_app;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(h: &common::Harness, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    };
    create_app(h.core.api_state())
        .oneshot(request.unwrap())
        .await
        .unwrap()
}

async fn body_json(resp: Response) -> Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Four vibration/temperature pairs in the last few seconds: HIGH risk.
fn high_batch(equipment_id: &str) -> Value {
    let now = common::start();
    let samples: Vec<Value> = (1..=4)
        .flat_map(|i| {
            let at = (now - chrono::Duration::seconds(i)).to_rfc3339();
            [
                json!({"equipmentId": equipment_id, "sensorType": "vibration", "value": 5.5, "timestamp": at}),
                json!({"equipmentId": equipment_id, "sensorType": "temperature", "value": 51.6, "timestamp": at}),
            ]
        })
        .collect();
    Value::Array(samples)
}

/// All v1 GET endpoints should return 200 on an empty system.
#[tokio::test]
async fn test_v1_get_endpoints_return_200() {
    let h = common::harness();
    let endpoints = [
        "/api/v1/health",
        "/api/v1/predictions",
        "/api/v1/ml/model",
        "/api/v1/ml/status",
        "/api/v1/recommendations",
        "/api/v1/recommendations/resolved",
        "/api/v1/automated-actions",
        "/api/v1/automated-actions/equipment/PHX-CNC-007",
    ];

    for endpoint in &endpoints {
        let resp = send(&h, "GET", endpoint, None).await;
        assert!(
            resp.status().is_success(),
            "GET {endpoint} returned status {}",
            resp.status()
        );
    }
}

#[tokio::test]
async fn test_root_and_unknown_paths() {
    let h = common::harness();
    let resp = send(&h, "GET", "/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&h, "GET", "/api/v1/does-not-exist", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let v = body_json(resp).await;
    assert_eq!(v["error"]["code"], "NOT_FOUND");
    assert!(v["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_posted_samples_are_scored() {
    let h = common::harness();
    let resp = send(&h, "POST", "/api/v1/samples", Some(high_batch("PHX-CNC-007"))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["data"]["accepted"], 8);

    h.core.engine.run_cycle();

    let resp = send(&h, "GET", "/api/v1/predictions/PHX-CNC-007", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["data"]["equipment_id"], "PHX-CNC-007");
    assert_eq!(v["data"]["risk_level"], "HIGH");
    assert_eq!(v["data"]["fault_type"], "BEARING");

    let resp = send(&h, "GET", "/api/v1/predictions", None).await;
    assert_eq!(body_json(resp).await["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_recommendation_review_flow() {
    let h = common::harness();
    send(&h, "POST", "/api/v1/samples", Some(high_batch("ATL-CNC-002"))).await;
    h.core.engine.run_cycle();
    h.drain().await;

    let resp = send(&h, "GET", "/api/v1/recommendations", None).await;
    let v = body_json(resp).await;
    let pending = v["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["status"], "PENDING");
    assert_eq!(pending[0]["facility_id"], "ATL");
    let id = pending[0]["recommendation_id"].as_str().unwrap().to_string();

    let resp = send(
        &h,
        "POST",
        &format!("/api/v1/recommendations/{id}/approve"),
        Some(json!({"approvedBy": "maintenance-lead"})),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["data"]["status"], "COMPLETED");
    assert_eq!(v["data"]["approved_by"], "maintenance-lead");

    let resp = send(&h, "GET", "/api/v1/recommendations", None).await;
    assert!(body_json(resp).await["data"].as_array().unwrap().is_empty());

    let resp = send(&h, "GET", "/api/v1/recommendations/resolved?limit=5", None).await;
    let v = body_json(resp).await;
    assert_eq!(v["data"][0]["recommendation_id"], id.as_str());

    // Approved recommendations are not actions; the log stays empty.
    let resp = send(&h, "GET", "/api/v1/automated-actions", None).await;
    assert!(body_json(resp).await["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_critical_response_shows_in_action_log() {
    let h = common::harness();
    h.feed_rising_vibration("MUN-CNC-011");
    h.core.engine.run_cycle();
    h.drain().await;

    let resp = send(&h, "GET", "/api/v1/automated-actions", None).await;
    let v = body_json(resp).await;
    let actions = v["data"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["action_type"], "CRITICAL_RESPONSE");
    assert_eq!(actions[0]["facility_id"], "MUN");
    let action_id = actions[0]["action_id"].as_str().unwrap().to_string();

    let resp = send(&h, "GET", &format!("/api/v1/automated-actions/{action_id}"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(
        &h,
        "GET",
        "/api/v1/automated-actions/equipment/MUN-CNC-011",
        None,
    )
    .await;
    assert_eq!(body_json(resp).await["data"].as_array().unwrap().len(), 1);

    let resp = send(&h, "GET", "/api/v1/health", None).await;
    let v = body_json(resp).await;
    assert_eq!(v["data"]["automated_actions"], 1);
}
