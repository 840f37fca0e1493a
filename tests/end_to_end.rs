//! End-to-end scenarios
//!
//! Samples go in through the ingestor, one scoring cycle runs, and the
//! published anomaly events are routed through the real workflows against
//! the simulated plant.

mod common;

use chrono::Duration;
use forgewatch::clock::Clock;
use forgewatch::router::{CriticalOutcome, HighOutcome, Resolution, RouteOutcome, SUPERSEDED_NOTE};
use forgewatch::types::ActionType;
use forgewatch::{AlertLevel, FaultType, RecommendationStatus, RiskLevel};

const MACHINE: &str = "PHX-CNC-007";

#[tokio::test]
async fn test_rising_vibration_triggers_automated_response() {
    let h = common::harness();
    h.feed_rising_vibration(MACHINE);

    let report = h.core.engine.run_cycle();
    assert!(report.published);
    assert_eq!(report.scored, 1);
    assert_eq!(report.events_published, 1);

    let prediction = h.core.engine.store().get(MACHINE).unwrap().unwrap();
    assert!(prediction.failure_probability >= 0.70);
    assert_eq!(prediction.risk_level, RiskLevel::Critical);
    assert_eq!(prediction.fault_type, FaultType::Bearing);
    assert!(prediction.probable_cause.contains("Bearing degradation"));
    assert!(prediction.vibration_trend > 0.0);

    let outcomes = h.drain().await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0],
        RouteOutcome::Critical(CriticalOutcome::Completed(_))
    ));

    let actions = h.core.router.audit().by_equipment(MACHINE);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ActionType::CriticalResponse);
    assert!(actions[0].work_order_id.starts_with("WO-2026-"));
    assert!(actions[0].notification_sent);
    assert!(!actions[0].reserved_parts.is_empty());
    assert_eq!(h.plant.maintenance.shutdown_count(), 1);
    assert_eq!(h.plant.notifier.sent_count(), 1);
}

#[tokio::test]
async fn test_high_risk_creates_pending_recommendation() {
    let h = common::harness();
    h.feed_high(MACHINE);

    h.core.engine.run_cycle();
    let prediction = h.core.engine.store().get(MACHINE).unwrap().unwrap();
    assert!((0.50..0.70).contains(&prediction.failure_probability));
    assert_eq!(prediction.risk_level, RiskLevel::High);

    let outcomes = h.drain().await;
    assert!(matches!(
        outcomes.as_slice(),
        [RouteOutcome::High(HighOutcome::Created(_))]
    ));

    let pending = h.core.router.recommendations().pending().unwrap();
    assert_eq!(pending.len(), 1);
    let rec = &pending[0];
    assert_eq!(rec.equipment_id, MACHINE);
    assert_eq!(rec.facility_id, "PHX");
    assert!(!rec.reserved_parts.is_empty());
    assert!(rec.estimated_cost > 0.0);
    assert_eq!(rec.expires_at - rec.created_at, Duration::hours(48));
    assert!(h.core.router.audit().is_empty());
    assert_eq!(h.plant.maintenance.work_order_count(), 0);
}

#[tokio::test]
async fn test_approved_recommendation_completes_and_ignores_dismiss() {
    let h = common::harness();
    h.feed_high(MACHINE);
    h.core.engine.run_cycle();
    h.drain().await;
    let id = h.core.router.recommendations().pending().unwrap()[0]
        .recommendation_id
        .clone();

    let approved = match h.core.router.approve(&id, Some("shift-lead")).await.unwrap() {
        Resolution::Applied(rec) => rec,
        other => panic!("expected approval to apply, got {other:?}"),
    };
    assert_eq!(approved.status, RecommendationStatus::Completed);
    assert_eq!(approved.approved_by.as_deref(), Some("shift-lead"));
    let work_order = approved.work_order_id.clone().unwrap();
    assert!(work_order.starts_with("WO-2026-"));

    let dismissed = h.core.router.dismiss(&id, None).await.unwrap();
    match dismissed {
        Resolution::NotPending(rec) => {
            assert_eq!(rec.status, RecommendationStatus::Completed);
            assert_eq!(rec.work_order_id.as_deref(), Some(work_order.as_str()));
        }
        other => panic!("dismiss after approval must be a no-op, got {other:?}"),
    }
    assert_eq!(h.plant.maintenance.work_order_count(), 1);
}

#[tokio::test]
async fn test_critical_supersedes_pending_recommendation() {
    let h = common::harness();
    h.feed_high(MACHINE);
    h.core.engine.run_cycle();
    h.drain().await;
    let id = h.core.router.recommendations().pending().unwrap()[0]
        .recommendation_id
        .clone();

    // Let the HIGH window expire, then degrade further.
    h.clock.advance(Duration::seconds(200));
    h.feed_rising_vibration(MACHINE);
    let report = h.core.engine.run_cycle();
    assert_eq!(report.events_published, 1);
    h.drain().await;

    let rec = h.core.router.recommendations().get(&id).unwrap().unwrap();
    assert_eq!(rec.status, RecommendationStatus::Superseded);
    assert_eq!(rec.notes.as_deref(), Some(SUPERSEDED_NOTE));
    assert!(h.core.router.recommendations().pending().unwrap().is_empty());
    assert_eq!(h.core.router.audit().count_for_equipment(MACHINE), 1);
}

#[tokio::test]
async fn test_redelivered_critical_event_runs_once() {
    let h = common::harness();
    h.feed_rising_vibration(MACHINE);
    h.core.engine.run_cycle();

    let queue = h.config.broker.critical_queue.clone();
    let first = h.core.broker.try_consume(&queue).unwrap().unwrap();
    h.core.router.route(&first.event).await.unwrap();
    // Ack lost: the broker hands the same event out again.
    h.core.broker.nack(first.delivery_tag, true).unwrap();

    let again = h.core.broker.try_consume(&queue).unwrap().unwrap();
    assert!(again.redelivered);
    assert_eq!(again.event.event_id, first.event.event_id);
    let outcome = h.core.router.route(&again.event).await.unwrap();
    assert!(matches!(
        outcome,
        RouteOutcome::Critical(CriticalOutcome::AlreadyHandled { .. })
    ));
    h.core.broker.ack(again.delivery_tag).unwrap();

    assert_eq!(h.core.router.audit().len(), 1);
    assert_eq!(h.plant.maintenance.work_order_count(), 1);
}

#[tokio::test]
async fn test_one_pending_recommendation_per_equipment() {
    let h = common::harness();
    h.feed_high(MACHINE);
    h.core.engine.run_cycle();
    let delivery = h
        .core
        .broker
        .try_consume(&h.config.broker.high_queue)
        .unwrap()
        .unwrap();

    let mut second = delivery.event.clone();
    second.event_id = "replayed-high".into();
    let router = &h.core.router;
    let (a, b) = tokio::join!(router.route(&delivery.event), router.route(&second));
    a.unwrap();
    b.unwrap();

    assert_eq!(router.recommendations().pending_count(MACHINE).unwrap(), 1);
}

#[tokio::test]
async fn test_high_alert_level_turns_failure_into_recommendation() {
    let h = common::harness();
    h.core.engine.alerts().set_level(MACHINE, AlertLevel::High);
    let now = h.clock.now();
    for i in 1..=4 {
        let at = now - Duration::seconds(i);
        h.core.ingestor.ingest(common::message(MACHINE, "vibration", 7.5, at)).unwrap();
        h.core.ingestor.ingest(common::message(MACHINE, "temperature", 60.0, at)).unwrap();
    }
    h.core.engine.run_cycle();

    let prediction = h.core.engine.store().get(MACHINE).unwrap().unwrap();
    assert_eq!(prediction.risk_level, RiskLevel::High);
    assert!((prediction.failure_probability - 0.69).abs() < 1e-9);

    let outcomes = h.drain().await;
    assert!(matches!(
        outcomes.as_slice(),
        [RouteOutcome::High(HighOutcome::Created(_))]
    ));
    assert!(h.core.router.audit().is_empty());
}

#[tokio::test]
async fn test_alert_gate_publishes_each_tier_once() {
    let h = common::harness();
    h.feed_high(MACHINE);
    assert_eq!(h.core.engine.run_cycle().events_published, 1);
    assert_eq!(h.core.engine.run_cycle().events_published, 0);

    // Recovery clears the flags.
    h.clock.advance(Duration::seconds(200));
    h.feed_healthy(MACHINE);
    assert_eq!(h.core.engine.run_cycle().events_published, 0);
    h.clock.advance(Duration::seconds(200));
    h.feed_high(MACHINE);
    assert_eq!(h.core.engine.run_cycle().events_published, 1);
}

#[tokio::test]
async fn test_reset_reports_and_clears_everything() {
    let h = common::harness();
    h.feed_high(MACHINE);
    h.feed_healthy("ATL-CNC-002");
    h.core.engine.run_cycle();
    assert_eq!(h.core.engine.store().keys().unwrap().len(), 2);

    let report = h.core.engine.reset().unwrap();
    assert_eq!(report.windows_cleared, 2);
    assert_eq!(report.predictions_cleared, 2);
    assert!(h.core.windows.is_empty());
    assert!(h.core.engine.store().keys().unwrap().is_empty());
}
