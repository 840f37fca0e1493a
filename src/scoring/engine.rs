//! Scoring cycle
//!
//! One cycle, run on a fixed period by [`ScoringScheduler`](super::ScoringScheduler):
//!
//! 1. Evict expired samples from every window
//! 2. Snapshot the active coefficient set once for the whole cycle
//! 3. Score every equipment window; per-equipment failures are skipped
//! 4. Probe the prediction store; if unreachable, skip the whole cycle
//! 5. Write all predictions in one batch
//! 6. Publish anomaly events for HIGH/CRITICAL predictions that pass the
//!    per-equipment alert gate

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::coefficients::{CoefficientSet, CoefficientStore};
use super::diagnosis::diagnose;
use super::features::{FeatureError, FeatureExtractor};
use super::metadata::MetadataCatalog;
use super::scorer::RiskScorer;
use crate::broker::AnomalySink;
use crate::clock::SharedClock;
use crate::storage::{PredictionStore, StoreError};
use crate::types::{facility_of, AlertLevel, AnomalyEvent, Prediction, RiskLevel};
use crate::window::WindowStore;

/// Trend-rate ceiling for equipment held at the HIGH alert level.
pub const HIGH_CAP_TREND_RATE: f64 = 0.05;

/// Probability ceiling for equipment held at the HIGH alert level; just
/// under the CRITICAL threshold.
pub const HIGH_CAP_PROBABILITY: f64 = 0.69;

// ============================================================================
// Alert gate
// ============================================================================

/// Tiers already announced for one equipment since it was last healthy.
#[derive(Debug, Clone, Copy, Default)]
struct RaisedTiers {
    high: bool,
    critical: bool,
}

impl RaisedTiers {
    fn flag_mut(&mut self, level: RiskLevel) -> Option<&mut bool> {
        match level {
            RiskLevel::High => Some(&mut self.high),
            RiskLevel::Critical => Some(&mut self.critical),
            RiskLevel::Low | RiskLevel::Medium => None,
        }
    }
}

/// Per-equipment publication policy.
///
/// An equipment publishes a tier's event once, then stays quiet for that
/// tier until a LOW/MEDIUM prediction resets it.
pub struct AlertGate {
    default_level: AlertLevel,
    levels: DashMap<String, AlertLevel>,
    raised: DashMap<String, RaisedTiers>,
}

impl AlertGate {
    pub fn new(default_level: AlertLevel) -> Self {
        Self {
            default_level,
            levels: DashMap::new(),
            raised: DashMap::new(),
        }
    }

    pub fn level(&self, equipment_id: &str) -> AlertLevel {
        self.levels
            .get(equipment_id)
            .map_or(self.default_level, |l| *l)
    }

    pub fn set_level(&self, equipment_id: &str, level: AlertLevel) {
        self.levels.insert(equipment_id.to_string(), level);
        tracing::info!(equipment_id, level = %level, "Alert level updated");
    }

    /// Whether an event for `risk` should go out now.
    pub fn should_publish(&self, equipment_id: &str, risk: RiskLevel) -> bool {
        if !self.level(equipment_id).allows(risk) {
            return false;
        }
        let mut raised = self.raised.get(equipment_id).map(|r| *r).unwrap_or_default();
        raised.flag_mut(risk).is_some_and(|flag| !*flag)
    }

    pub fn mark_published(&self, equipment_id: &str, risk: RiskLevel) {
        let mut entry = self.raised.entry(equipment_id.to_string()).or_default();
        if let Some(flag) = entry.flag_mut(risk) {
            *flag = true;
        }
    }

    /// A healthy reading clears the equipment's raised tiers.
    pub fn observe(&self, equipment_id: &str, risk: RiskLevel) {
        if !risk.is_anomalous() {
            self.raised.remove(equipment_id);
        }
    }

    pub fn clear_raised(&self) {
        self.raised.clear();
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Outcome of one scoring cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub windows: usize,
    pub scored: usize,
    pub skipped: usize,
    pub samples_evicted: usize,
    pub windows_dropped: usize,
    /// False when the store was unreachable and nothing was written.
    pub published: bool,
    pub events_published: usize,
}

/// Counts cleared by an operator reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub windows_cleared: usize,
    pub predictions_cleared: usize,
}

/// Engine tuning taken from the plant config.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model_id: String,
    pub facility_prefix_len: usize,
    pub reconnect_threshold: u32,
}

pub struct ScoringEngine {
    windows: Arc<WindowStore>,
    extractor: FeatureExtractor,
    scorer: RiskScorer,
    metadata: MetadataCatalog,
    store: Arc<dyn PredictionStore>,
    sink: Arc<dyn AnomalySink>,
    alerts: AlertGate,
    clock: SharedClock,
    settings: EngineSettings,
    consecutive_failures: AtomicU32,
    cycle_guard: Mutex<()>,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl ScoringEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        windows: Arc<WindowStore>,
        extractor: FeatureExtractor,
        scorer: RiskScorer,
        metadata: MetadataCatalog,
        store: Arc<dyn PredictionStore>,
        sink: Arc<dyn AnomalySink>,
        alerts: AlertGate,
        clock: SharedClock,
        settings: EngineSettings,
    ) -> Self {
        Self {
            windows,
            extractor,
            scorer,
            metadata,
            store,
            sink,
            alerts,
            clock,
            settings,
            consecutive_failures: AtomicU32::new(0),
            cycle_guard: Mutex::new(()),
            last_cycle: RwLock::new(None),
        }
    }

    pub const fn windows(&self) -> &Arc<WindowStore> {
        &self.windows
    }

    pub const fn store(&self) -> &Arc<dyn PredictionStore> {
        &self.store
    }

    pub const fn alerts(&self) -> &AlertGate {
        &self.alerts
    }

    pub const fn coefficients(&self) -> &Arc<CoefficientStore> {
        self.scorer.coefficients()
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Score one equipment window against `coefficients`.
    ///
    /// Equipment held at the HIGH alert level has its trend inputs capped
    /// and its probability clamped below CRITICAL, so a failing machine
    /// still produces a HIGH event rather than nothing.
    pub fn score_equipment(
        &self,
        equipment_id: &str,
        coefficients: &CoefficientSet,
        now: DateTime<Utc>,
    ) -> Result<Prediction, FeatureError> {
        let window = self.windows.snapshot(equipment_id).unwrap_or_default();
        let mut extracted = self
            .extractor
            .extract(&window, self.metadata.context(equipment_id))?;

        let capped = self.alerts.level(equipment_id) == AlertLevel::High;
        if capped {
            extracted.cap_trends(HIGH_CAP_TREND_RATE);
        }
        let mut score = self.scorer.score_with(coefficients, &extracted.features);
        if capped && score.probability > HIGH_CAP_PROBABILITY {
            score.probability = HIGH_CAP_PROBABILITY;
            score.risk_level = RiskLevel::High;
        }
        let diagnosis = diagnose(
            &extracted.averages,
            extracted.features.vibration_trend_rate,
            extracted.features.temperature_trend_rate,
        );

        Ok(Prediction {
            equipment_id: equipment_id.to_string(),
            failure_probability: score.probability,
            risk_level: score.risk_level,
            probable_cause: diagnosis.cause,
            fault_type: diagnosis.fault,
            averages: extracted.averages,
            vibration_trend: extracted.features.vibration_trend_rate,
            temperature_trend: extracted.features.temperature_trend_rate,
            drivers: score.drivers,
            window_size: extracted.window_size,
            model_id: coefficients.model_id.clone(),
            scored_at: now,
        })
    }

    /// Run one full scoring cycle.
    pub fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_guard.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let eviction = self.windows.evict_expired(now);
        let coefficients = self.coefficients().current();

        let ids = self.windows.equipment_ids();
        let mut report = CycleReport {
            started_at: Some(now),
            windows: ids.len(),
            samples_evicted: eviction.samples_removed,
            windows_dropped: eviction.windows_dropped,
            ..CycleReport::default()
        };

        let mut predictions = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.score_equipment(id, &coefficients, now) {
                Ok(p) => predictions.push(p),
                Err(e) => {
                    report.skipped += 1;
                    tracing::debug!(equipment_id = %id, reason = %e, "Skipping equipment this cycle");
                }
            }
        }
        report.scored = predictions.len();

        if let Err(e) = self.publish(&predictions) {
            self.record_store_failure(&e);
            self.finish(&report);
            return report;
        }
        self.consecutive_failures.store(0, Ordering::SeqCst);
        report.published = true;

        for prediction in &predictions {
            self.alerts.observe(&prediction.equipment_id, prediction.risk_level);
            if self.emit_event(prediction, now) {
                report.events_published += 1;
            }
        }

        tracing::info!(
            windows = report.windows,
            scored = report.scored,
            skipped = report.skipped,
            events = report.events_published,
            "Scoring cycle complete"
        );
        self.finish(&report);
        report
    }

    fn publish(&self, predictions: &[Prediction]) -> Result<(), StoreError> {
        self.store.ping()?;
        if !predictions.is_empty() {
            self.store.put_batch(predictions)?;
        }
        Ok(())
    }

    fn record_store_failure(&self, error: &StoreError) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(
            error = %error,
            consecutive_failures = failures,
            "Prediction store unavailable, skipping cycle"
        );
        if failures >= self.settings.reconnect_threshold {
            tracing::warn!(backend = self.store.backend_name(), "Reconnecting prediction store");
            if let Err(e) = self.store.reconnect() {
                tracing::error!(error = %e, "Prediction store reconnect failed");
            }
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    fn emit_event(&self, prediction: &Prediction, now: DateTime<Utc>) -> bool {
        let id = &prediction.equipment_id;
        if !self.alerts.should_publish(id, prediction.risk_level) {
            return false;
        }
        let facility = facility_of(id, self.settings.facility_prefix_len);
        let Some(event) = AnomalyEvent::from_prediction(prediction, facility, now) else {
            return false;
        };
        match self.sink.publish(&event) {
            Ok(_) => {
                self.alerts.mark_published(id, prediction.risk_level);
                tracing::info!(
                    equipment_id = %id,
                    event_id = %event.event_id,
                    risk_level = %prediction.risk_level,
                    probability = prediction.failure_probability,
                    "Anomaly event published"
                );
                true
            }
            Err(e) => {
                tracing::error!(equipment_id = %id, error = %e, "Failed to publish anomaly event");
                false
            }
        }
    }

    fn finish(&self, report: &CycleReport) {
        *self.last_cycle.write().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
    }

    /// Clear every window, every stored prediction and the raised alert
    /// tiers. A cycle already in flight may still write afterwards.
    pub fn reset(&self) -> Result<ResetReport, StoreError> {
        let windows_cleared = self.windows.clear();
        let predictions_cleared = self.store.clear()?;
        self.alerts.clear_raised();
        tracing::info!(windows_cleared, predictions_cleared, "Scoring state reset");
        Ok(ResetReport {
            windows_cleared,
            predictions_cleared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::AnomalyBroker;
    use crate::clock::{Clock, ManualClock};
    use crate::config::{BrokerConfig, CalibrationConfig, RiskConfig, TrendConfig};
    use crate::scoring::trend::TrendEstimator;
    use crate::storage::InMemoryPredictionStore;
    use crate::types::{SensorSample, SensorType};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        engine: ScoringEngine,
        clock: Arc<ManualClock>,
        store: Arc<InMemoryPredictionStore>,
        broker: Arc<AnomalyBroker>,
    }

    fn fixture() -> Fixture {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let store = Arc::new(InMemoryPredictionStore::new());
        let broker = Arc::new(AnomalyBroker::from_config(&BrokerConfig::default()));
        let engine = ScoringEngine::new(
            Arc::new(WindowStore::new(Duration::seconds(180))),
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
            store.clone(),
            broker.clone(),
            AlertGate::new(AlertLevel::Critical),
            clock.clone(),
            EngineSettings {
                model_id: "failure_predictor_v1".into(),
                facility_prefix_len: 3,
                reconnect_threshold: 3,
            },
        );
        Fixture {
            engine,
            clock,
            store,
            broker,
        }
    }

    impl Fixture {
        fn feed(&self, id: &str, sensor: SensorType, value: f64, count: i64) {
            let now = self.clock.now();
            for i in 0..count {
                self.engine.windows().ingest(SensorSample::new(
                    id,
                    sensor,
                    value,
                    now - Duration::seconds(count - i),
                ));
            }
        }

        /// Window averaging to vibration 5.5 / temperature 51.6: HIGH.
        fn feed_high(&self, id: &str) {
            self.feed(id, SensorType::Vibration, 5.5, 4);
            self.feed(id, SensorType::Temperature, 51.6, 4);
        }

        fn feed_healthy(&self, id: &str) {
            self.feed(id, SensorType::Vibration, 2.0, 4);
            self.feed(id, SensorType::Temperature, 50.0, 4);
        }
    }

    #[test]
    fn test_small_windows_are_skipped() {
        let f = fixture();
        f.feed("PHX-1", SensorType::Vibration, 2.0, 3);
        f.feed_healthy("PHX-2");
        let report = f.engine.run_cycle();
        assert_eq!(report.scored, 1);
        assert_eq!(report.skipped, 1);
        assert!(f.store.get("PHX-1").unwrap().is_none());
        assert_eq!(f.store.get("PHX-2").unwrap().unwrap().risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_high_prediction_publishes_once_until_recovery() {
        let f = fixture();
        f.feed_high("PHX-CNC-7");
        let report = f.engine.run_cycle();
        assert_eq!(report.events_published, 1);

        let stored = f.store.get("PHX-CNC-7").unwrap().unwrap();
        assert_eq!(stored.risk_level, RiskLevel::High);
        assert!(stored.probable_cause.contains("Bearing degradation"));

        let delivery = f.broker.try_consume("orchestrator.high").unwrap().unwrap();
        assert_eq!(delivery.event.facility_id, "PHX");

        // Same tier again: suppressed.
        assert_eq!(f.engine.run_cycle().events_published, 0);

        // Recovery, then HIGH again: published.
        f.engine.windows().clear();
        f.feed_healthy("PHX-CNC-7");
        f.engine.run_cycle();
        f.engine.windows().clear();
        f.feed_high("PHX-CNC-7");
        assert_eq!(f.engine.run_cycle().events_published, 1);
    }

    #[test]
    fn test_alert_level_none_suppresses() {
        let f = fixture();
        f.engine.alerts().set_level("PHX-CNC-7", AlertLevel::None);
        f.feed_high("PHX-CNC-7");
        let report = f.engine.run_cycle();
        assert!(report.published);
        assert_eq!(report.events_published, 0);
        assert_eq!(f.broker.queue_depth("orchestrator.high"), 0);
    }

    #[test]
    fn test_high_alert_level_caps_to_high() {
        let f = fixture();
        f.engine.alerts().set_level("PHX-CNC-7", AlertLevel::High);
        f.feed("PHX-CNC-7", SensorType::Vibration, 7.5, 4);
        f.feed("PHX-CNC-7", SensorType::Temperature, 60.0, 4);

        let report = f.engine.run_cycle();
        assert_eq!(report.events_published, 1);

        let stored = f.store.get("PHX-CNC-7").unwrap().unwrap();
        assert_eq!(stored.risk_level, RiskLevel::High);
        assert!((stored.failure_probability - HIGH_CAP_PROBABILITY).abs() < 1e-9);
        assert!(stored.vibration_trend <= HIGH_CAP_TREND_RATE);

        let delivery = f.broker.try_consume("orchestrator.high").unwrap().unwrap();
        assert_eq!(delivery.event.risk_level, RiskLevel::High);
        assert_eq!(f.broker.queue_depth("orchestrator.critical"), 0);
    }

    #[test]
    fn test_critical_alert_level_is_uncapped() {
        let f = fixture();
        f.feed("PHX-CNC-7", SensorType::Vibration, 7.5, 4);
        f.feed("PHX-CNC-7", SensorType::Temperature, 60.0, 4);
        f.engine.run_cycle();

        let stored = f.store.get("PHX-CNC-7").unwrap().unwrap();
        assert_eq!(stored.risk_level, RiskLevel::Critical);
        assert!(stored.failure_probability > 0.9);
    }

    #[test]
    fn test_store_outage_skips_cycle_and_reconnects() {
        let f = fixture();
        f.feed_high("PHX-CNC-7");
        f.store.set_online(false);

        for expected in [1, 2] {
            let report = f.engine.run_cycle();
            assert!(!report.published);
            assert_eq!(report.events_published, 0);
            assert_eq!(f.engine.consecutive_failures(), expected);
        }
        f.engine.run_cycle();
        assert_eq!(f.store.reconnect_count(), 1);
        assert_eq!(f.engine.consecutive_failures(), 0);
        assert_eq!(f.broker.queue_depth("orchestrator.high"), 0);

        f.store.set_online(true);
        let report = f.engine.run_cycle();
        assert!(report.published);
        assert_eq!(report.events_published, 1);
    }

    #[test]
    fn test_eviction_runs_before_scoring() {
        let f = fixture();
        f.feed_healthy("PHX-1");
        f.clock.advance(Duration::seconds(400));
        let report = f.engine.run_cycle();
        assert_eq!(report.windows, 0);
        assert_eq!(report.windows_dropped, 1);
        assert_eq!(report.samples_evicted, 8);
    }

    #[test]
    fn test_reset_reports_counts() {
        let f = fixture();
        f.feed_healthy("PHX-1");
        f.feed_healthy("PHX-2");
        f.engine.run_cycle();
        let report = f.engine.reset().unwrap();
        assert_eq!(
            report,
            ResetReport {
                windows_cleared: 2,
                predictions_cleared: 2
            }
        );
        assert!(f.engine.windows().is_empty());
        assert!(f.store.keys().unwrap().is_empty());
    }
}
