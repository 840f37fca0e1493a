//! Shared harness for the end-to-end tests: the full component graph over
//! in-memory stores, the simulated plant and a manual clock.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use forgewatch::clock::{Clock, ManualClock, SharedClock};
use forgewatch::router::RouteOutcome;
use forgewatch::workflow::SimulatedPlant;
use forgewatch::{AppCore, PlantConfig, SensorMessage, Stores};

pub struct Harness {
    pub core: AppCore,
    pub plant: SimulatedPlant,
    pub clock: ManualClock,
    pub config: PlantConfig,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    let clock = ManualClock::new(start());
    let shared: SharedClock = Arc::new(clock.clone());
    let plant = SimulatedPlant::new(Arc::clone(&shared));
    let config = PlantConfig::default();
    let core = AppCore::build(&config, shared, Stores::in_memory(), plant.services());
    Harness {
        core,
        plant,
        clock,
        config,
    }
}

pub fn message(equipment_id: &str, sensor: &str, value: f64, at: DateTime<Utc>) -> SensorMessage {
    SensorMessage {
        equipment_id: Some(equipment_id.to_string()),
        sensor_type: Some(sensor.to_string()),
        value: Some(value.into()),
        timestamp: Some(at.to_rfc3339()),
        ..SensorMessage::default()
    }
}

impl Harness {
    fn ingest(&self, msg: SensorMessage) {
        self.core.ingestor.ingest(msg).unwrap();
    }

    /// 25 vibration samples over 90 s rising linearly from 2.5 to 4.2 mm/s,
    /// with steady temperature alongside, ending at the clock's "now".
    pub fn feed_rising_vibration(&self, equipment_id: &str) {
        let end = self.clock.now();
        let begin = end - Duration::seconds(90);
        for i in 0..25 {
            let at = begin + Duration::milliseconds(i * 90_000 / 24);
            #[allow(clippy::cast_precision_loss)]
            let vibration = 2.5 + 1.7 * i as f64 / 24.0;
            self.ingest(message(equipment_id, "vibration", vibration, at));
            self.ingest(message(equipment_id, "temperature", 50.0, at));
        }
    }

    /// Window averaging vibration 5.5 / temperature 51.6: HIGH (p ~ 0.60).
    pub fn feed_high(&self, equipment_id: &str) {
        let end = self.clock.now();
        for i in 0..4 {
            let at = end - Duration::seconds(4 - i);
            self.ingest(message(equipment_id, "vibration", 5.5, at));
            self.ingest(message(equipment_id, "temperature", 51.6, at));
        }
    }

    /// Window at baseline readings: LOW.
    pub fn feed_healthy(&self, equipment_id: &str) {
        let end = self.clock.now();
        for i in 0..4 {
            let at = end - Duration::seconds(4 - i);
            self.ingest(message(equipment_id, "vibration", 2.0, at));
            self.ingest(message(equipment_id, "temperature", 50.0, at));
        }
    }

    /// Route and ack every queued anomaly event, CRITICAL queue first.
    pub async fn drain(&self) -> Vec<RouteOutcome> {
        let mut outcomes = Vec::new();
        for queue in [&self.config.broker.critical_queue, &self.config.broker.high_queue] {
            while let Some(delivery) = self.core.broker.try_consume(queue).unwrap() {
                outcomes.push(self.core.router.route(&delivery.event).await.unwrap());
                self.core.broker.ack(delivery.delivery_tag).unwrap();
            }
        }
        outcomes
    }
}

