//! In-process anomaly broker
//!
//! Topic-style routing of [`AnomalyEvent`]s to named queues with explicit
//! acknowledgement. Delivery is at-least-once:
//!
//! - `consume` moves a message from the queue's ready list to the unacked
//!   set and hands out a delivery tag
//! - `ack` forgets the message
//! - `nack(requeue = true)` puts it back at the tail with the delivery
//!   counter bumped; once `max_deliveries` is reached it is dead-lettered
//!   instead
//!
//! Consumers wait on a per-queue `Notify`, so an idle consumer costs nothing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::types::{AnomalyEvent, AnomalyEventType};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("no queue named `{0}`")]
    UnknownQueue(String),
    #[error("no binding for routing key `{0}`")]
    Unroutable(String),
    #[error("unknown or already settled delivery tag {0}")]
    UnknownDeliveryTag(u64),
}

/// Anything the scoring cycle can publish anomaly events to.
pub trait AnomalySink: Send + Sync {
    /// Publish one event; returns the number of queues it was routed to.
    fn publish(&self, event: &AnomalyEvent) -> Result<usize, BrokerError>;
}

/// One message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub queue: String,
    pub routing_key: String,
    pub event: AnomalyEvent,
    /// 1 on first delivery.
    pub attempt: u32,
    pub redelivered: bool,
}

/// A message that exhausted its deliveries or was rejected outright.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub queue: String,
    pub routing_key: String,
    pub event: AnomalyEvent,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    event: AnomalyEvent,
    deliveries: u32,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    bindings: HashMap<String, Vec<String>>,
    unacked: HashMap<u64, (String, Message)>,
    dead_letters: Vec<DeadLetter>,
}

/// Broker depth counters for the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BrokerStats {
    pub ready: HashMap<String, usize>,
    pub unacked: usize,
    pub dead_lettered: usize,
}

pub struct AnomalyBroker {
    state: Mutex<BrokerState>,
    next_tag: AtomicU64,
    max_deliveries: u32,
    critical_routing_key: String,
    high_routing_key: String,
}

impl AnomalyBroker {
    /// Broker with the two anomaly queues declared and bound.
    pub fn from_config(config: &BrokerConfig) -> Self {
        let broker = Self {
            state: Mutex::new(BrokerState::default()),
            next_tag: AtomicU64::new(1),
            max_deliveries: config.max_deliveries.max(1),
            critical_routing_key: config.critical_routing_key.clone(),
            high_routing_key: config.high_routing_key.clone(),
        };
        broker.bind(&config.critical_routing_key, &config.critical_queue);
        broker.bind(&config.high_routing_key, &config.high_queue);
        broker
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare `queue` if needed and route `routing_key` to it.
    pub fn bind(&self, routing_key: &str, queue: &str) {
        let mut state = self.lock();
        state.queues.entry(queue.to_string()).or_default();
        let bound = state.bindings.entry(routing_key.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        tracing::debug!(routing_key, queue, "Queue bound");
    }

    /// Routing key for an event type.
    pub fn routing_key_for(&self, event_type: AnomalyEventType) -> &str {
        match event_type {
            AnomalyEventType::AnomalyCritical => &self.critical_routing_key,
            AnomalyEventType::AnomalyHigh => &self.high_routing_key,
        }
    }

    /// Publish to every queue bound to `routing_key`.
    pub fn publish_to(&self, routing_key: &str, event: &AnomalyEvent) -> Result<usize, BrokerError> {
        let mut state = self.lock();
        let Some(queues) = state.bindings.get(routing_key).cloned() else {
            return Err(BrokerError::Unroutable(routing_key.to_string()));
        };
        for name in &queues {
            if let Some(queue) = state.queues.get_mut(name) {
                queue.ready.push_back(Message {
                    routing_key: routing_key.to_string(),
                    event: event.clone(),
                    deliveries: 0,
                });
                queue.notify.notify_one();
            }
        }
        Ok(queues.len())
    }

    /// Take the next message without waiting.
    pub fn try_consume(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.lock();
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        let Some(mut message) = q.ready.pop_front() else {
            return Ok(None);
        };
        message.deliveries += 1;

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let delivery = Delivery {
            delivery_tag: tag,
            queue: queue.to_string(),
            routing_key: message.routing_key.clone(),
            event: message.event.clone(),
            attempt: message.deliveries,
            redelivered: message.deliveries > 1,
        };
        state.unacked.insert(tag, (queue.to_string(), message));
        Ok(Some(delivery))
    }

    /// Wait for the next message, or `None` once `cancel` fires.
    pub async fn consume(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Delivery>, BrokerError> {
        loop {
            if let Some(delivery) = self.try_consume(queue)? {
                return Ok(Some(delivery));
            }
            let notify = {
                let state = self.lock();
                let q = state
                    .queues
                    .get(queue)
                    .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
                Arc::clone(&q.notify)
            };
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = notify.notified() => {}
            }
        }
    }

    pub fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.lock()
            .unacked
            .remove(&delivery_tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))
    }

    /// Reject a delivery. With `requeue` it goes back on its queue unless it
    /// has used up its deliveries; otherwise it is dead-lettered.
    pub fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let (queue, message) = state
            .unacked
            .remove(&delivery_tag)
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))?;

        if requeue && message.deliveries < self.max_deliveries {
            if let Some(q) = state.queues.get_mut(&queue) {
                q.ready.push_back(message);
                q.notify.notify_one();
                return Ok(());
            }
        }

        tracing::warn!(
            queue = %queue,
            event_id = %message.event.event_id,
            attempts = message.deliveries,
            "Message dead-lettered"
        );
        state.dead_letters.push(DeadLetter {
            queue,
            routing_key: message.routing_key,
            event: message.event,
            attempts: message.deliveries,
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.clone()
    }

    pub fn queue_depth(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn stats(&self) -> BrokerStats {
        let state = self.lock();
        BrokerStats {
            ready: state
                .queues
                .iter()
                .map(|(name, q)| (name.clone(), q.ready.len()))
                .collect(),
            unacked: state.unacked.len(),
            dead_lettered: state.dead_letters.len(),
        }
    }
}

impl AnomalySink for AnomalyBroker {
    fn publish(&self, event: &AnomalyEvent) -> Result<usize, BrokerError> {
        let key = self.routing_key_for(event.event_type).to_string();
        let routed = self.publish_to(&key, event)?;
        tracing::debug!(
            event_id = %event.event_id,
            equipment_id = %event.equipment_id,
            routing_key = %key,
            "Anomaly event published"
        );
        Ok(routed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaultType, RiskLevel, SensorAverages};
    use std::time::Duration;

    fn event(event_type: AnomalyEventType) -> AnomalyEvent {
        AnomalyEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            equipment_id: "PHX-CNC-007".into(),
            facility_id: "PHX".into(),
            risk_level: RiskLevel::Critical,
            failure_probability: 0.9,
            probable_cause: "Bearing degradation".into(),
            fault_type: FaultType::Bearing,
            averages: SensorAverages::default(),
            scored_at: Utc::now(),
        }
    }

    fn broker(max_deliveries: u32) -> AnomalyBroker {
        AnomalyBroker::from_config(&BrokerConfig {
            max_deliveries,
            ..BrokerConfig::default()
        })
    }

    #[test]
    fn test_routing_by_event_type() {
        let b = broker(5);
        b.publish(&event(AnomalyEventType::AnomalyCritical)).unwrap();
        b.publish(&event(AnomalyEventType::AnomalyHigh)).unwrap();
        b.publish(&event(AnomalyEventType::AnomalyHigh)).unwrap();
        assert_eq!(b.queue_depth("orchestrator.critical"), 1);
        assert_eq!(b.queue_depth("orchestrator.high"), 2);
        assert_eq!(
            b.publish_to("anomaly.unknown", &event(AnomalyEventType::AnomalyHigh)),
            Err(BrokerError::Unroutable("anomaly.unknown".into()))
        );
    }

    #[test]
    fn test_ack_and_redelivery() {
        let b = broker(5);
        let e = event(AnomalyEventType::AnomalyCritical);
        b.publish(&e).unwrap();

        let first = b.try_consume("orchestrator.critical").unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        assert!(!first.redelivered);
        assert!(b.try_consume("orchestrator.critical").unwrap().is_none());

        b.nack(first.delivery_tag, true).unwrap();
        let second = b.try_consume("orchestrator.critical").unwrap().unwrap();
        assert_eq!(second.event.event_id, e.event_id);
        assert_eq!(second.attempt, 2);
        assert!(second.redelivered);

        b.ack(second.delivery_tag).unwrap();
        assert_eq!(
            b.ack(second.delivery_tag),
            Err(BrokerError::UnknownDeliveryTag(second.delivery_tag))
        );
        assert_eq!(b.stats().unacked, 0);
    }

    #[test]
    fn test_dead_letter_after_max_deliveries() {
        let b = broker(2);
        b.publish(&event(AnomalyEventType::AnomalyHigh)).unwrap();
        let d = b.try_consume("orchestrator.high").unwrap().unwrap();
        b.nack(d.delivery_tag, true).unwrap();
        let d = b.try_consume("orchestrator.high").unwrap().unwrap();
        b.nack(d.delivery_tag, true).unwrap();

        assert!(b.try_consume("orchestrator.high").unwrap().is_none());
        let dead = b.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_consume_wakes_on_publish_and_cancel() {
        let b = Arc::new(broker(5));
        let cancel = CancellationToken::new();

        let waiter = {
            let b = Arc::clone(&b);
            let cancel = cancel.clone();
            tokio::spawn(async move { b.consume("orchestrator.high", &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.publish(&event(AnomalyEventType::AnomalyHigh)).unwrap();
        let got = waiter.await.unwrap().unwrap();
        assert!(got.is_some());

        cancel.cancel();
        let idle = b.consume("orchestrator.high", &cancel).await.unwrap();
        assert!(idle.is_none());
        assert!(matches!(
            b.consume("nope", &cancel).await,
            Err(BrokerError::UnknownQueue(_))
        ));
    }
}
