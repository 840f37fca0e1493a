//! Queue consumer loop.
//!
//! One consumer per anomaly queue. A delivery is acked once the router has
//! handled it (including "already handled" and "skipped" outcomes) and
//! nacked with requeue when the workflow fails, so the broker redelivers it
//! until its delivery budget runs out.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::AnomalyRouter;
use crate::broker::AnomalyBroker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerReport {
    pub acked: u64,
    pub nacked: u64,
}

pub struct EventConsumer {
    router: Arc<AnomalyRouter>,
    broker: Arc<AnomalyBroker>,
    queue: String,
}

impl EventConsumer {
    pub fn new(router: Arc<AnomalyRouter>, broker: Arc<AnomalyBroker>, queue: impl Into<String>) -> Self {
        Self {
            router,
            broker,
            queue: queue.into(),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> ConsumerReport {
        info!(queue = %self.queue, "Anomaly consumer started");
        let mut report = ConsumerReport::default();

        loop {
            let delivery = match self.broker.consume(&self.queue, &cancel).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Consumer cannot read its queue");
                    break;
                }
            };

            let event = &delivery.event;
            debug!(
                queue = %self.queue,
                event_id = %event.event_id,
                attempt = delivery.attempt,
                redelivered = delivery.redelivered,
                "Delivery received"
            );

            let settled = match self.router.route(event).await {
                Ok(outcome) => {
                    debug!(event_id = %event.event_id, ?outcome, "Event handled");
                    report.acked += 1;
                    self.broker.ack(delivery.delivery_tag)
                }
                Err(e) => {
                    warn!(
                        equipment_id = %event.equipment_id,
                        event_id = %event.event_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "Anomaly workflow failed, requeueing"
                    );
                    report.nacked += 1;
                    self.broker.nack(delivery.delivery_tag, true)
                }
            };
            if let Err(e) = settled {
                warn!(queue = %self.queue, error = %e, "Failed to settle delivery");
            }
        }

        info!(
            queue = %self.queue,
            acked = report.acked,
            nacked = report.nacked,
            "Anomaly consumer stopping"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::AnomalySink;
    use crate::config::BrokerConfig;
    use crate::router::tests::{event, setup};
    use crate::types::RiskLevel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failed_event_is_redelivered_then_acked() {
        let (plant, router) = setup();
        let config = BrokerConfig::default();
        let broker = Arc::new(AnomalyBroker::from_config(&config));
        plant.notifier.fail_next(1);

        broker
            .publish(&event("PHX-CNC-007", RiskLevel::Critical, 0.93))
            .unwrap();

        let cancel = CancellationToken::new();
        let consumer = EventConsumer::new(Arc::clone(&router), Arc::clone(&broker), &config.critical_queue);
        let handle = tokio::spawn(consumer.run(cancel.clone()));

        for _ in 0..100 {
            if router.audit().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report, ConsumerReport { acked: 1, nacked: 1 });
        assert_eq!(router.audit().len(), 1);
        assert_eq!(plant.maintenance.work_order_count(), 1);
        assert!(broker.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_persistent_failure_is_dead_lettered() {
        let (plant, router) = setup();
        let config = BrokerConfig {
            max_deliveries: 2,
            ..BrokerConfig::default()
        };
        let broker = Arc::new(AnomalyBroker::from_config(&config));
        plant.notifier.fail_next(usize::MAX);

        broker
            .publish(&event("PHX-CNC-007", RiskLevel::Critical, 0.93))
            .unwrap();

        let cancel = CancellationToken::new();
        let consumer = EventConsumer::new(Arc::clone(&router), Arc::clone(&broker), &config.critical_queue);
        let handle = tokio::spawn(consumer.run(cancel.clone()));

        for _ in 0..100 {
            if !broker.dead_letters().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.nacked, 2);
        assert_eq!(broker.dead_letters().len(), 1);
        assert!(router.audit().is_empty());
    }
}
