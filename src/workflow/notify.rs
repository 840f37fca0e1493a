//! Maintenance alert delivery.
//!
//! [`LogNotifier`] writes alerts to the log and keeps them in memory.
//! [`HttpNotifier`] calls the communications service's
//! `send_notification` JSON-RPC method.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::services::{Notification, Notifier, ServiceError};
use crate::config::NotificationConfig;

// ============================================================================
// Log notifier
// ============================================================================

#[derive(Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_next: AtomicUsize,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sends fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map_or_else(|e| e.into_inner().len(), |s| s.len())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::Unavailable {
                service: "notifications",
                reason: "delivery rejected".into(),
            });
        }

        tracing::info!(
            recipient = %notification.recipient,
            equipment_id = %notification.equipment_id,
            work_order_id = %notification.work_order_id,
            subject = %notification.subject,
            "Maintenance alert sent"
        );
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "log"
    }
}

// ============================================================================
// JSON-RPC notifier
// ============================================================================

#[derive(Clone)]
pub struct HttpNotifier {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn request_body(notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "send_notification",
            "params": {
                "recipient_id": notification.recipient,
                "template_type": notification.kind,
                "variables": {
                    "equipment_id": notification.equipment_id,
                    "work_order_id": notification.work_order_id,
                    "subject": notification.subject,
                    "body": notification.body,
                },
            },
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&Self::request_body(notification))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ServiceError::ServerError(resp.status()));
        }

        let body: serde_json::Value = resp.json().await?;
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(ServiceError::Remote(message.to_string()));
        }
        tracing::info!(
            equipment_id = %notification.equipment_id,
            work_order_id = %notification.work_order_id,
            "Maintenance alert delivered"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json-rpc"
    }
}

/// Notifier selected by configuration: JSON-RPC when an endpoint is set,
/// the log otherwise.
pub fn from_config(
    config: &NotificationConfig,
) -> Result<std::sync::Arc<dyn Notifier>, ServiceError> {
    match &config.endpoint {
        Some(endpoint) => Ok(std::sync::Arc::new(HttpNotifier::new(
            endpoint,
            Duration::from_secs(config.timeout_secs.max(1)),
        )?)),
        None => Ok(std::sync::Arc::new(LogNotifier::new())),
    }
}
