//! Audit log of automated CRITICAL responses.
//!
//! Append-only and unique per anomaly event: appending a second action for
//! an event ID that is already recorded returns the existing record
//! unchanged. Records are kept oldest first in memory; the durable variant
//! keys the sled tree by event ID and re-sorts by execution time on load.

use std::sync::RwLock;

use super::RecordError;
use crate::types::AutomatedAction;

pub struct AuditLog {
    actions: RwLock<Vec<AutomatedAction>>,
    tree: Option<sled::Tree>,
}

impl AuditLog {
    pub fn in_memory() -> Self {
        Self {
            actions: RwLock::new(Vec::new()),
            tree: None,
        }
    }

    pub fn open(db: &sled::Db) -> Result<Self, RecordError> {
        let tree = db.open_tree(super::ACTIONS_TREE)?;
        let mut actions: Vec<AutomatedAction> = tree
            .iter()
            .filter_map(|item| item.ok().and_then(|(_, v)| serde_json::from_slice(&v).ok()))
            .collect();
        actions.sort_by_key(|a| a.executed_at);
        tracing::info!(actions = actions.len(), "Audit log opened");
        Ok(Self {
            actions: RwLock::new(actions),
            tree: Some(tree),
        })
    }

    /// Record a completed action. Returns the stored record, which is the
    /// earlier one if this event was already recorded.
    pub fn append(&self, action: AutomatedAction) -> Result<AutomatedAction, RecordError> {
        let mut actions = self
            .actions
            .write()
            .map_err(|e| RecordError::Storage(e.to_string()))?;

        if let Some(existing) = actions.iter().find(|a| a.event_id == action.event_id) {
            tracing::debug!(event_id = %action.event_id, "Action already recorded for event");
            return Ok(existing.clone());
        }

        if let Some(tree) = &self.tree {
            tree.insert(action.event_id.as_bytes(), serde_json::to_vec(&action)?)?;
        }
        actions.push(action.clone());
        tracing::info!(
            action_id = %action.action_id,
            event_id = %action.event_id,
            equipment_id = %action.equipment_id,
            work_order_id = %action.work_order_id,
            "Automated action recorded"
        );
        Ok(action)
    }

    pub fn contains_event(&self, event_id: &str) -> bool {
        self.read().iter().any(|a| a.event_id == event_id)
    }

    pub fn by_event(&self, event_id: &str) -> Option<AutomatedAction> {
        self.read().iter().find(|a| a.event_id == event_id).cloned()
    }

    /// Most recent first.
    pub fn recent(&self, limit: usize) -> Vec<AutomatedAction> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    /// Most recent first.
    pub fn by_equipment(&self, equipment_id: &str) -> Vec<AutomatedAction> {
        self.read()
            .iter()
            .rev()
            .filter(|a| a.equipment_id == equipment_id)
            .cloned()
            .collect()
    }

    pub fn by_id(&self, action_id: &str) -> Option<AutomatedAction> {
        self.read().iter().find(|a| a.action_id == action_id).cloned()
    }

    pub fn count_for_equipment(&self, equipment_id: &str) -> usize {
        self.read()
            .iter()
            .filter(|a| a.equipment_id == equipment_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<AutomatedAction>> {
        // A poisoned log still holds valid, append-only data.
        self.actions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
