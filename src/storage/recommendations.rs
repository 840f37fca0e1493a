//! Recommendation store
//!
//! Holds every recommendation and enforces the lifecycle:
//!
//! ```text
//! PENDING --approve--> APPROVED --complete--> COMPLETED
//!    |                    |
//!    |                    +--revert--> PENDING   (remediation failed)
//!    +--dismiss--> DISMISSED
//!    +--supersede--> SUPERSEDED
//! ```
//!
//! At most one PENDING recommendation exists per equipment. The check and
//! the insert happen under the same write lock, so two concurrent creates
//! for one machine cannot both succeed.
//!
//! The durable variant writes through to a sled tree before the in-memory
//! map is updated and reloads the tree at startup. An approval left APPROVED
//! without a work order by a crash goes back to PENDING on reload.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{Recommendation, RecommendationStatus};

/// Recommendation and audit record errors
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("equipment {equipment_id} already has pending recommendation {recommendation_id}")]
    PendingExists {
        equipment_id: String,
        recommendation_id: String,
    },
    #[error("recommendation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: RecommendationStatus,
        to: RecommendationStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for RecordError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Note left on an approval that a restart cut short.
pub const INTERRUPTED_APPROVAL_NOTE: &str = "Approval interrupted by restart - approve again to retry";

pub const INTERRUPTED_SUPERSEDED_NOTE: &str =
    "Approval interrupted by restart - superseded by a newer recommendation";

pub struct RecommendationStore {
    records: RwLock<HashMap<String, Recommendation>>,
    tree: Option<sled::Tree>,
}

impl RecommendationStore {
    /// Non-durable store for tests.
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            tree: None,
        }
    }

    /// Open the durable store, reloading existing recommendations.
    pub fn open(db: &sled::Db) -> Result<Self, RecordError> {
        let tree = db.open_tree(super::RECOMMENDATIONS_TREE)?;
        let mut records = HashMap::new();
        for item in tree.iter() {
            let (_key, value) = item?;
            match serde_json::from_slice::<Recommendation>(&value) {
                Ok(rec) => {
                    records.insert(rec.recommendation_id.clone(), rec);
                }
                Err(e) => tracing::warn!("Failed to deserialize stored recommendation: {}", e),
            }
        }
        let store = Self {
            records: RwLock::new(records),
            tree: Some(tree),
        };
        let recovered = store.recover_interrupted_approvals()?;

        let records = store.read()?;
        let pending = records.values().filter(|r| r.is_pending()).count();
        tracing::info!(total = records.len(), pending, recovered, "Recommendation store opened");
        drop(records);
        Ok(store)
    }

    /// Put approvals cut off by a restart (APPROVED, no work order) back to
    /// PENDING so they can be approved again. Remediation is keyed by the
    /// recommendation, so a second run reuses any work order already made.
    /// If the equipment gained another PENDING meanwhile, the interrupted
    /// one is superseded instead.
    fn recover_interrupted_approvals(&self) -> Result<usize, RecordError> {
        let mut records = self.write()?;
        let mut stuck: Vec<(String, String, DateTime<Utc>)> = records
            .values()
            .filter(|r| r.status == RecommendationStatus::Approved && r.work_order_id.is_none())
            .map(|r| (r.recommendation_id.clone(), r.equipment_id.clone(), r.created_at))
            .collect();
        stuck.sort_by_key(|(_, _, created_at)| *created_at);

        for (id, equipment_id, _) in &stuck {
            let has_pending = records
                .values()
                .any(|r| r.is_pending() && &r.equipment_id == equipment_id);
            if has_pending {
                tracing::warn!(
                    recommendation_id = %id,
                    equipment_id = %equipment_id,
                    "Interrupted approval superseded by newer recommendation"
                );
                Self::update(&mut records, self, id, |r| {
                    r.status = RecommendationStatus::Superseded;
                    r.notes = Some(INTERRUPTED_SUPERSEDED_NOTE.to_string());
                })?;
            } else {
                tracing::warn!(
                    recommendation_id = %id,
                    equipment_id = %equipment_id,
                    "Interrupted approval returned to PENDING"
                );
                Self::update(&mut records, self, id, |r| {
                    r.status = RecommendationStatus::Pending;
                    r.approved_at = None;
                    r.approved_by = None;
                    r.notes = Some(INTERRUPTED_APPROVAL_NOTE.to_string());
                })?;
            }
        }
        Ok(stuck.len())
    }

    fn persist(&self, rec: &Recommendation) -> Result<(), RecordError> {
        if let Some(tree) = &self.tree {
            tree.insert(rec.recommendation_id.as_bytes(), serde_json::to_vec(rec)?)?;
        }
        Ok(())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Recommendation>>, RecordError> {
        self.records
            .read()
            .map_err(|e| RecordError::Storage(e.to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Recommendation>>, RecordError> {
        self.records
            .write()
            .map_err(|e| RecordError::Storage(e.to_string()))
    }

    /// Apply `f` to a copy of the record, persist it, then commit it.
    fn update<F>(
        records: &mut HashMap<String, Recommendation>,
        store: &Self,
        id: &str,
        f: F,
    ) -> Result<Recommendation, RecordError>
    where
        F: FnOnce(&mut Recommendation),
    {
        let mut rec = records
            .get(id)
            .cloned()
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        f(&mut rec);
        store.persist(&rec)?;
        records.insert(id.to_string(), rec.clone());
        Ok(rec)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Insert a new PENDING recommendation unless the equipment already has
    /// one.
    pub fn create(&self, rec: Recommendation) -> Result<Recommendation, RecordError> {
        let mut records = self.write()?;
        if let Some(existing) = records
            .values()
            .find(|r| r.is_pending() && r.equipment_id == rec.equipment_id)
        {
            return Err(RecordError::PendingExists {
                equipment_id: rec.equipment_id,
                recommendation_id: existing.recommendation_id.clone(),
            });
        }
        self.persist(&rec)?;
        records.insert(rec.recommendation_id.clone(), rec.clone());
        tracing::info!(
            recommendation_id = %rec.recommendation_id,
            equipment_id = %rec.equipment_id,
            "Recommendation created"
        );
        Ok(rec)
    }

    /// Mark the equipment's PENDING recommendation SUPERSEDED, if any.
    pub fn supersede_pending(
        &self,
        equipment_id: &str,
        note: &str,
    ) -> Result<Option<Recommendation>, RecordError> {
        let mut records = self.write()?;
        let Some(id) = records
            .values()
            .find(|r| r.is_pending() && r.equipment_id == equipment_id)
            .map(|r| r.recommendation_id.clone())
        else {
            return Ok(None);
        };
        let rec = Self::update(&mut records, self, &id, |r| {
            r.status = RecommendationStatus::Superseded;
            r.notes = Some(note.to_string());
        })?;
        tracing::info!(recommendation_id = %id, equipment_id, "Recommendation superseded");
        Ok(Some(rec))
    }

    /// PENDING -> APPROVED. Returns `None` when the recommendation is no
    /// longer pending.
    pub fn begin_approval(
        &self,
        id: &str,
        approver: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Recommendation>, RecordError> {
        let mut records = self.write()?;
        match records.get(id) {
            None => return Err(RecordError::NotFound(id.to_string())),
            Some(r) if !r.is_pending() => return Ok(None),
            Some(_) => {}
        }
        Self::update(&mut records, self, id, |r| {
            r.status = RecommendationStatus::Approved;
            r.approved_at = Some(now);
            r.approved_by = Some(approver.to_string());
        })
        .map(Some)
    }

    /// APPROVED -> COMPLETED with the work order that carried out the repair.
    pub fn complete(&self, id: &str, work_order_id: &str) -> Result<Recommendation, RecordError> {
        let mut records = self.write()?;
        Self::expect_status(&records, id, RecommendationStatus::Approved, RecommendationStatus::Completed)?;
        Self::update(&mut records, self, id, |r| {
            r.status = RecommendationStatus::Completed;
            r.work_order_id = Some(work_order_id.to_string());
        })
    }

    /// APPROVED -> PENDING after a failed remediation, so the approval can be
    /// retried.
    pub fn revert_approval(&self, id: &str, note: &str) -> Result<Recommendation, RecordError> {
        let mut records = self.write()?;
        Self::expect_status(&records, id, RecommendationStatus::Approved, RecommendationStatus::Pending)?;
        Self::update(&mut records, self, id, |r| {
            r.status = RecommendationStatus::Pending;
            r.approved_at = None;
            r.approved_by = None;
            r.notes = Some(note.to_string());
        })
    }

    /// PENDING -> DISMISSED. Returns `None` when the recommendation is no
    /// longer pending.
    pub fn dismiss(&self, id: &str, reason: &str) -> Result<Option<Recommendation>, RecordError> {
        let mut records = self.write()?;
        match records.get(id) {
            None => return Err(RecordError::NotFound(id.to_string())),
            Some(r) if !r.is_pending() => return Ok(None),
            Some(_) => {}
        }
        Self::update(&mut records, self, id, |r| {
            r.status = RecommendationStatus::Dismissed;
            r.notes = Some(reason.to_string());
        })
        .map(Some)
    }

    fn expect_status(
        records: &HashMap<String, Recommendation>,
        id: &str,
        from: RecommendationStatus,
        to: RecommendationStatus,
    ) -> Result<(), RecordError> {
        let rec = records
            .get(id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        if rec.status == from {
            Ok(())
        } else {
            Err(RecordError::InvalidTransition {
                id: id.to_string(),
                from: rec.status,
                to,
            })
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, id: &str) -> Result<Option<Recommendation>, RecordError> {
        Ok(self.read()?.get(id).cloned())
    }

    pub fn pending_for(&self, equipment_id: &str) -> Result<Option<Recommendation>, RecordError> {
        Ok(self
            .read()?
            .values()
            .find(|r| r.is_pending() && r.equipment_id == equipment_id)
            .cloned())
    }

    pub fn has_pending(&self, equipment_id: &str) -> Result<bool, RecordError> {
        Ok(self.pending_for(equipment_id)?.is_some())
    }

    /// Pending recommendations, highest probability first, then oldest first.
    pub fn pending(&self) -> Result<Vec<Recommendation>, RecordError> {
        let mut out: Vec<Recommendation> =
            self.read()?.values().filter(|r| r.is_pending()).cloned().collect();
        out.sort_by(|a, b| {
            b.failure_probability
                .total_cmp(&a.failure_probability)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    /// Terminal recommendations, most recent first.
    pub fn resolved(&self, limit: usize) -> Result<Vec<Recommendation>, RecordError> {
        let mut out: Vec<Recommendation> = self
            .read()?
            .values()
            .filter(|r| r.status.is_terminal())
            .cloned()
            .collect();
        out.sort_by_key(|r| std::cmp::Reverse(r.approved_at.unwrap_or(r.created_at)));
        out.truncate(limit);
        Ok(out)
    }

    /// Number of PENDING recommendations for one equipment.
    pub fn pending_count(&self, equipment_id: &str) -> Result<usize, RecordError> {
        Ok(self
            .read()?
            .values()
            .filter(|r| r.is_pending() && r.equipment_id == equipment_id)
            .count())
    }

    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
