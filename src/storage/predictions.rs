//! Latest-prediction store.
//!
//! One entry per equipment ID, last write wins. The scoring cycle writes a
//! whole cycle's predictions with [`PredictionStore::put_batch`] so a cycle
//! is either fully published or not at all.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::types::Prediction;

/// Prediction store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Trait for pluggable prediction store backends
///
/// Implementations must be thread-safe: the scoring cycle writes while
/// API handlers read.
pub trait PredictionStore: Send + Sync {
    /// All equipment IDs with a stored prediction, sorted.
    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn get(&self, equipment_id: &str) -> Result<Option<Prediction>, StoreError>;

    /// Write every prediction or none of them.
    fn put_batch(&self, predictions: &[Prediction]) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    fn delete(&self, equipment_id: &str) -> Result<bool, StoreError>;

    /// Remove everything; returns the number of entries removed.
    fn clear(&self) -> Result<usize, StoreError>;

    /// Cheap reachability probe, run before each publish.
    fn ping(&self) -> Result<(), StoreError>;

    /// Re-establish the backend connection after repeated failures.
    fn reconnect(&self) -> Result<(), StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;

    /// All stored predictions, sorted by equipment ID.
    fn all(&self) -> Result<Vec<Prediction>, StoreError> {
        let mut out = Vec::new();
        for key in self.keys()? {
            if let Some(p) = self.get(&key)? {
                out.push(p);
            }
        }
        Ok(out)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory store for tests and single-process deployments.
///
/// Can be taken offline to exercise the whole-cycle skip path.
#[derive(Default)]
pub struct InMemoryPredictionStore {
    entries: DashMap<String, Prediction>,
    offline: AtomicBool,
    reconnects: AtomicUsize,
}

impl InMemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Number of `reconnect()` calls seen.
    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store offline".into()))
        } else {
            Ok(())
        }
    }
}

impl PredictionStore for InMemoryPredictionStore {
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.check_online()?;
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    fn get(&self, equipment_id: &str) -> Result<Option<Prediction>, StoreError> {
        self.check_online()?;
        Ok(self.entries.get(equipment_id).map(|e| e.value().clone()))
    }

    fn put_batch(&self, predictions: &[Prediction]) -> Result<(), StoreError> {
        self.check_online()?;
        for p in predictions {
            self.entries.insert(p.equipment_id.clone(), p.clone());
        }
        Ok(())
    }

    fn delete(&self, equipment_id: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.entries.remove(equipment_id).is_some())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        self.check_online()?;
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        Ok(removed)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    fn reconnect(&self) -> Result<(), StoreError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.check_online()
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

// ============================================================================
// Sled
// ============================================================================

/// Durable store in a named sled tree.
///
/// `reconnect()` flushes and reopens the tree handle; the database itself
/// stays open for the life of the process.
pub struct SledPredictionStore {
    db: sled::Db,
    tree: ArcSwap<sled::Tree>,
}

impl SledPredictionStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(super::PREDICTIONS_TREE)?;
        tracing::info!(entries = tree.len(), "Prediction store opened");
        Ok(Self {
            db: db.clone(),
            tree: ArcSwap::from_pointee(tree),
        })
    }
}

impl PredictionStore for SledPredictionStore {
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let tree = self.tree.load();
        let mut keys = Vec::with_capacity(tree.len());
        for key in tree.iter().keys() {
            let key = key?;
            match std::str::from_utf8(&key) {
                Ok(k) => keys.push(k.to_string()),
                Err(_) => tracing::warn!("Skipping non-UTF-8 prediction key"),
            }
        }
        Ok(keys)
    }

    fn get(&self, equipment_id: &str) -> Result<Option<Prediction>, StoreError> {
        match self.tree.load().get(equipment_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_batch(&self, predictions: &[Prediction]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for p in predictions {
            batch.insert(p.equipment_id.as_bytes(), serde_json::to_vec(p)?);
        }
        self.tree.load().apply_batch(batch)?;
        Ok(())
    }

    fn delete(&self, equipment_id: &str) -> Result<bool, StoreError> {
        Ok(self.tree.load().remove(equipment_id.as_bytes())?.is_some())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let tree = self.tree.load();
        let count = tree.len();
        tree.clear()?;
        Ok(count)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.db.size_on_disk()?;
        Ok(())
    }

    fn reconnect(&self) -> Result<(), StoreError> {
        self.tree.load().flush()?;
        let tree = self.db.open_tree(super::PREDICTIONS_TREE)?;
        self.tree.store(Arc::new(tree));
        tracing::info!("Prediction store tree reopened");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
