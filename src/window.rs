//! Per-equipment rolling windows of sensor samples.
//!
//! Windows live in a sharded concurrent map keyed by equipment ID, so
//! ingestion for unrelated machines never contends on a single lock.
//! Each window is kept ordered by timestamp; out-of-order arrivals are
//! inserted in place.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

use crate::types::SensorSample;

/// Result of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    pub samples_removed: usize,
    pub windows_dropped: usize,
}

pub struct WindowStore {
    windows: DashMap<String, VecDeque<SensorSample>>,
    horizon: Duration,
}

impl WindowStore {
    pub fn new(horizon: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            horizon,
        }
    }

    pub const fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Append a sample, creating the window on first sight of the equipment.
    pub fn ingest(&self, sample: SensorSample) {
        let mut window = self
            .windows
            .entry(sample.equipment_id.clone())
            .or_default();

        match window.back() {
            Some(last) if sample.timestamp < last.timestamp => {
                let at = window.partition_point(|s| s.timestamp <= sample.timestamp);
                window.insert(at, sample);
            }
            _ => window.push_back(sample),
        }
    }

    /// Copy of the current window contents, oldest first.
    pub fn snapshot(&self, equipment_id: &str) -> Option<Vec<SensorSample>> {
        self.windows
            .get(equipment_id)
            .map(|w| w.iter().cloned().collect())
    }

    /// Equipment IDs that currently have a window, sorted.
    pub fn equipment_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Remove samples older than `now - horizon`, then drop empty windows.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> EvictionStats {
        let cutoff = now - self.horizon;
        let mut stats = EvictionStats::default();

        for mut window in self.windows.iter_mut() {
            // Ordered by timestamp, so expired samples are a prefix.
            let expired = window.partition_point(|s| s.timestamp < cutoff);
            window.drain(..expired);
            stats.samples_removed += expired;
        }

        self.windows.retain(|_, w| {
            let keep = !w.is_empty();
            if !keep {
                stats.windows_dropped += 1;
            }
            keep
        });

        stats
    }

    /// Number of equipment windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Total samples across every window.
    pub fn sample_count(&self) -> usize {
        self.windows.iter().map(|w| w.len()).sum()
    }

    /// Drop every window, returning how many there were.
    pub fn clear(&self) -> usize {
        let count = self.windows.len();
        self.windows.clear();
        count
    }
}
