//! Periodic scoring.
//!
//! Waits an initial delay so windows can fill, then runs one cycle per
//! interval until cancelled. A slow cycle delays the next tick rather than
//! triggering a burst of catch-up cycles.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::engine::ScoringEngine;

pub struct ScoringScheduler {
    engine: Arc<ScoringEngine>,
    initial_delay: Duration,
    interval: Duration,
}

impl ScoringScheduler {
    pub fn new(engine: Arc<ScoringEngine>, initial_delay: Duration, interval: Duration) -> Self {
        Self {
            engine,
            initial_delay,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Run until `cancel` fires; returns the number of cycles run.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        info!(
            initial_delay_secs = self.initial_delay.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Scoring scheduler started"
        );

        tokio::select! {
            () = cancel.cancelled() => return 0,
            () = tokio::time::sleep(self.initial_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(cycles, "Scoring scheduler stopping");
                    return cycles;
                }
                _ = ticker.tick() => {
                    self.engine.run_cycle();
                    cycles += 1;
                }
            }
        }
    }
}
