//! Ingestion: validate sensor messages and append them to the windows.
//!
//! Malformed messages are dropped and counted, never propagated.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{SampleEvent, SampleSource, SourceError};
use crate::clock::SharedClock;
use crate::types::{SampleRejection, SensorMessage};
use crate::window::WindowStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub dropped: u64,
}

/// Validates messages into samples and appends them to the window store.
/// Shared by the source loop and the HTTP ingress.
pub struct SampleIngestor {
    windows: Arc<WindowStore>,
    clock: SharedClock,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl SampleIngestor {
    pub fn new(windows: Arc<WindowStore>, clock: SharedClock) -> Self {
        Self {
            windows,
            clock,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn ingest(&self, message: SensorMessage) -> Result<(), SampleRejection> {
        match message.into_sample(self.clock.now()) {
            Ok(sample) => {
                self.windows.ingest(sample);
                self.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(rejection) => {
                self.reject(&rejection);
                Err(rejection)
            }
        }
    }

    /// Count a message that never made it to validation.
    pub fn reject(&self, rejection: &SampleRejection) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(reason = %rejection, "Sample dropped");
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Drains a [`SampleSource`] into a [`SampleIngestor`] until EOF or
/// cancellation.
pub struct IngestLoop<S: SampleSource> {
    source: S,
    ingestor: Arc<SampleIngestor>,
}

impl<S: SampleSource> IngestLoop<S> {
    pub fn new(source: S, ingestor: Arc<SampleIngestor>) -> Self {
        Self { source, ingestor }
    }

    /// Returns the counts for this loop alone.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<IngestStats, SourceError> {
        let name = self.source.source_name().to_string();
        info!(source = %name, "Sample ingestion started");
        let mut stats = IngestStats::default();

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = self.source.next_event() => event,
            };
            match event {
                Ok(SampleEvent::Message(message)) => match self.ingestor.ingest(message) {
                    Ok(()) => stats.accepted += 1,
                    Err(_) => stats.dropped += 1,
                },
                Ok(SampleEvent::Malformed(rejection)) => {
                    self.ingestor.reject(&rejection);
                    stats.dropped += 1;
                }
                Ok(SampleEvent::Eof) => {
                    info!(source = %name, "Sample source reached end of data");
                    break;
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Sample source failed");
                    return Err(e);
                }
            }
        }

        info!(
            source = %name,
            accepted = stats.accepted,
            dropped = stats.dropped,
            "Sample ingestion stopped"
        );
        Ok(stats)
    }
}
