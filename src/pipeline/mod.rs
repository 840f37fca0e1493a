//! Ingestion Pipeline
//!
//! ```text
//! SampleSource (stdin | tcp | channel) ──┐
//!                                        ├──> SampleIngestor ──> WindowStore
//! POST /api/v1/samples ──────────────────┘
//! ```
//!
//! Ingestion is continuous and per message; scoring reads the windows on
//! its own schedule (see `scoring::ScoringScheduler`).

mod ingest;
pub mod source;

pub use ingest::{IngestLoop, IngestStats, SampleIngestor};
pub use source::{ChannelSource, SampleEvent, SampleSource, SourceError, StdinSource, TcpSource};
