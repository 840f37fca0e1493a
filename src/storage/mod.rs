//! Persistence
//!
//! Three stores, all with an in-memory variant for tests and a sled-backed
//! variant for deployments:
//! - [`PredictionStore`]: latest prediction per equipment (last write wins)
//! - [`RecommendationStore`]: HIGH-risk recommendations and their lifecycle
//! - [`AuditLog`]: append-only record of automated CRITICAL responses
//!
//! The durable variants share one sled database, one named tree each.

mod audit;
mod predictions;
mod recommendations;

pub use audit::AuditLog;
pub use predictions::{InMemoryPredictionStore, PredictionStore, SledPredictionStore, StoreError};
pub use recommendations::{
    RecommendationStore, RecordError, INTERRUPTED_APPROVAL_NOTE, INTERRUPTED_SUPERSEDED_NOTE,
};

use std::path::Path;

/// Sled tree holding the latest prediction per equipment.
pub const PREDICTIONS_TREE: &str = "predictions";
/// Sled tree holding recommendations keyed by recommendation ID.
pub const RECOMMENDATIONS_TREE: &str = "recommendations";
/// Sled tree holding automated actions keyed by event ID.
pub const ACTIONS_TREE: &str = "automated_actions";

/// Open (or create) the plant database under `data_dir`.
pub fn open_database(data_dir: &Path) -> Result<sled::Db, StoreError> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| StoreError::Backend(format!("create {}: {e}", data_dir.display())))?;
    let path = data_dir.join("forgewatch.db");
    let db = sled::open(&path).map_err(|e| StoreError::Backend(e.to_string()))?;
    tracing::info!(path = %path.display(), recovered = db.was_recovered(), "Database opened");
    Ok(db)
}
