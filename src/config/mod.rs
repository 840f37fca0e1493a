//! Plant Configuration Module
//!
//! Provides the deployment configuration loaded from TOML: sensor
//! calibration, trend gating, risk tiers, broker routing and workflow
//! policy. Every value has a built-in default.
//!
//! ## Loading Order
//!
//! 1. `FORGEWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `forgewatch.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` from the
//! binary edge. Library components take the sections they need by value
//! so tests can build them without touching the global.
//!
//! ```ignore
//! config::init(PlantConfig::load());
//! let horizon = config::get().scoring.horizon();
//! ```

pub mod defaults;
mod plant_config;
pub mod watcher;

pub use plant_config::*;

use std::sync::OnceLock;

/// Global plant configuration, initialized once at startup.
static PLANT_CONFIG: OnceLock<PlantConfig> = OnceLock::new();

/// Initialize the global plant configuration.
///
/// Subsequent calls are ignored with a warning.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global plant configuration.
///
/// Panics if `init()` has not been called. A missing config is a startup
/// bug, not a recoverable condition.
pub fn get() -> &'static PlantConfig {
    PLANT_CONFIG
        .get()
        .expect("config::get() called before config::init()")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    PLANT_CONFIG.get().is_some()
}
