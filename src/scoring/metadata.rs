//! Equipment maintenance metadata used as classifier context.
//!
//! The file is optional. Any load failure leaves the catalog empty, which
//! makes every machine fall back to the configured neutral defaults.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::config::MetadataConfig;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata parse error: {0}")]
    Parse(String),
}

/// What is known about one machine. Missing fields use defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct EquipmentRecord {
    #[serde(default)]
    pub days_since_maintenance: Option<f64>,
    #[serde(default)]
    pub equipment_age_years: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    equipment: HashMap<String, EquipmentRecord>,
}

/// Resolved context features for one machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquipmentContext {
    pub days_since_maintenance: f64,
    pub equipment_age_years: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    records: HashMap<String, EquipmentRecord>,
    config: MetadataConfig,
}

impl MetadataCatalog {
    pub fn new(config: MetadataConfig) -> Self {
        Self {
            records: HashMap::new(),
            config,
        }
    }

    /// Parse a TOML (`[equipment."ID"]` tables) or JSON (`{"equipment": {...}}`)
    /// metadata file.
    pub fn load(path: &Path, config: MetadataConfig) -> Result<Self, MetadataError> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let file: MetadataFile = if is_json {
            serde_json::from_str(&contents).map_err(|e| MetadataError::Parse(e.to_string()))?
        } else {
            toml::from_str(&contents).map_err(|e| MetadataError::Parse(e.to_string()))?
        };
        Ok(Self {
            records: file.equipment,
            config,
        })
    }

    /// Load the configured file, or fall back to an empty catalog.
    pub fn load_or_default(config: &MetadataConfig) -> Self {
        let Some(path) = config.path.as_deref() else {
            return Self::new(config.clone());
        };
        match Self::load(path, config.clone()) {
            Ok(catalog) => {
                tracing::info!(path = %path.display(), machines = catalog.len(), "Loaded equipment metadata");
                catalog
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Equipment metadata unavailable, using neutral defaults");
                Self::new(config.clone())
            }
        }
    }

    pub fn insert(&mut self, equipment_id: impl Into<String>, record: EquipmentRecord) {
        self.records.insert(equipment_id.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Context features for `equipment_id`, defaulted and capped.
    pub fn context(&self, equipment_id: &str) -> EquipmentContext {
        let record = self.records.get(equipment_id).copied().unwrap_or_default();
        let c = &self.config;
        EquipmentContext {
            days_since_maintenance: bounded(
                record.days_since_maintenance,
                c.default_days_since_maintenance,
                c.max_days_since_maintenance,
            ),
            equipment_age_years: bounded(
                record.equipment_age_years,
                c.default_equipment_age_years,
                c.max_equipment_age_years,
            ),
        }
    }
}

fn bounded(value: Option<f64>, default: f64, max: f64) -> f64 {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default)
        .min(max)
}
