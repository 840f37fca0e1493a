//! Classifier coefficients and their hot-reload path.
//!
//! The active [`CoefficientSet`] is an immutable snapshot behind an
//! `ArcSwap`. Scoring loads the pointer once per cycle; a reload builds a
//! complete new set and swaps it in, so readers never see a half-applied
//! update. A failed reload leaves the previous snapshot in place.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::types::feature;

/// Key under which the intercept is stored in a coefficient source.
pub const INTERCEPT: &str = "intercept";

/// Defaults for `failure_predictor_v1`.
///
/// Features absent here (power, torque, maintenance context and anomaly
/// count) default to 0.0.
const DEFAULT_INTERCEPT: f64 = 20.5;
const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    (feature::VIBRATION_TREND_RATE, 106.0),
    (feature::RPM_NORMALIZED, -57.6),
    (feature::PRESSURE_NORMALIZED, -54.6),
    (feature::VIBRATION_NORMALIZED, 44.2),
    (feature::TEMPERATURE_TREND_RATE, 42.6),
    (feature::TEMPERATURE_NORMALIZED, 28.7),
];

#[derive(Debug, Error)]
pub enum CoefficientError {
    #[error("coefficient file I/O error ({0}): {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("coefficient file parse error ({0}): {1}")]
    Parse(PathBuf, String),
    #[error("coefficient `{0}` is not a finite number")]
    NotFinite(String),
    #[error("no coefficient source configured")]
    NoSource,
}

/// One complete, immutable coefficient set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientSet {
    pub model_id: String,
    pub intercept: f64,
    /// Weight for every known feature, defaults filled in.
    pub weights: BTreeMap<String, f64>,
    pub source: String,
    pub loaded_at: DateTime<Utc>,
}

impl CoefficientSet {
    pub fn defaults(model_id: impl Into<String>) -> Self {
        let mut weights: BTreeMap<String, f64> =
            feature::ALL.iter().map(|f| ((*f).to_string(), 0.0)).collect();
        for (name, w) in DEFAULT_WEIGHTS {
            weights.insert((*name).to_string(), *w);
        }
        Self {
            model_id: model_id.into(),
            intercept: DEFAULT_INTERCEPT,
            weights,
            source: "built-in".to_string(),
            loaded_at: Utc::now(),
        }
    }

    /// Defaults overlaid with whatever the source provided.
    ///
    /// Unknown names are ignored with a warning; a feature the source omits
    /// keeps its default, never zero unless that is the default.
    pub fn from_overrides(
        model_id: impl Into<String>,
        overrides: &HashMap<String, f64>,
        source: impl Into<String>,
    ) -> Result<Self, CoefficientError> {
        let mut set = Self::defaults(model_id);
        set.source = source.into();

        for (name, value) in overrides {
            if !value.is_finite() {
                return Err(CoefficientError::NotFinite(name.clone()));
            }
            if name == INTERCEPT {
                set.intercept = *value;
            } else if let Some(slot) = set.weights.get_mut(name) {
                *slot = *value;
            } else {
                tracing::warn!(feature = %name, "Ignoring coefficient for unknown feature");
            }
        }
        Ok(set)
    }

    pub fn weight(&self, feature: &str) -> f64 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Where coefficient overrides come from.
pub trait CoefficientSource: Send + Sync {
    /// Human-readable origin for logs and the model endpoint.
    fn describe(&self) -> String;

    /// Feature name -> coefficient, including `intercept` if provided.
    fn load(&self) -> Result<HashMap<String, f64>, CoefficientError>;
}

/// Reads a flat TOML or JSON table, optionally nested under `coefficients`.
///
/// ```toml
/// [coefficients]
/// intercept = 20.5
/// vibration_trend_rate = 106.0
/// ```
#[derive(Debug, Clone)]
pub struct FileCoefficientSource {
    path: PathBuf,
}

impl FileCoefficientSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CoefficientSource for FileCoefficientSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn load(&self) -> Result<HashMap<String, f64>, CoefficientError> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| CoefficientError::Io(self.path.clone(), e))?;
        let parse_err = |e: String| CoefficientError::Parse(self.path.clone(), e);

        let is_json = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let root: serde_json::Value = if is_json {
            serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))?
        } else {
            let value: toml::Value = toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| parse_err(e.to_string()))?
        };

        let table = root.get("coefficients").unwrap_or(&root);
        let Some(table) = table.as_object() else {
            return Err(parse_err("expected a table of feature = coefficient".into()));
        };

        table
            .iter()
            .map(|(name, v)| {
                v.as_f64()
                    .map(|f| (name.clone(), f))
                    .ok_or_else(|| CoefficientError::NotFinite(name.clone()))
            })
            .collect()
    }
}

/// Fixed overrides, mainly for tests and embedded deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticCoefficientSource {
    values: HashMap<String, f64>,
}

impl StaticCoefficientSource {
    pub fn new<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl CoefficientSource for StaticCoefficientSource {
    fn describe(&self) -> String {
        "static".to_string()
    }

    fn load(&self) -> Result<HashMap<String, f64>, CoefficientError> {
        Ok(self.values.clone())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Holds the active coefficient snapshot.
pub struct CoefficientStore {
    model_id: String,
    current: ArcSwap<CoefficientSet>,
    source: Option<Arc<dyn CoefficientSource>>,
}

impl CoefficientStore {
    /// Start from the built-in defaults without any source.
    pub fn with_defaults(model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            current: ArcSwap::from_pointee(CoefficientSet::defaults(model_id.clone())),
            model_id,
            source: None,
        }
    }

    /// Start from defaults, then attempt an initial load from `source`.
    /// A failed initial load is logged and the defaults stay active.
    pub fn with_source(model_id: impl Into<String>, source: Arc<dyn CoefficientSource>) -> Self {
        let mut store = Self::with_defaults(model_id);
        store.source = Some(source);
        if let Err(e) = store.reload() {
            tracing::warn!(error = %e, "Initial coefficient load failed, using built-in defaults");
        }
        store
    }

    /// Current snapshot. Cheap; clone of an `Arc`.
    pub fn current(&self) -> Arc<CoefficientSet> {
        self.current.load_full()
    }

    /// Reload from the source and swap the new set in.
    ///
    /// On failure the previous snapshot is retained and the error returned.
    pub fn reload(&self) -> Result<Arc<CoefficientSet>, CoefficientError> {
        let source = self.source.as_ref().ok_or(CoefficientError::NoSource)?;
        let overrides = source.load()?;
        let set = Arc::new(CoefficientSet::from_overrides(
            self.model_id.clone(),
            &overrides,
            source.describe(),
        )?);
        self.current.store(Arc::clone(&set));
        tracing::info!(
            source = %set.source,
            overrides = overrides.len(),
            intercept = set.intercept,
            "Coefficients reloaded"
        );
        Ok(set)
    }
}
