//! Logistic-regression risk scoring.

use std::sync::Arc;

use super::coefficients::{CoefficientSet, CoefficientStore};
use crate::config::RiskConfig;
use crate::types::{Driver, FeatureVector, RiskLevel};

/// Probability, tier and explanation for one feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScore {
    pub logit: f64,
    pub probability: f64,
    pub risk_level: RiskLevel,
    /// Signed `coefficient * value` per feature, in feature order.
    pub contributions: Vec<(&'static str, f64)>,
    /// Contributions above the driver threshold, largest first.
    pub drivers: Vec<Driver>,
}

pub struct RiskScorer {
    coefficients: Arc<CoefficientStore>,
    thresholds: RiskConfig,
}

impl RiskScorer {
    pub const fn new(coefficients: Arc<CoefficientStore>, thresholds: RiskConfig) -> Self {
        Self {
            coefficients,
            thresholds,
        }
    }

    pub const fn coefficients(&self) -> &Arc<CoefficientStore> {
        &self.coefficients
    }

    /// Score against the coefficient set active right now.
    pub fn score(&self, features: &FeatureVector) -> RiskScore {
        self.score_with(&self.coefficients.current(), features)
    }

    /// Score against an explicit snapshot, so a whole cycle can share one.
    pub fn score_with(&self, set: &CoefficientSet, features: &FeatureVector) -> RiskScore {
        let contributions: Vec<(&'static str, f64)> = features
            .named()
            .iter()
            .map(|&(name, value)| (name, set.weight(name) * value))
            .collect();

        let logit = set.intercept + contributions.iter().map(|(_, c)| c).sum::<f64>();
        let probability = logistic(logit);

        let mut drivers: Vec<Driver> = contributions
            .iter()
            .filter(|(_, c)| *c > self.thresholds.driver_threshold)
            .map(|&(name, c)| Driver {
                feature: name.to_string(),
                contribution: c,
            })
            .collect();
        drivers.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));

        RiskScore {
            logit,
            probability,
            risk_level: classify(probability, &self.thresholds),
            contributions,
            drivers,
        }
    }
}

/// Numerically stable logistic function, clamped to `[0, 1]`.
/// A NaN logit maps to 0.
pub fn logistic(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    let p = if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    };
    p.clamp(0.0, 1.0)
}

/// Tier boundaries are inclusive lower bounds.
pub fn classify(probability: f64, thresholds: &RiskConfig) -> RiskLevel {
    if probability >= thresholds.critical {
        RiskLevel::Critical
    } else if probability >= thresholds.high {
        RiskLevel::High
    } else if probability >= thresholds.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
