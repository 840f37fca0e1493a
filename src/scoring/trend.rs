//! Least-squares trend estimation with a noise-rejection gate.
//!
//! A slope only counts as a trend when the series is long enough, spans
//! enough time and is explained well by a straight line. Anything else is
//! reported as "no trend" (0.0).

use crate::config::TrendConfig;

/// Below this, sums of squares are treated as zero.
const DEGENERATE_EPSILON: f64 = 1e-12;

/// Ordinary least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Fit a line through `(x, y)` points.
///
/// Fewer than two points, or no spread in `x`, yields an all-zero fit. No
/// spread in `y` yields the slope with `r_squared = 0`.
pub fn least_squares(points: &[(f64, f64)]) -> LinearFit {
    if points.len() < 2 {
        return LinearFit::default();
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;

    let (mut sx, mut sy, mut sxy, mut sx2, mut sy2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        sx += x;
        sy += y;
        sxy += x * y;
        sx2 += x * x;
        sy2 += y * y;
    }

    let denom_x = n.mul_add(sx2, -(sx * sx));
    if denom_x.abs() < DEGENERATE_EPSILON {
        return LinearFit::default();
    }

    let numerator = n.mul_add(sxy, -(sx * sy));
    let slope = numerator / denom_x;
    let intercept = slope.mul_add(-sx, sy) / n;

    let denom_y = n.mul_add(sy2, -(sy * sy));
    let r_squared = if denom_y.abs() > DEGENERATE_EPSILON {
        let r = numerator / (denom_x * denom_y).sqrt();
        r * r
    } else {
        0.0
    };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Gated, normalized trend rates.
#[derive(Debug, Clone)]
pub struct TrendEstimator {
    min_points: usize,
    min_span_hours: f64,
    min_r_squared: f64,
    clamp: f64,
}

impl TrendEstimator {
    pub fn new(config: &TrendConfig) -> Self {
        Self {
            min_points: config.min_points,
            min_span_hours: config.min_span_secs / 3_600.0,
            min_r_squared: config.min_r_squared,
            clamp: config.clamp,
        }
    }

    /// Normalized trend rate of `(elapsed_hours, value)` points.
    ///
    /// The slope (units per hour) is divided by `critical` and clamped to
    /// `[-clamp, clamp]`. Returns 0.0 unless every gate passes:
    /// at least `min_points` points, a span strictly greater than
    /// `min_span`, and `r_squared` strictly greater than `min_r_squared`.
    pub fn rate(&self, points: &[(f64, f64)], critical: f64) -> f64 {
        if points.len() < self.min_points || critical <= 0.0 {
            return 0.0;
        }

        let (lo, hi) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(x, _)| {
                (lo.min(x), hi.max(x))
            });
        if hi - lo <= self.min_span_hours {
            return 0.0;
        }

        let fit = least_squares(points);
        if fit.r_squared <= self.min_r_squared {
            return 0.0;
        }

        (fit.slope / critical).clamp(-self.clamp, self.clamp)
    }
}

impl Default for TrendEstimator {
    fn default() -> Self {
        Self::new(&TrendConfig::default())
    }
}
