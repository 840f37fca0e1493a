//! Window -> feature vector.

use thiserror::Error;

use super::metadata::EquipmentContext;
use super::trend::TrendEstimator;
use crate::config::CalibrationConfig;
use crate::types::{FeatureVector, SensorAverages, SensorSample, SensorType};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("window has {have} samples, need at least {need}")]
    InsufficientSamples { have: usize, need: usize },
}

/// Features plus the raw averages they were derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedFeatures {
    pub averages: SensorAverages,
    pub features: FeatureVector,
    pub window_size: usize,
}

impl ExtractedFeatures {
    /// Limit both trend rates to `cap`, for equipment held at the HIGH
    /// alert level. Falling trends are left alone.
    pub fn cap_trends(&mut self, cap: f64) {
        self.features.vibration_trend_rate = self.features.vibration_trend_rate.min(cap);
        self.features.temperature_trend_rate = self.features.temperature_trend_rate.min(cap);
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    calibration: CalibrationConfig,
    trend: TrendEstimator,
    min_samples: usize,
}

impl FeatureExtractor {
    pub const fn new(calibration: CalibrationConfig, trend: TrendEstimator, min_samples: usize) -> Self {
        Self {
            calibration,
            trend,
            min_samples,
        }
    }

    pub const fn calibration(&self) -> &CalibrationConfig {
        &self.calibration
    }

    /// Summarize a window ordered oldest first.
    ///
    /// Trend time is measured in hours since the window's first sample of
    /// any type.
    pub fn extract(
        &self,
        window: &[SensorSample],
        context: EquipmentContext,
    ) -> Result<ExtractedFeatures, FeatureError> {
        if window.len() < self.min_samples {
            return Err(FeatureError::InsufficientSamples {
                have: window.len(),
                need: self.min_samples,
            });
        }

        let base = window[0].timestamp;
        let mut sums = [(0.0_f64, 0_usize); 6];
        let mut vibration = Vec::new();
        let mut temperature = Vec::new();

        for sample in window {
            let slot = &mut sums[slot_of(sample.sensor_type)];
            slot.0 += sample.value;
            slot.1 += 1;

            #[allow(clippy::cast_precision_loss)]
            let hours = (sample.timestamp - base).num_milliseconds() as f64 / 3_600_000.0;
            match sample.sensor_type {
                SensorType::Vibration => vibration.push((hours, sample.value)),
                SensorType::Temperature => temperature.push((hours, sample.value)),
                _ => {}
            }
        }

        let mean = |sensor: SensorType| {
            let (sum, count) = sums[slot_of(sensor)];
            if count == 0 {
                self.calibration.for_sensor(sensor).neutral
            } else {
                #[allow(clippy::cast_precision_loss)]
                let n = count as f64;
                sum / n
            }
        };

        let averages = SensorAverages {
            vibration_avg: mean(SensorType::Vibration),
            temperature_avg: mean(SensorType::Temperature),
            power_avg: mean(SensorType::Power),
            rpm_avg: mean(SensorType::Rpm),
            pressure_avg: mean(SensorType::Pressure),
            torque_avg: mean(SensorType::Torque),
        };

        let cal = &self.calibration;
        let features = FeatureVector {
            vibration_normalized: self.normalize(SensorType::Vibration, averages.vibration_avg),
            temperature_normalized: self.normalize(SensorType::Temperature, averages.temperature_avg),
            power_normalized: self.normalize(SensorType::Power, averages.power_avg),
            rpm_normalized: self.normalize(SensorType::Rpm, averages.rpm_avg),
            pressure_normalized: self.normalize(SensorType::Pressure, averages.pressure_avg),
            torque_normalized: self.normalize(SensorType::Torque, averages.torque_avg),
            vibration_trend_rate: self.trend.rate(&vibration, cal.vibration.critical),
            temperature_trend_rate: self.trend.rate(&temperature, cal.temperature.critical),
            days_since_maintenance: context.days_since_maintenance,
            equipment_age_years: context.equipment_age_years,
            anomaly_count: 0.0,
        };

        Ok(ExtractedFeatures {
            averages,
            features,
            window_size: window.len(),
        })
    }

    fn normalize(&self, sensor: SensorType, average: f64) -> f64 {
        let cal = self.calibration.for_sensor(sensor);
        let ratio = average / cal.critical;
        if cal.clamp {
            ratio.min(1.0)
        } else {
            ratio
        }
    }
}

const fn slot_of(sensor: SensorType) -> usize {
    match sensor {
        SensorType::Vibration => 0,
        SensorType::Temperature => 1,
        SensorType::Power => 2,
        SensorType::Rpm => 3,
        SensorType::Pressure => 4,
        SensorType::Torque => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrendConfig;
    use chrono::{Duration, TimeZone, Utc};

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(
            CalibrationConfig::default(),
            TrendEstimator::new(&TrendConfig::default()),
            4,
        )
    }

    fn ctx() -> EquipmentContext {
        EquipmentContext {
            days_since_maintenance: 30.0,
            equipment_age_years: 2.0,
        }
    }

    fn at(secs: i64, sensor: SensorType, value: f64) -> SensorSample {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        SensorSample::new("PHX-CNC-007", sensor, value, t0 + Duration::seconds(secs))
    }

    #[test]
    fn test_minimum_window_size() {
        let window: Vec<_> = (0..3).map(|i| at(i, SensorType::Vibration, 2.0)).collect();
        assert_eq!(
            extractor().extract(&window, ctx()),
            Err(FeatureError::InsufficientSamples { have: 3, need: 4 })
        );
    }

    #[test]
    fn test_missing_sensors_use_neutral_defaults() {
        let window: Vec<_> = (0..4).map(|i| at(i, SensorType::Vibration, 3.0)).collect();
        let out = extractor().extract(&window, ctx()).unwrap();
        assert_eq!(out.averages.vibration_avg, 3.0);
        assert_eq!(out.averages.temperature_avg, 50.0);
        assert_eq!(out.averages.power_avg, 15.0);
        assert_eq!(out.averages.rpm_avg, 8_500.0);
        assert_eq!(out.averages.pressure_avg, 6.0);
        assert_eq!(out.averages.torque_avg, 45.0);
        assert!((out.features.vibration_normalized - 0.6).abs() < 1e-12);
        assert!((out.features.rpm_normalized - 0.85).abs() < 1e-12);
        assert_eq!(out.features.vibration_trend_rate, 0.0);
        assert_eq!(out.window_size, 4);
    }

    #[test]
    fn test_clamped_and_unclamped_normalization() {
        let mut window: Vec<_> = (0..4).map(|i| at(i, SensorType::Vibration, 7.5)).collect();
        window.extend((4..8).map(|i| at(i, SensorType::Power, 75.0)));
        let out = extractor().extract(&window, ctx()).unwrap();
        assert_eq!(out.features.vibration_normalized, 1.0);
        assert!((out.features.power_normalized - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_rising_vibration_produces_trend() {
        // 25 samples over 90 s, 2.5 -> 4.2 mm/s.
        let window: Vec<_> = (0..25)
            .map(|i| {
                let frac = f64::from(i) / 24.0;
                at(
                    i64::from(i) * 90 / 24,
                    SensorType::Vibration,
                    1.7f64.mul_add(frac, 2.5),
                )
            })
            .collect();
        let mut out = extractor().extract(&window, ctx()).unwrap();
        assert_eq!(out.features.vibration_trend_rate, 0.5);
        assert_eq!(out.features.temperature_trend_rate, 0.0);

        out.cap_trends(0.05);
        assert_eq!(out.features.vibration_trend_rate, 0.05);
        assert_eq!(out.features.temperature_trend_rate, 0.0);
    }
}
