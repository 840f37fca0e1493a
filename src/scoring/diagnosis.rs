//! Rule-based probable-cause diagnosis.
//!
//! An ordered decision table over the six sensor averages and the two
//! normalized trend rates; the first matching rule wins. Thermal patterns
//! are checked before power patterns because an overheating motor also
//! draws more power and vibrates more, and would otherwise read as an
//! electrical fault.

use crate::types::{FaultType, SensorAverages};

/// Result of a diagnosis: the fault family and a human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub fault: FaultType,
    pub cause: String,
}

impl Diagnosis {
    fn new(fault: FaultType, cause: impl Into<String>) -> Self {
        Self {
            fault,
            cause: cause.into(),
        }
    }
}

/// Healthy operating points the flags are measured against.
mod baseline {
    pub const VIBRATION: f64 = 2.0;
    pub const TEMPERATURE: f64 = 50.0;
    pub const POWER: f64 = 15.0;
    pub const RPM: f64 = 8_500.0;
    pub const PRESSURE: f64 = 6.0;
    pub const TORQUE: f64 = 45.0;
}

/// Trend rate above which a series is treated as rising.
const TREND_RISING: f64 = 0.01;
/// Trend rate that counts as a clear upward trend on its own.
const TREND_STRONG: f64 = 0.02;
/// Smallest relative deviation reported by the fallback rule.
const FALLBACK_MIN_DEVIATION: f64 = 0.05;

/// Threshold flags derived from one set of averages.
#[derive(Debug, Clone, Copy)]
#[allow(clippy::struct_excessive_bools)]
struct Flags {
    vib_elevated: bool,
    vib_high: bool,
    vib_critical: bool,
    temp_elevated: bool,
    temp_high: bool,
    temp_critical: bool,
    power_elevated: bool,
    power_high: bool,
    power_spike: bool,
    rpm_degraded: bool,
    rpm_low: bool,
    pressure_low: bool,
    torque_elevated: bool,
    torque_high: bool,
}

impl Flags {
    fn from_averages(a: &SensorAverages) -> Self {
        Self {
            vib_elevated: a.vibration_avg > 2.3,
            vib_high: a.vibration_avg > 3.0,
            vib_critical: a.vibration_avg > 4.0,
            temp_elevated: a.temperature_avg > 52.5,
            temp_high: a.temperature_avg > 58.0,
            temp_critical: a.temperature_avg > 80.0,
            power_elevated: a.power_avg > 16.0,
            power_high: a.power_avg > 20.0,
            power_spike: a.power_avg > 40.0,
            rpm_degraded: a.rpm_avg < 8_350.0,
            rpm_low: a.rpm_avg < 7_500.0,
            pressure_low: a.pressure_avg < 5.5,
            torque_elevated: a.torque_avg > 46.0,
            torque_high: a.torque_avg > 50.0,
        }
    }
}

/// Diagnose a machine from its averages and normalized trend rates.
pub fn diagnose(a: &SensorAverages, vib_trend: f64, temp_trend: f64) -> Diagnosis {
    let f = Flags::from_averages(a);

    motor_burnout(a, &f, temp_trend)
        .or_else(|| coolant_failure(a, &f))
        .or_else(|| electrical_fault(a, &f))
        .or_else(|| spindle_wear(a, &f))
        .or_else(|| bearing_degradation(a, &f, vib_trend))
        .or_else(|| early_trend(vib_trend, temp_trend))
        .unwrap_or_else(|| dominant_deviation(a))
}

fn motor_burnout(a: &SensorAverages, f: &Flags, temp_trend: f64) -> Option<Diagnosis> {
    let cause = if f.temp_critical && f.power_high {
        format!(
            "Motor burnout: temperature critical at {:.0}°C with power draw at {:.1} kW",
            a.temperature_avg, a.power_avg
        )
    } else if f.temp_high && f.power_elevated && !f.pressure_low {
        format!(
            "Motor burnout: overheating under load, {:.0}°C at {:.1} kW",
            a.temperature_avg, a.power_avg
        )
    } else if f.temp_elevated && f.power_elevated && temp_trend > TREND_RISING && !f.pressure_low {
        format!(
            "Motor burnout risk: temperature rising at {:.0}°C with elevated power ({:.1} kW), inspect windings",
            a.temperature_avg, a.power_avg
        )
    } else {
        return None;
    };
    Some(Diagnosis::new(FaultType::Motor, cause))
}

fn coolant_failure(a: &SensorAverages, f: &Flags) -> Option<Diagnosis> {
    let cause = if f.temp_high && f.pressure_low {
        format!(
            "Coolant failure: {:.0}°C with coolant pressure down to {:.1} bar",
            a.temperature_avg, a.pressure_avg
        )
    } else if f.temp_elevated && f.pressure_low {
        format!(
            "Coolant degradation: {:.0}°C while pressure falls to {:.1} bar",
            a.temperature_avg, a.pressure_avg
        )
    } else {
        return None;
    };
    Some(Diagnosis::new(FaultType::Coolant, cause))
}

fn electrical_fault(a: &SensorAverages, f: &Flags) -> Option<Diagnosis> {
    let cause = if f.power_spike && f.vib_elevated {
        format!(
            "Electrical fault: power spike at {:.1} kW with vibration at {:.1} mm/s",
            a.power_avg, a.vibration_avg
        )
    } else if f.power_elevated && f.rpm_degraded && !f.temp_high {
        format!(
            "Electrical fault: excess current, {:.1} kW while RPM sags to {:.0}",
            a.power_avg, a.rpm_avg
        )
    } else if f.power_high && f.vib_elevated && !f.temp_critical {
        format!(
            "Electrical fault: elevated power ({:.1} kW) with vibration at {:.1} mm/s",
            a.power_avg, a.vibration_avg
        )
    } else {
        return None;
    };
    Some(Diagnosis::new(FaultType::Electrical, cause))
}

fn spindle_wear(a: &SensorAverages, f: &Flags) -> Option<Diagnosis> {
    let (torque_flag, vib_flag) = if f.rpm_low && (f.vib_high || f.torque_high) {
        (f.torque_high, f.vib_high)
    } else if f.rpm_degraded && (f.vib_elevated || f.torque_elevated) {
        (f.torque_elevated, f.vib_elevated)
    } else {
        return None;
    };

    let mut cause = format!("Spindle wear: RPM down to {:.0}", a.rpm_avg);
    if torque_flag {
        cause.push_str(&format!(", torque at {:.1} Nm", a.torque_avg));
    }
    if vib_flag {
        cause.push_str(&format!(", vibration at {:.1} mm/s", a.vibration_avg));
    }
    Some(Diagnosis::new(FaultType::Spindle, cause))
}

fn bearing_degradation(a: &SensorAverages, f: &Flags, vib_trend: f64) -> Option<Diagnosis> {
    let cause = if f.vib_critical {
        let trend = if vib_trend > TREND_RISING { " and trending upward" } else { "" };
        format!(
            "Bearing degradation: vibration at {:.1} mm/s{trend}, wear pattern",
            a.vibration_avg
        )
    } else if f.vib_high && !f.power_elevated && !f.pressure_low {
        format!(
            "Bearing degradation: vibration elevated at {:.1} mm/s",
            a.vibration_avg
        )
    } else if f.vib_elevated
        && vib_trend > TREND_RISING
        && !f.power_elevated
        && !f.pressure_low
        && !f.rpm_degraded
    {
        format!(
            "Bearing degradation (early): vibration at {:.1} mm/s and rising, monitor closely",
            a.vibration_avg
        )
    } else {
        return None;
    };
    Some(Diagnosis::new(FaultType::Bearing, cause))
}

fn early_trend(vib_trend: f64, temp_trend: f64) -> Option<Diagnosis> {
    let cause = if vib_trend > TREND_STRONG && temp_trend > TREND_RISING {
        "Early-stage degradation: vibration and temperature both trending upward"
    } else if vib_trend > TREND_STRONG {
        "Emerging vibration anomaly: upward trend, watch bearings and spindle"
    } else if temp_trend > TREND_STRONG {
        "Emerging thermal anomaly: temperature trending upward, check coolant and motor"
    } else {
        return None;
    };
    Some(Diagnosis::new(FaultType::General, cause))
}

/// Fallback: name the sensor furthest from its healthy baseline.
fn dominant_deviation(a: &SensorAverages) -> Diagnosis {
    let deviations = [
        ("vibration", (a.vibration_avg - baseline::VIBRATION) / baseline::VIBRATION),
        ("temperature", (a.temperature_avg - baseline::TEMPERATURE) / baseline::TEMPERATURE),
        ("power", (a.power_avg - baseline::POWER) / baseline::POWER),
        ("rpm", (baseline::RPM - a.rpm_avg) / baseline::RPM),
        ("pressure", (baseline::PRESSURE - a.pressure_avg) / baseline::PRESSURE),
        ("torque", (a.torque_avg - baseline::TORQUE) / baseline::TORQUE),
    ];

    let (sensor, deviation) = deviations
        .iter()
        .copied()
        .fold(("vibration", f64::NEG_INFINITY), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        });

    if deviation < FALLBACK_MIN_DEVIATION {
        return Diagnosis::new(FaultType::General, "Elevated readings, no dominant pattern");
    }

    let cause = match sensor {
        "vibration" => format!("Vibration anomaly at {:.1} mm/s, check bearings and mounting", a.vibration_avg),
        "temperature" => format!("Thermal anomaly at {:.0}°C, check cooling and motor", a.temperature_avg),
        "power" => format!("Power anomaly at {:.1} kW, check electrical supply", a.power_avg),
        "rpm" => format!("RPM anomaly at {:.0}, check spindle drive", a.rpm_avg),
        "pressure" => format!("Pressure anomaly at {:.1} bar, check coolant circuit", a.pressure_avg),
        _ => format!("Torque anomaly at {:.1} Nm, check spindle load", a.torque_avg),
    };
    Diagnosis::new(FaultType::General, cause)
}
