//! Apparent ("feels like") temperature from air temperature, relative humidity
//! and wind speed.
//!
//! ```text
//! e        = (RH / 100) * 6.105 * exp(17.27 * T / (237.7 + T))
//! apparent = T + 0.33 * e - 0.70 * wind_mps - 4.0
//! ```
//!
//! `T` is in °C, `RH` in percent (clamped to 0..=100), wind in m/s. The result
//! is rounded to two decimals.

use crate::error::ComputeError;
use crate::wind::WindUnit;

const VAPOUR_PRESSURE_SCALE: f64 = 6.105;
const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;
const HUMIDITY_WEIGHT: f64 = 0.33;
const WIND_WEIGHT: f64 = 0.70;
const OFFSET: f64 = 4.0;

/// Result of one calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApparentTemperature {
    /// Apparent temperature in °C, rounded to two decimals
    pub apparent_c: f64,
    /// Wind speed after conversion to m/s
    pub wind_mps: f64,
}

/// Computes the apparent temperature.
///
/// Fails only where the formula itself is undefined: at `T = -237.7 °C`, or
/// when an input is not finite.
pub fn compute(
    temperature_c: f64,
    humidity_pct: f64,
    wind_value: f64,
    wind_unit: WindUnit,
) -> Result<ApparentTemperature, ComputeError> {
    if !(temperature_c.is_finite() && humidity_pct.is_finite() && wind_value.is_finite()) {
        return Err(ComputeError::NonFinite);
    }

    let humidity = clamp_humidity(humidity_pct);
    let wind_mps = wind_unit.to_mps(wind_value);

    let denominator = MAGNUS_B + temperature_c;
    if denominator == 0.0 {
        return Err(ComputeError::DegenerateTemperature { temperature_c });
    }

    let e = (humidity / 100.0)
        * VAPOUR_PRESSURE_SCALE
        * (MAGNUS_A * temperature_c / denominator).exp();
    let apparent = temperature_c + HUMIDITY_WEIGHT * e - WIND_WEIGHT * wind_mps - OFFSET;

    if !apparent.is_finite() {
        return Err(ComputeError::NonFinite);
    }

    Ok(ApparentTemperature {
        apparent_c: round2(apparent),
        wind_mps,
    })
}

/// Relative humidity limited to 0..=100 %.
pub fn clamp_humidity(humidity_pct: f64) -> f64 {
    humidity_pct.clamp(0.0, 100.0)
}

/// Rounds to two decimal places, ties away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
