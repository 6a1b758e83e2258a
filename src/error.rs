//! Error types for source resolution, the apparent-temperature calculation and
//! configuration handling.
//!
//! Resolution errors never leave the crate: the resolver substitutes the
//! fallback and only logs them. Calculation errors suppress a publish.
//! Configuration errors are returned to whoever supplied the input.

use thiserror::Error;

/// Why a bound source could not supply a live value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// The entity has no state, or reports `unknown` / `unavailable`
    #[error("source {entity_id} is unavailable")]
    SourceUnavailable { entity_id: String },

    /// The entity state is not a finite number
    #[error("source {entity_id} reported non-numeric state '{raw}'")]
    SourceUnparseable { entity_id: String, raw: String },
}

/// Inputs for which the apparent-temperature formula is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ComputeError {
    /// `237.7 + T` is zero, so the vapour pressure exponent divides by zero
    #[error("vapour pressure is undefined at {temperature_c} °C")]
    DegenerateTemperature { temperature_c: f64 },

    /// An input or the result is NaN or infinite
    #[error("apparent temperature is not finite")]
    NonFinite,
}

/// Invalid configuration input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a number, got {value}")]
    NotANumber { field: String, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown wind unit '{0}', expected one of m/s, km/h, knots")]
    UnknownWindUnit(String),

    #[error("configuration must be a JSON object")]
    NotAnObject,

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn not_a_number(field: &str, value: impl ToString) -> Self {
        ConfigError::NotANumber {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn out_of_range(field: &str, value: f64, (min, max): (f64, f64)) -> Self {
        ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        }
    }
}
