use crate::error::ConfigError;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KMH_PER_MPS: f64 = 3.6;
const MPS_PER_KNOT: f64 = 0.514444;

/// Unit a wind speed source (or the wind fallback) is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindUnit {
    #[default]
    #[serde(rename = "m/s")]
    MetersPerSecond,
    #[serde(rename = "km/h")]
    KilometersPerHour,
    #[serde(rename = "knots")]
    Knots,
}

impl WindUnit {
    pub const ALL: [WindUnit; 3] = [
        WindUnit::MetersPerSecond,
        WindUnit::KilometersPerHour,
        WindUnit::Knots,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindUnit::MetersPerSecond => "m/s",
            WindUnit::KilometersPerHour => "km/h",
            WindUnit::Knots => "knots",
        }
    }

    /// Converts a speed in this unit to meters per second.
    pub fn to_mps(&self, value: f64) -> f64 {
        match self {
            WindUnit::MetersPerSecond => value,
            WindUnit::KilometersPerHour => value / KMH_PER_MPS,
            WindUnit::Knots => value * MPS_PER_KNOT,
        }
    }
}

impl fmt::Display for WindUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WindUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownWindUnit(s.to_string()))
    }
}
