//! Config entry data and the settings the Home Assistant bridge runs with.
//!
//! User input goes through [`RealFeelConfig::from_user_input`], which applies
//! the same rules as the configuration form: defaults for missing keys, empty
//! entity selections dropped, numbers coerced to floats and range checked.

use crate::constants::*;
use crate::error::ConfigError;
use crate::resolver::Fallback;
use crate::wind::WindUnit;
use serde::Deserializer;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Data stored in a config entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealFeelConfig {
    pub name: String,
    #[serde(
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature_entity: Option<String>,
    #[serde(
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub humidity_entity: Option<String>,
    #[serde(
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub wind_entity: Option<String>,
    pub temperature_fallback: f64,
    pub humidity_fallback: f64,
    pub wind_fallback: f64,
    pub wind_unit: WindUnit,
}

impl Default for RealFeelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            temperature_entity: None,
            humidity_entity: None,
            wind_entity: None,
            temperature_fallback: DEFAULT_TEMPERATURE,
            humidity_fallback: DEFAULT_HUMIDITY,
            wind_fallback: DEFAULT_WIND,
            wind_unit: WindUnit::default(),
        }
    }
}

impl RealFeelConfig {
    /// Builds a config from raw form input.
    pub fn from_user_input(input: &Map<String, Value>) -> Result<Self, ConfigError> {
        let name = match input.get(CONF_NAME) {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => DEFAULT_NAME.to_string(),
        };

        let wind_unit = match input.get(CONF_WIND_UNIT) {
            None | Some(Value::Null) => WindUnit::default(),
            Some(Value::String(unit)) => unit.parse()?,
            Some(other) => return Err(ConfigError::UnknownWindUnit(other.to_string())),
        };

        Ok(Self {
            name,
            temperature_entity: entity_selection(input, CONF_TEMPERATURE_ENTITY),
            humidity_entity: entity_selection(input, CONF_HUMIDITY_ENTITY),
            wind_entity: entity_selection(input, CONF_WIND_ENTITY),
            temperature_fallback: number_in_range(
                input,
                CONF_TEMPERATURE_FALLBACK,
                DEFAULT_TEMPERATURE,
                TEMPERATURE_FALLBACK_RANGE,
            )?,
            humidity_fallback: number_in_range(
                input,
                CONF_HUMIDITY_FALLBACK,
                DEFAULT_HUMIDITY,
                HUMIDITY_FALLBACK_RANGE,
            )?,
            wind_fallback: number_in_range(
                input,
                CONF_WIND_FALLBACK,
                DEFAULT_WIND,
                WIND_FALLBACK_RANGE,
            )?,
            wind_unit,
        })
    }

    /// Applies an options update on top of this config. Keys present in
    /// `updates` replace the current values; `null` or `""` clears an entity.
    pub fn merge_user_input(&self, updates: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut merged = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => return Err(ConfigError::NotAnObject),
        };
        for (key, value) in updates {
            merged.insert(key.clone(), value.clone());
        }
        Self::from_user_input(&merged)
    }

    /// Reads a config from a JSON file containing form-style input.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Self::from_user_input(&map),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    /// Reads a config from `REALFEEL_*` environment variables, e.g.
    /// `REALFEEL_TEMPERATURE_ENTITY` or `REALFEEL_WIND_UNIT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut input = Map::new();
        for key in [
            CONF_NAME,
            CONF_TEMPERATURE_ENTITY,
            CONF_HUMIDITY_ENTITY,
            CONF_WIND_ENTITY,
            CONF_TEMPERATURE_FALLBACK,
            CONF_HUMIDITY_FALLBACK,
            CONF_WIND_FALLBACK,
            CONF_WIND_UNIT,
        ] {
            let var = format!("REALFEEL_{}", key.to_ascii_uppercase());
            if let Ok(value) = env::var(&var) {
                input.insert(key.to_string(), Value::String(value));
            }
        }
        Self::from_user_input(&input)
    }

    pub fn temperature_fallback(&self) -> Fallback {
        Fallback::new(self.temperature_fallback, TEMPERATURE_UNIT)
    }

    pub fn humidity_fallback(&self) -> Fallback {
        Fallback::new(self.humidity_fallback, HUMIDITY_UNIT)
    }

    pub fn wind_fallback(&self) -> Fallback {
        Fallback::new(self.wind_fallback, self.wind_unit.as_str())
    }

    /// Bound source entity ids, without duplicates, in
    /// temperature / humidity / wind order.
    pub fn tracked_entities(&self) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        for entity in [
            &self.temperature_entity,
            &self.humidity_entity,
            &self.wind_entity,
        ]
        .into_iter()
        .flatten()
        {
            if !entities.contains(entity) {
                entities.push(entity.clone());
            }
        }
        entities
    }
}

/// A config entry: the data plus the id the host knows it by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub data: RealFeelConfig,
}

impl ConfigEntry {
    pub fn new(entry_id: impl Into<String>, data: RealFeelConfig) -> Self {
        Self {
            entry_id: entry_id.into(),
            data,
        }
    }
}

/// Where the bridge reads its config entry from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Environment,
}

impl ConfigSource {
    /// `REALFEEL_CONFIG` if set, the environment otherwise.
    pub fn from_env() -> Self {
        match env::var("REALFEEL_CONFIG") {
            Ok(path) if !path.is_empty() => ConfigSource::File(PathBuf::from(path)),
            _ => ConfigSource::Environment,
        }
    }

    pub fn load(&self) -> Result<RealFeelConfig, ConfigError> {
        match self {
            ConfigSource::File(path) => RealFeelConfig::load(path),
            ConfigSource::Environment => RealFeelConfig::from_env(),
        }
    }
}

/// Runtime settings for the Home Assistant bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    /// Entity id the derived reading is written to
    pub sensor_entity_id: String,
    /// How often source entities are polled for changes
    pub poll_interval: Duration,
    /// How often the config source is checked for changes
    pub config_check_interval: Duration,
    pub config_source: ConfigSource,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            sensor_entity_id: format!("sensor.{DOMAIN}"),
            poll_interval: Duration::from_millis(1000),
            config_check_interval: Duration::from_secs(30),
            config_source: ConfigSource::Environment,
        }
    }
}

impl BridgeSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sensor_entity_id: env::var("REALFEEL_SENSOR_ENTITY")
                .ok()
                .filter(|id| !id.is_empty())
                .unwrap_or(defaults.sensor_entity_id),
            poll_interval: parse_millis(env::var("REALFEEL_POLL_MS").ok())
                .unwrap_or(defaults.poll_interval),
            config_check_interval: parse_millis(env::var("REALFEEL_CONFIG_CHECK_MS").ok())
                .unwrap_or(defaults.config_check_interval),
            config_source: ConfigSource::from_env(),
        }
    }
}

/// Parses a positive millisecond count, ignoring anything else
fn parse_millis(val: Option<String>) -> Option<Duration> {
    val?.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn entity_selection(input: &Map<String, Value>, key: &str) -> Option<String> {
    match input.get(key) {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
        _ => None,
    }
}

fn number_in_range(
    input: &Map<String, Value>,
    key: &str,
    default: f64,
    range: (f64, f64),
) -> Result<f64, ConfigError> {
    let value = match input.get(key) {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| ConfigError::not_a_number(key, number))?,
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::not_a_number(key, text))?,
        Some(other) => return Err(ConfigError::not_a_number(key, other)),
    };

    if !(range.0..=range.1).contains(&value) {
        return Err(ConfigError::out_of_range(key, value, range));
    }
    Ok(value)
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.filter(|id| !id.trim().is_empty()))
}
