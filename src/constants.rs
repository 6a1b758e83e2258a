//! Names and defaults shared by the configuration, the sensor and the bridge.

pub const DOMAIN: &str = "realfeel_temperature";
pub const DEFAULT_NAME: &str = "RealFeel Temperature";

pub const CONF_NAME: &str = "name";
pub const CONF_TEMPERATURE_ENTITY: &str = "temperature_entity";
pub const CONF_HUMIDITY_ENTITY: &str = "humidity_entity";
pub const CONF_WIND_ENTITY: &str = "wind_entity";
pub const CONF_TEMPERATURE_FALLBACK: &str = "temperature_fallback";
pub const CONF_HUMIDITY_FALLBACK: &str = "humidity_fallback";
pub const CONF_WIND_FALLBACK: &str = "wind_fallback";
pub const CONF_WIND_UNIT: &str = "wind_unit";

pub const MANUFACTURER: &str = "Virtual";
pub const MODEL: &str = "RealFeel Temperature";
pub const SOFTWARE_VERSION: &str = "1.1";

pub const DEFAULT_TEMPERATURE: f64 = 25.0;
pub const DEFAULT_HUMIDITY: f64 = 60.0;
pub const DEFAULT_WIND: f64 = 0.5;

/// Accepted range for each fallback, as offered by the configuration form.
pub const TEMPERATURE_FALLBACK_RANGE: (f64, f64) = (-80.0, 80.0);
pub const HUMIDITY_FALLBACK_RANGE: (f64, f64) = (0.0, 100.0);
pub const WIND_FALLBACK_RANGE: (f64, f64) = (0.0, 60.0);

pub const TEMPERATURE_UNIT: &str = "°C";
pub const HUMIDITY_UNIT: &str = "%";

/// Raw states Home Assistant reports for an entity without a usable value.
pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";
