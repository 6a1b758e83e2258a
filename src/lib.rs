//! RealFeel Temperature
//!
//! A derived "feels like" temperature sensor for Home Assistant. The apparent
//! temperature is computed from up to three source sensors (temperature,
//! humidity, wind speed), each replaced by a configured fallback whenever it
//! is not bound or has no usable value.
//!
//! The sensor core talks to its host through the [`host::Host`] trait. The
//! bridge modules implement that trait on top of the Home Assistant REST API
//! so the sensor can run as a standalone service.

pub mod apparent_temperature;
pub mod bridge_coordinator;
pub mod config;
pub mod constants;
pub mod error;
pub mod home_assistant;
pub mod host;
pub mod resolver;
pub mod sensor;
pub mod source_poller;
pub mod wind;

// Re-export commonly used types for easier access
pub use apparent_temperature::{compute, ApparentTemperature};
pub use bridge_coordinator::BridgeCoordinator;
pub use config::{BridgeSettings, ConfigEntry, RealFeelConfig};
pub use host::{Host, StateChangeEvent, Subscription};
pub use resolver::{resolve, Fallback, ResolvedQuantity};
pub use sensor::{DerivedReading, RealFeelSensor, SensorAttributes};
pub use wind::WindUnit;
