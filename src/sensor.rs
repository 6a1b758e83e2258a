//! The derived apparent-temperature sensor.
//!
//! The sensor caches one [`ResolvedQuantity`] per input and the last reading
//! it published. On activation it resolves all three inputs from the host's
//! current states and subscribes to the bound sources; afterwards every
//! change notification re-resolves just the affected input and republishes
//! only if something visible changed.

use crate::apparent_temperature;
use crate::config::ConfigEntry;
use crate::constants::{DOMAIN, MANUFACTURER, MODEL, SOFTWARE_VERSION};
use crate::host::{Host, StateChangeEvent, Subscription};
use crate::resolver::{resolve, ResolvedQuantity};
use crate::wind::WindUnit;
use serde_derive::Serialize;
use tracing::{debug, info, warn};

/// Provenance attributes exposed next to the sensor state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAttributes {
    pub temperature_source: String,
    pub humidity_source: String,
    pub wind_source: String,
    pub wind_unit: WindUnit,
}

/// Observable state of the sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedReading {
    /// Apparent temperature in °C, two decimals
    pub state: f64,
    pub attributes: SensorAttributes,
}

/// The virtual device the sensor is registered under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub sw_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Temperature,
    Humidity,
    Wind,
}

impl Quantity {
    const ALL: [Quantity; 3] = [Quantity::Temperature, Quantity::Humidity, Quantity::Wind];
}

#[derive(Debug)]
enum Lifecycle {
    Idle,
    Tracking { subscriptions: Vec<Subscription> },
}

pub struct RealFeelSensor {
    entry: ConfigEntry,
    lifecycle: Lifecycle,
    temperature: ResolvedQuantity,
    humidity: ResolvedQuantity,
    wind: ResolvedQuantity,
    reading: Option<DerivedReading>,
}

impl RealFeelSensor {
    pub fn new(entry: ConfigEntry) -> Self {
        let data = &entry.data;
        Self {
            temperature: ResolvedQuantity::from_fallback(&data.temperature_fallback()),
            humidity: ResolvedQuantity::from_fallback(&data.humidity_fallback()),
            wind: ResolvedQuantity::from_fallback(&data.wind_fallback()),
            lifecycle: Lifecycle::Idle,
            reading: None,
            entry,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.entry.entry_id
    }

    pub fn name(&self) -> &str {
        &self.entry.data.name
    }

    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.entry.entry_id.clone())],
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            name: self.entry.data.name.clone(),
            sw_version: SOFTWARE_VERSION.to_string(),
        }
    }

    /// Last published reading.
    pub fn reading(&self) -> Option<&DerivedReading> {
        self.reading.as_ref()
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Tracking { .. })
    }

    /// Resolves every input from current host state, publishes, and starts
    /// tracking the bound sources.
    pub fn activate(&mut self, host: &mut impl Host) {
        if self.is_tracking() {
            self.deactivate();
        }

        self.refresh_all(&*host);
        self.publish(host);

        let entity_ids = self.entry.data.tracked_entities();
        let mut subscriptions = Vec::new();
        if !entity_ids.is_empty() {
            subscriptions.push(host.track_state_changes(&entity_ids));
        }
        info!(
            "{} active, tracking {:?}",
            self.entry.data.name, entity_ids
        );
        self.lifecycle = Lifecycle::Tracking { subscriptions };
    }

    /// Handles a change notification. Returns whether a new reading was
    /// published.
    pub fn handle_state_change(&mut self, host: &mut impl Host, event: &StateChangeEvent) -> bool {
        if !self.is_tracking() {
            debug!("Ignoring {} change while inactive", event.entity_id);
            return false;
        }

        let mut changed = false;
        for quantity in Quantity::ALL {
            if self.binding(quantity) != Some(event.entity_id.as_str()) {
                continue;
            }

            let state = event
                .new_state
                .clone()
                .or_else(|| host.state(&event.entity_id));
            let resolved = self.resolve_quantity(quantity, state.as_deref());
            let cached = self.cached_mut(quantity);
            if *cached == resolved {
                continue;
            }
            debug!(
                "{:?} changed: {} ({}) -> {} ({})",
                quantity, cached.value, cached.source, resolved.value, resolved.source
            );
            *cached = resolved;
            changed = true;
        }

        changed && self.publish(host)
    }

    /// Releases all subscriptions. No publishes happen until the next
    /// activation.
    pub fn deactivate(&mut self) {
        if let Lifecycle::Tracking { subscriptions } =
            std::mem::replace(&mut self.lifecycle, Lifecycle::Idle)
        {
            for subscription in subscriptions {
                subscription.cancel();
            }
            info!("{} deactivated", self.entry.data.name);
        }
    }

    /// Swaps in a changed config entry and activates again.
    pub fn reload(&mut self, host: &mut impl Host, entry: ConfigEntry) {
        self.deactivate();
        *self = Self::new(entry);
        self.activate(host);
    }

    fn refresh_all(&mut self, host: &impl Host) {
        for quantity in Quantity::ALL {
            let state = self.binding(quantity).and_then(|id| host.state(id));
            let resolved = self.resolve_quantity(quantity, state.as_deref());
            *self.cached_mut(quantity) = resolved;
        }
    }

    /// Computes from the cached inputs and writes the reading if it differs
    /// from the last one.
    fn publish(&mut self, host: &mut impl Host) -> bool {
        let wind_unit = self.entry.data.wind_unit;
        let result = match apparent_temperature::compute(
            self.temperature.value,
            self.humidity.value,
            self.wind.value,
            wind_unit,
        ) {
            Ok(result) => result,
            Err(e) => {
                warn!("{}: not publishing, {}", self.entry.data.name, e);
                return false;
            }
        };

        let reading = DerivedReading {
            state: result.apparent_c,
            attributes: SensorAttributes {
                temperature_source: self.temperature.source.clone(),
                humidity_source: self.humidity.source.clone(),
                wind_source: self.wind.source.clone(),
                wind_unit,
            },
        };
        if self.reading.as_ref() == Some(&reading) {
            return false;
        }

        debug!(
            "{}: {} °C (wind {:.2} m/s)",
            self.entry.data.name, reading.state, result.wind_mps
        );
        host.write_state(&reading);
        self.reading = Some(reading);
        true
    }

    fn binding(&self, quantity: Quantity) -> Option<&str> {
        let data = &self.entry.data;
        match quantity {
            Quantity::Temperature => data.temperature_entity.as_deref(),
            Quantity::Humidity => data.humidity_entity.as_deref(),
            Quantity::Wind => data.wind_entity.as_deref(),
        }
    }

    fn resolve_quantity(&self, quantity: Quantity, state: Option<&str>) -> ResolvedQuantity {
        let data = &self.entry.data;
        let fallback = match quantity {
            Quantity::Temperature => data.temperature_fallback(),
            Quantity::Humidity => data.humidity_fallback(),
            Quantity::Wind => data.wind_fallback(),
        };
        resolve(self.binding(quantity), &fallback, state)
    }

    fn cached_mut(&mut self, quantity: Quantity) -> &mut ResolvedQuantity {
        match quantity {
            Quantity::Temperature => &mut self.temperature,
            Quantity::Humidity => &mut self.humidity,
            Quantity::Wind => &mut self.wind,
        }
    }
}

impl Drop for RealFeelSensor {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealFeelConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct MockHost {
        states: HashMap<String, String>,
        published: Vec<DerivedReading>,
        subscribed: Vec<Vec<String>>,
        released: Arc<AtomicU32>,
    }

    impl MockHost {
        fn with_states(states: &[(&str, &str)]) -> Self {
            Self {
                states: states
                    .iter()
                    .map(|(id, state)| (id.to_string(), state.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        fn released(&self) -> u32 {
            self.released.load(Ordering::Relaxed)
        }

        fn last(&self) -> &DerivedReading {
            self.published.last().expect("nothing published")
        }
    }

    impl Host for MockHost {
        fn state(&self, entity_id: &str) -> Option<String> {
            self.states.get(entity_id).cloned()
        }

        fn track_state_changes(&mut self, entity_ids: &[String]) -> Subscription {
            self.subscribed.push(entity_ids.to_vec());
            let released = Arc::clone(&self.released);
            Subscription::new(move || {
                released.fetch_add(1, Ordering::Relaxed);
            })
        }

        fn write_state(&mut self, reading: &DerivedReading) {
            self.published.push(reading.clone());
        }
    }

    fn bound_entry(wind_unit: WindUnit) -> ConfigEntry {
        ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                name: "Garden".to_string(),
                temperature_entity: Some("sensor.temperature".to_string()),
                humidity_entity: Some("sensor.humidity".to_string()),
                wind_entity: Some("sensor.wind".to_string()),
                wind_unit,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_activation_without_sources_publishes_fallbacks() {
        let mut host = MockHost::default();
        let mut sensor = RealFeelSensor::new(ConfigEntry::new("entry-1", RealFeelConfig::default()));

        sensor.activate(&mut host);

        assert!(sensor.is_tracking());
        assert!(host.subscribed.is_empty());
        assert_eq!(host.published.len(), 1);
        let reading = host.last();
        assert_eq!(reading.state, 26.9);
        assert_eq!(reading.attributes.temperature_source, "fallback: 25.00 °C");
        assert_eq!(reading.attributes.humidity_source, "fallback: 60.00 %");
        assert_eq!(reading.attributes.wind_source, "fallback: 0.50 m/s");
        assert_eq!(reading.attributes.wind_unit, WindUnit::MetersPerSecond);
    }

    #[test]
    fn test_activation_with_live_sources() {
        let mut host = MockHost::with_states(&[
            ("sensor.temperature", "20"),
            ("sensor.humidity", "50"),
            ("sensor.wind", "36"),
        ]);
        let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::KilometersPerHour));

        sensor.activate(&mut host);

        assert_eq!(
            host.subscribed,
            vec![vec!["sensor.temperature", "sensor.humidity", "sensor.wind"]]
        );
        let reading = host.last();
        assert_eq!(reading.state, 12.85);
        assert_eq!(reading.attributes.temperature_source, "sensor.temperature");
        assert_eq!(reading.attributes.humidity_source, "sensor.humidity");
        assert_eq!(reading.attributes.wind_source, "sensor.wind");
        assert_eq!(reading.attributes.wind_unit, WindUnit::KilometersPerHour);
        assert_eq!(sensor.reading(), Some(reading));
    }

    #[test]
    fn test_change_notification_republishes() {
        let mut host = MockHost::with_states(&[
            ("sensor.temperature", "20"),
            ("sensor.humidity", "50"),
            ("sensor.wind", "10"),
        ]);
        let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::MetersPerSecond));
        sensor.activate(&mut host);
        assert_eq!(host.published.len(), 1);
        assert_eq!(host.last().state, 12.85);

        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.wind", Some("0.5")),
        );

        assert!(published);
        assert_eq!(host.published.len(), 2);
        assert_eq!(host.last().state, 19.5);
    }

    #[test]
    fn test_unchanged_notification_does_not_publish() {
        let mut host = MockHost::with_states(&[
            ("sensor.temperature", "20"),
            ("sensor.humidity", "50"),
            ("sensor.wind", "10"),
        ]);
        let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::MetersPerSecond));
        sensor.activate(&mut host);

        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.temperature", Some("20.0")),
        );

        assert!(!published);
        assert_eq!(host.published.len(), 1);
    }

    #[test]
    fn test_same_rounded_reading_is_not_rewritten() {
        let mut host = MockHost::with_states(&[("sensor.temperature", "20.001")]);
        let entry = ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                temperature_entity: Some("sensor.temperature".to_string()),
                ..Default::default()
            },
        );
        let mut sensor = RealFeelSensor::new(entry);
        sensor.activate(&mut host);

        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.temperature", Some("20.002")),
        );

        assert!(!published);
        assert_eq!(host.published.len(), 1);
    }

    #[test]
    fn test_provenance_change_alone_publishes() {
        let mut host = MockHost::with_states(&[("sensor.temperature", "25")]);
        let entry = ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                temperature_entity: Some("sensor.temperature".to_string()),
                ..Default::default()
            },
        );
        let mut sensor = RealFeelSensor::new(entry);
        sensor.activate(&mut host);
        assert_eq!(host.last().attributes.temperature_source, "sensor.temperature");

        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.temperature", Some("unavailable")),
        );

        assert!(published);
        assert_eq!(host.published.len(), 2);
        assert_eq!(host.published[0].state, host.published[1].state);
        assert_eq!(host.last().attributes.temperature_source, "fallback: 25.00 °C");
    }

    #[test]
    fn test_removed_entity_falls_back_to_lookup() {
        let mut host = MockHost::with_states(&[("sensor.humidity", "40")]);
        let entry = ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                humidity_entity: Some("sensor.humidity".to_string()),
                ..Default::default()
            },
        );
        let mut sensor = RealFeelSensor::new(entry);
        sensor.activate(&mut host);

        host.states.clear();
        let published =
            sensor.handle_state_change(&mut host, &StateChangeEvent::new("sensor.humidity", None));

        assert!(published);
        assert_eq!(host.last().attributes.humidity_source, "fallback: 60.00 %");
    }

    #[test]
    fn test_untracked_entity_is_ignored() {
        let mut host = MockHost::default();
        let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::MetersPerSecond));
        sensor.activate(&mut host);
        let before = host.published.len();

        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.kitchen", Some("30")),
        );

        assert!(!published);
        assert_eq!(host.published.len(), before);
    }

    #[test]
    fn test_shared_entity_updates_every_bound_input() {
        let mut host = MockHost::with_states(&[("sensor.weather", "20")]);
        let entry = ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                temperature_entity: Some("sensor.weather".to_string()),
                humidity_entity: Some("sensor.weather".to_string()),
                ..Default::default()
            },
        );
        let mut sensor = RealFeelSensor::new(entry);
        sensor.activate(&mut host);
        assert_eq!(host.subscribed, vec![vec!["sensor.weather"]]);

        sensor.handle_state_change(&mut host, &StateChangeEvent::new("sensor.weather", Some("30")));

        let attributes = &host.last().attributes;
        assert_eq!(attributes.temperature_source, "sensor.weather");
        assert_eq!(attributes.humidity_source, "sensor.weather");
        let expected = apparent_temperature::compute(30.0, 30.0, 0.5, WindUnit::MetersPerSecond)
            .unwrap()
            .apparent_c;
        assert_eq!(host.last().state, expected);
    }

    #[test]
    fn test_deactivation_releases_and_silences() {
        let mut host = MockHost::default();
        let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::MetersPerSecond));
        sensor.activate(&mut host);
        let before = host.published.len();

        sensor.deactivate();

        assert!(!sensor.is_tracking());
        assert_eq!(host.released(), 1);
        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.temperature", Some("35")),
        );
        assert!(!published);
        assert_eq!(host.published.len(), before);

        sensor.deactivate();
        assert_eq!(host.released(), 1);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let mut host = MockHost::default();
        {
            let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::MetersPerSecond));
            sensor.activate(&mut host);
        }
        assert_eq!(host.released(), 1);
    }

    #[test]
    fn test_reload_resubscribes_with_new_config() {
        let mut host = MockHost::with_states(&[("sensor.outdoor", "10")]);
        let mut sensor = RealFeelSensor::new(bound_entry(WindUnit::MetersPerSecond));
        sensor.activate(&mut host);

        let entry = ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                name: "Outdoor".to_string(),
                temperature_entity: Some("sensor.outdoor".to_string()),
                ..Default::default()
            },
        );
        sensor.reload(&mut host, entry);

        assert!(sensor.is_tracking());
        assert_eq!(sensor.name(), "Outdoor");
        assert_eq!(host.released(), 1);
        assert_eq!(host.subscribed.len(), 2);
        assert_eq!(host.subscribed[1], vec!["sensor.outdoor"]);
        assert_eq!(host.last().attributes.temperature_source, "sensor.outdoor");
    }

    #[test]
    fn test_degenerate_temperature_is_not_published() {
        let mut host = MockHost::with_states(&[("sensor.temperature", "-237.7")]);
        let entry = ConfigEntry::new(
            "entry-1",
            RealFeelConfig {
                temperature_entity: Some("sensor.temperature".to_string()),
                ..Default::default()
            },
        );
        let mut sensor = RealFeelSensor::new(entry);

        sensor.activate(&mut host);

        assert!(sensor.is_tracking());
        assert!(host.published.is_empty());
        assert_eq!(sensor.reading(), None);

        let published = sensor.handle_state_change(
            &mut host,
            &StateChangeEvent::new("sensor.temperature", Some("21")),
        );
        assert!(published);
        assert_eq!(host.published.len(), 1);
    }

    #[test]
    fn test_device_info() {
        let sensor = RealFeelSensor::new(bound_entry(WindUnit::Knots));
        let device = sensor.device_info();
        assert_eq!(sensor.unique_id(), "entry-1");
        assert_eq!(
            device.identifiers,
            vec![("realfeel_temperature".to_string(), "entry-1".to_string())]
        );
        assert_eq!(device.manufacturer, "Virtual");
        assert_eq!(device.model, "RealFeel Temperature");
        assert_eq!(device.name, "Garden");
        assert_eq!(device.sw_version, "1.1");
    }
}
