use crate::constants::TEMPERATURE_UNIT;
use crate::sensor::DerivedReading;
use reqwest::StatusCode;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;

#[derive(Clone)]
pub struct HomeAssistantAPI {
    endpoint_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl Default for HomeAssistantAPI {
    fn default() -> Self {
        Self::new()
    }
}

impl HomeAssistantAPI {
    /// Connection details from `HA_URL` and `HA_TOKEN`.
    pub fn new() -> Self {
        Self::with_endpoint(
            env::var("HA_URL").unwrap_or_default(),
            env::var("HA_TOKEN").unwrap_or_default(),
        )
    }

    pub fn with_endpoint(endpoint_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint_url.is_empty()
    }

    /// Reads an entity's state. `Ok(None)` means Home Assistant does not know
    /// the entity.
    pub async fn read_sensor_value(
        &self,
        sensor_path: &str,
    ) -> Result<Option<HASensor>, anyhow::Error> {
        if !self.is_configured() {
            anyhow::bail!("No HA connection");
        }
        let response = self
            .client
            .get(format!("{}/api/states/{}", self.endpoint_url, sensor_path))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let sensor = response.error_for_status()?.json().await?;
        Ok(Some(sensor))
    }

    /// Creates or updates an entity's state.
    pub async fn write_sensor_state(
        &self,
        sensor_path: &str,
        update: &HAStateUpdate,
    ) -> Result<(), anyhow::Error> {
        if !self.is_configured() {
            anyhow::bail!("No HA connection");
        }
        self.client
            .post(format!("{}/api/states/{}", self.endpoint_url, sensor_path))
            .bearer_auth(&self.auth_token)
            .json(update)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HASensor {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub last_changed: String,
    #[serde(default)]
    pub last_reported: String,
    #[serde(default)]
    pub last_updated: String,
}

/// Body of a state write: the state plus its attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HAStateUpdate {
    pub state: String,
    pub attributes: Map<String, Value>,
}

impl HAStateUpdate {
    /// The provenance attributes of `reading`, plus what Home Assistant needs
    /// to display it as a temperature sensor.
    pub fn from_reading(reading: &DerivedReading, friendly_name: &str) -> Self {
        let mut attributes = match serde_json::to_value(&reading.attributes) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        attributes.insert("unit_of_measurement".into(), TEMPERATURE_UNIT.into());
        attributes.insert("device_class".into(), "temperature".into());
        attributes.insert("state_class".into(), "measurement".into());
        attributes.insert("friendly_name".into(), friendly_name.into());

        Self {
            state: format_state(reading.state),
            attributes,
        }
    }
}

fn format_state(state: f64) -> String {
    // Rounding a small negative value leaves -0.0
    if state == 0.0 {
        return "0".to_string();
    }
    state.to_string()
}
