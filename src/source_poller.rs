use crate::home_assistant::HomeAssistantAPI;
use crate::host::StateChangeEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Last raw state seen for each source entity, shared between the pollers
/// and the synchronous state lookups of the bridge host.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    states: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl StateSnapshot {
    pub fn get(&self, entity_id: &str) -> Option<String> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(entity_id).cloned().flatten())
    }

    /// Stores a state. Returns whether it differs from the previous one.
    pub fn update(&self, entity_id: &str, state: Option<String>) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return false;
        };
        match states.get(entity_id) {
            Some(previous) if *previous == state => false,
            _ => {
                states.insert(entity_id.to_string(), state);
                true
            }
        }
    }

    /// Fetches the current state of every entity once.
    pub async fn prime(&self, ha_client: &HomeAssistantAPI, entity_ids: &[String]) {
        for entity_id in entity_ids {
            let state = match read_state_with_retry(ha_client, entity_id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!("Could not read {entity_id}: {e}");
                    None
                }
            };
            self.update(entity_id, state);
        }
    }
}

/// A change seen by one poller, tagged with the subscription it serves.
#[derive(Debug, Clone, PartialEq)]
pub struct PolledChange {
    pub subscription_id: u64,
    pub event: StateChangeEvent,
}

/// Polls a set of source entities and emits a [`PolledChange`] whenever
/// one of their raw states changes.
pub struct SourcePoller {
    subscription_id: u64,
    entity_ids: Vec<String>,
    ha_client: HomeAssistantAPI,
    snapshot: StateSnapshot,
    event_sender: Sender<PolledChange>,
    poll_interval: Duration,
}

impl SourcePoller {
    pub fn new(
        subscription_id: u64,
        entity_ids: Vec<String>,
        ha_client: HomeAssistantAPI,
        snapshot: StateSnapshot,
        event_sender: Sender<PolledChange>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            subscription_id,
            entity_ids,
            ha_client,
            snapshot,
            event_sender,
            poll_interval,
        }
    }

    /// Spawns the poller on its own task. Aborting the handle stops it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!("Polling {:?} every {:?}", self.entity_ids, self.poll_interval);

        let mut read_interval = interval(self.poll_interval);
        read_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            read_interval.tick().await;

            for entity_id in &self.entity_ids {
                let state = match read_state_with_retry(&self.ha_client, entity_id).await {
                    Ok(state) => state,
                    Err(e) => {
                        // Keep the last known state until Home Assistant answers again
                        warn!("Home Assistant read error: {e}");
                        continue;
                    }
                };

                if !self.snapshot.update(entity_id, state.clone()) {
                    continue;
                }
                debug!("{entity_id} changed to {state:?}");
                let change = PolledChange {
                    subscription_id: self.subscription_id,
                    event: StateChangeEvent {
                        entity_id: entity_id.clone(),
                        new_state: state,
                    },
                };
                if self.event_sender.send(change).await.is_err() {
                    info!("Sensor stopped listening, poller exiting");
                    return;
                }
            }
        }
    }
}

/// Reads one entity's raw state with automatic retry
async fn read_state_with_retry(
    ha_client: &HomeAssistantAPI,
    entity_id: &str,
) -> Result<Option<String>, String> {
    const MAX_RETRIES: u32 = 3;

    let mut last_error = String::new();
    for attempt in 1..=MAX_RETRIES {
        match ha_client.read_sensor_value(entity_id).await {
            Ok(sensor) => return Ok(sensor.map(|sensor| sensor.state)),
            Err(e) => {
                last_error = e.to_string();
                if attempt < MAX_RETRIES {
                    debug!("Read of {entity_id} failed (attempt {attempt}): {e}. Retrying...");
                    sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
    }

    Err(format!(
        "All {MAX_RETRIES} attempts to read {entity_id} failed. Last error: {last_error}"
    ))
}
