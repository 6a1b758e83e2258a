use crate::config::{BridgeSettings, ConfigEntry, RealFeelConfig};
use crate::home_assistant::{HAStateUpdate, HomeAssistantAPI};
use crate::host::{Host, Subscription};
use crate::sensor::{DerivedReading, RealFeelSensor};
use crate::source_poller::{PolledChange, SourcePoller, StateSnapshot};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// [`Host`] backed by the Home Assistant REST API.
///
/// Lookups are served from the shared [`StateSnapshot`], subscriptions are
/// poller tasks feeding the coordinator's event channel, and writes replace
/// the reading waiting for the [`StateWriter`].
pub struct RestHost {
    ha_client: HomeAssistantAPI,
    snapshot: StateSnapshot,
    event_sender: Sender<PolledChange>,
    reading_sender: watch::Sender<Option<DerivedReading>>,
    poll_interval: Duration,
    next_subscription_id: u64,
    live_subscriptions: Arc<Mutex<HashSet<u64>>>,
}

impl RestHost {
    pub fn new(
        ha_client: HomeAssistantAPI,
        snapshot: StateSnapshot,
        event_sender: Sender<PolledChange>,
        reading_sender: watch::Sender<Option<DerivedReading>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ha_client,
            snapshot,
            event_sender,
            reading_sender,
            poll_interval,
            next_subscription_id: 0,
            live_subscriptions: Arc::default(),
        }
    }

    /// Whether `change` comes from a subscription that has not been released.
    /// Changes queued by a cancelled poller are stale.
    pub fn accepts(&self, change: &PolledChange) -> bool {
        self.live_subscriptions
            .lock()
            .map(|live| live.contains(&change.subscription_id))
            .unwrap_or(false)
    }
}

impl Host for RestHost {
    fn state(&self, entity_id: &str) -> Option<String> {
        self.snapshot.get(entity_id)
    }

    fn track_state_changes(&mut self, entity_ids: &[String]) -> Subscription {
        let subscription_id = self.next_subscription_id;
        self.next_subscription_id += 1;
        if let Ok(mut live) = self.live_subscriptions.lock() {
            live.insert(subscription_id);
        }

        let handle = SourcePoller::new(
            subscription_id,
            entity_ids.to_vec(),
            self.ha_client.clone(),
            self.snapshot.clone(),
            self.event_sender.clone(),
            self.poll_interval,
        )
        .spawn();
        let live_subscriptions = Arc::clone(&self.live_subscriptions);
        Subscription::new(move || {
            handle.abort();
            if let Ok(mut live) = live_subscriptions.lock() {
                live.remove(&subscription_id);
            }
        })
    }

    fn write_state(&mut self, reading: &DerivedReading) {
        self.reading_sender.send_replace(Some(reading.clone()));
    }
}

/// Hands a polled change to the sensor unless its subscription was released.
/// Returns whether a new reading was published.
pub fn dispatch(sensor: &mut RealFeelSensor, host: &mut RestHost, change: &PolledChange) -> bool {
    if !host.accepts(change) {
        debug!(
            "Dropping {} change from released subscription {}",
            change.event.entity_id, change.subscription_id
        );
        return false;
    }
    sensor.handle_state_change(host, &change.event)
}

/// Writes published readings back to Home Assistant as the sensor entity.
///
/// Only the latest reading matters: a reading that could not be written is
/// retried every `retry_interval` until it succeeds or a newer one replaces it.
pub struct StateWriter {
    ha_client: HomeAssistantAPI,
    sensor_entity_id: String,
    friendly_name: Arc<RwLock<String>>,
    retry_interval: Duration,
}

impl StateWriter {
    pub fn new(
        ha_client: HomeAssistantAPI,
        sensor_entity_id: String,
        friendly_name: Arc<RwLock<String>>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            ha_client,
            sensor_entity_id,
            friendly_name,
            retry_interval,
        }
    }

    pub fn spawn(self, readings: watch::Receiver<Option<DerivedReading>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(readings).await;
        })
    }

    async fn run(&self, mut readings: watch::Receiver<Option<DerivedReading>>) {
        info!("Starting state writer for {}", self.sensor_entity_id);

        let mut retry = interval(self.retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: Option<DerivedReading> = None;

        loop {
            tokio::select! {
                changed = readings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    pending = readings.borrow_and_update().clone();
                }
                _ = retry.tick(), if pending.is_some() => {}
            }

            let Some(reading) = pending.take() else {
                continue;
            };
            match self.write_with_retry(&reading).await {
                Ok(()) => info!(
                    "{} = {} °C (temperature: {}, humidity: {}, wind: {})",
                    self.sensor_entity_id,
                    reading.state,
                    reading.attributes.temperature_source,
                    reading.attributes.humidity_source,
                    reading.attributes.wind_source
                ),
                Err(e) => {
                    error!("{e}. Retrying in {:?}", self.retry_interval);
                    pending = Some(reading);
                    retry.reset();
                }
            }
        }

        info!("State writer exiting");
    }

    /// Writes one reading with automatic retry
    async fn write_with_retry(&self, reading: &DerivedReading) -> Result<(), String> {
        const MAX_RETRIES: u32 = 3;

        let friendly_name = self
            .friendly_name
            .read()
            .map(|name| name.clone())
            .unwrap_or_default();
        let update = HAStateUpdate::from_reading(reading, &friendly_name);

        let mut last_error = String::new();
        for attempt in 1..=MAX_RETRIES {
            match self
                .ha_client
                .write_sensor_state(&self.sensor_entity_id, &update)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < MAX_RETRIES {
                        debug!(
                            "Write of {} failed (attempt {attempt}): {e}. Retrying...",
                            self.sensor_entity_id
                        );
                        sleep(Duration::from_millis(200 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(format!(
            "All {MAX_RETRIES} attempts to write {} failed. Last error: {last_error}",
            self.sensor_entity_id
        ))
    }
}

/// Runs one [`RealFeelSensor`] against Home Assistant.
///
/// Owns the sensor and handles one change event at a time; source pollers and
/// the state writer run on their own tasks and talk to it over channels. The
/// config source is re-read periodically and a changed config reloads the
/// sensor.
pub struct BridgeCoordinator {
    settings: BridgeSettings,
    ha_client: HomeAssistantAPI,
}

impl BridgeCoordinator {
    pub fn new(settings: BridgeSettings, ha_client: HomeAssistantAPI) -> Self {
        Self {
            settings,
            ha_client,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        if !self.ha_client.is_configured() {
            anyhow::bail!("HA_URL is not set");
        }
        let config = self.settings.config_source.load()?;
        info!("Starting {} as {}", config.name, self.settings.sensor_entity_id);

        let (event_tx, mut event_rx) = mpsc::channel::<PolledChange>(32);
        let (reading_tx, reading_rx) = watch::channel::<Option<DerivedReading>>(None);

        let friendly_name = Arc::new(RwLock::new(config.name.clone()));
        StateWriter::new(
            self.ha_client.clone(),
            self.settings.sensor_entity_id.clone(),
            Arc::clone(&friendly_name),
            self.settings.poll_interval,
        )
        .spawn(reading_rx);

        let snapshot = StateSnapshot::default();
        snapshot
            .prime(&self.ha_client, &config.tracked_entities())
            .await;

        let mut host = RestHost::new(
            self.ha_client.clone(),
            snapshot.clone(),
            event_tx,
            reading_tx,
            self.settings.poll_interval,
        );
        let mut sensor = RealFeelSensor::new(ConfigEntry::new(
            self.settings.sensor_entity_id.clone(),
            config,
        ));
        sensor.activate(&mut host);

        let mut config_check = interval(self.settings.config_check_interval);
        config_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        config_check.tick().await;

        loop {
            tokio::select! {
                Some(change) = event_rx.recv() => {
                    dispatch(&mut sensor, &mut host, &change);
                }
                _ = config_check.tick() => {
                    let Some(config) = self.changed_config(&sensor.entry().data) else {
                        continue;
                    };
                    info!("Configuration changed, reloading {}", config.name);
                    sensor.deactivate();
                    snapshot
                        .prime(&self.ha_client, &config.tracked_entities())
                        .await;
                    if let Ok(mut name) = friendly_name.write() {
                        *name = config.name.clone();
                    }
                    let entry = ConfigEntry::new(sensor.unique_id().to_string(), config);
                    sensor.reload(&mut host, entry);
                }
            }
        }
    }

    fn changed_config(&self, current: &RealFeelConfig) -> Option<RealFeelConfig> {
        match self.settings.config_source.load() {
            Ok(config) if config != *current => Some(config),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring configuration update: {e}");
                None
            }
        }
    }
}
