//! The capabilities the sensor needs from the home-automation host.
//!
//! The sensor never reaches for global state: everything it reads or writes
//! goes through a [`Host`] passed into each call, so tests can hand it an
//! in-memory implementation and the bridge can hand it a REST-backed one.

use crate::sensor::DerivedReading;
use std::fmt;

/// A state change of one source entity, as delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeEvent {
    pub entity_id: String,
    /// Raw state after the change, `None` if the entity was removed
    pub new_state: Option<String>,
}

impl StateChangeEvent {
    pub fn new(entity_id: impl Into<String>, new_state: Option<&str>) -> Self {
        Self {
            entity_id: entity_id.into(),
            new_state: new_state.map(str::to_string),
        }
    }
}

pub trait Host {
    /// Current raw state of an entity, `None` if it does not exist.
    fn state(&self, entity_id: &str) -> Option<String>;

    /// Starts delivering [`StateChangeEvent`]s for the given entities to the
    /// sensor. Delivery stops when the returned handle is cancelled or
    /// dropped.
    fn track_state_changes(&mut self, entity_ids: &[String]) -> Subscription;

    /// Sets the derived entity's state and attributes.
    fn write_state(&mut self, reading: &DerivedReading);
}

/// Handle to an active subscription. Releasing it is guaranteed: either
/// through [`Subscription::cancel`] or when the handle is dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
