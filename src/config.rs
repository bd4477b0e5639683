//! Runtime configuration.
//!
//! Defaults are defined in code and can be overlaid by an optional
//! `updraft.toml` file and `UPDRAFT__*` environment variables, in that
//! order. `UPDRAFT__TICK_INTERVAL_MS=500` overrides `tick_interval_ms`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{UpdraftError, UpdraftResult};
use crate::receiver::ReceiverSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdraftConfig {
    /// Engine tick period.
    pub tick_interval_ms: u64,
    /// Queue carrying device-to-server messages.
    pub inbound_queue: String,
    /// Queue carrying server-to-device messages.
    pub outbound_queue: String,
    /// Upper bound for handling one inbound message.
    pub handler_timeout_ms: u64,
    /// Redeliveries after which a transient failure is dead-lettered.
    pub max_redeliveries: u32,
    /// Receiver sleep between polls of an empty queue.
    pub idle_backoff_ms: u64,
    /// Buffer size of the domain event broadcast channel.
    pub event_capacity: usize,
    /// Base URL under which artifact downloads are served.
    pub artifact_base_url: String,
}

impl Default for UpdraftConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2_000,
            inbound_queue: "updraft.device.inbound".to_string(),
            outbound_queue: "updraft.device.outbound".to_string(),
            handler_timeout_ms: 30_000,
            max_redeliveries: 3,
            idle_backoff_ms: 100,
            event_capacity: 1_024,
            artifact_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl UpdraftConfig {
    /// Load from `updraft.toml` (if present) and the environment.
    pub fn load() -> UpdraftResult<Self> {
        Self::load_from("updraft")
    }

    /// Load from a named file stem (without extension) and the
    /// environment. The file is optional; the environment always wins.
    pub fn load_from(file_stem: &str) -> UpdraftResult<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(config::Environment::with_prefix("UPDRAFT").separator("__"))
            .build()
            .map_err(|e| UpdraftError::validation(format!("configuration error: {e}")))?;

        let loaded: UpdraftConfig = raw
            .try_deserialize()
            .map_err(|e| UpdraftError::validation(format!("configuration error: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> UpdraftResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(UpdraftError::validation("tick_interval_ms must be positive"));
        }
        if self.inbound_queue.trim().is_empty() || self.outbound_queue.trim().is_empty() {
            return Err(UpdraftError::validation("queue names must not be empty"));
        }
        if self.inbound_queue == self.outbound_queue {
            return Err(UpdraftError::validation(
                "inbound and outbound queues must differ",
            ));
        }
        if self.event_capacity == 0 {
            return Err(UpdraftError::validation("event_capacity must be positive"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn receiver_settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            inbound_queue: self.inbound_queue.clone(),
            outbound_queue: self.outbound_queue.clone(),
            handler_timeout: Duration::from_millis(self.handler_timeout_ms),
            max_redeliveries: self.max_redeliveries,
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
        }
    }
}
