use crate::transport::TransportConfig;
use serde::Deserialize;
use serde::de::Error as _;
use std::time::Duration;

/// Tunables of one [`crate::Orchestrator`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long a disconnected session may wait for recovery before closing.
    pub grace_period_ms: u64,
    pub command_capacity: usize,
    /// Capacity of the channel transports and drivers report into.
    pub event_capacity: usize,
    /// Lagging [`crate::SessionEvent`] subscribers lose the oldest events.
    pub broadcast_capacity: usize,
    pub transport: TransportConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            command_capacity: 100,
            event_capacity: 256,
            broadcast_capacity: 64,
            transport: TransportConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parses a config, rejecting zero channel capacities.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json)?;
        for (field, capacity) in [
            ("command_capacity", config.command_capacity),
            ("event_capacity", config.event_capacity),
            ("broadcast_capacity", config.broadcast_capacity),
        ] {
            if capacity == 0 {
                return Err(serde_json::Error::custom(format!("{field} must be at least 1")));
            }
        }
        Ok(config)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
