//! Handler configuration.

use serde::Deserialize;
use std::time::Duration;

/// Name of the coordinator every component signs in with.
pub const COORDINATOR: &str = "COORDINATOR";

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings of a [`PipeHandler`](crate::PipeHandler).
///
/// Deserializable so applications can embed it in their own configuration files.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Component name, before the coordinator assigns a namespace.
    pub name: String,
    pub coordinator: String,
    /// Default wait of communicator calls for a correlated reply.
    #[serde(with = "millis")]
    pub read_timeout: Duration,
}

impl HandlerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            coordinator: COORDINATOR.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
