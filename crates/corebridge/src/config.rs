//! Client configuration.

use std::time::Duration;

use corebridge_transport::QueueDefinition;
use serde::{Deserialize, Serialize};

/// Default reply timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Settings for a [`CoreClient`](crate::CoreClient).
///
/// Every field has a default, so a config file only needs the fields it
/// changes:
///
/// ```
/// use corebridge::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{"timeout_ms": 2500}"#).unwrap();
/// assert_eq!(config.timeout_ms, 2500);
/// assert_eq!(config.reply_queue, "core.core-client");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a call waits for its reply, and for its data payload.
    pub timeout_ms: u64,

    /// Direct queue requests are published to.
    pub outbound_queue: String,

    /// Base name of the per-session reply queues.
    pub reply_queue: String,

    /// Base name of the per-session data queues.
    pub data_queue: String,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            outbound_queue: QueueDefinition::CLIENT_TO_CORE.name.to_string(),
            reply_queue: QueueDefinition::CORE_TO_CLIENT.name.to_string(),
            data_queue: QueueDefinition::DATA.name.to_string(),
        }
    }
}
