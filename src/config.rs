//! Manager configuration.
//!
//! Every field has a default, so a JSON config only needs the values that
//! differ. Durations are written in seconds.
//!
//! ```
//! use amiwire_client::config::{ManagerConfig, ProtocolVersion};
//!
//! let config = ManagerConfig::from_json_str(
//!     r#"{ "username": "admin", "secret": "s3cret", "host": "pbx.local", "protocol_version": "1.0" }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.port, 5038);
//! assert_eq!(config.protocol_version, ProtocolVersion::V1_0);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_PORT;
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Default host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default pause between two reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Default event mask sent at login.
pub const DEFAULT_EVENT_MASK: &str = "on";

/// Default bound on the login handshake.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a correlated response.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol revision spoken by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Current servers: user events arrive already in their final shape.
    #[default]
    #[serde(rename = "current")]
    Current,
    /// v1.0 servers pack user event variables into one `variables` field.
    #[serde(rename = "1.0")]
    V1_0,
}

impl ProtocolVersion {
    #[inline]
    pub fn is_legacy(&self) -> bool {
        matches!(self, ProtocolVersion::V1_0)
    }
}

/// Where hooks run. See [`crate::hooks::HookDispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDispatch {
    /// On the listener task, before the next block is read.
    #[default]
    Inline,
    /// On a dedicated hook worker task.
    Queued,
}

/// Connection and engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    /// Manager event mask sent at login (e.g. `"on"`, `"off"`, `"user,call"`).
    pub event_mask: String,
    pub protocol_version: ProtocolVersion,
    /// Connect (with reconnection enabled) as part of building the manager.
    pub connect_immediately: bool,
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,
    #[serde(with = "duration_secs")]
    pub login_timeout: Duration,
    /// Timeout used when a correlated send does not specify one.
    #[serde(with = "duration_secs")]
    pub default_reply_timeout: Duration,
    pub hook_dispatch: HookDispatch,
    pub writer_channel_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            secret: String::new(),
            event_mask: DEFAULT_EVENT_MASK.to_string(),
            protocol_version: ProtocolVersion::default(),
            connect_immediately: false,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            default_reply_timeout: DEFAULT_REPLY_TIMEOUT,
            hook_dispatch: HookDispatch::default(),
            writer_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Create a config with credentials and defaults for everything else.
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// `host:port`, for logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Durations as (fractional) seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
