//! Client configuration.

use std::fmt;
use std::time::Duration;

use rcon_protocol::check_body_len;
use serde::{Deserialize, Serialize};

use crate::RconError;

/// Everything needed to reach and stay connected to one server.
///
/// Deserializable with every field optional, so it can be embedded in an
/// application's own config file. Host, port and password have no
/// meaningful defaults; [`validate`](Self::validate) rejects them when
/// missing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server RCON port.
    pub port: u16,

    /// RCON password.
    pub password: String,

    /// Interval between keep-alive pings. 0 disables them.
    pub ping_interval_ms: u64,

    /// Reconnect automatically after the connection drops.
    pub auto_reconnect: bool,

    /// Delay before each reconnect attempt.
    pub auto_reconnect_delay_ms: u64,

    /// Per-command timeout. `None` waits forever.
    pub command_timeout_ms: Option<u64>,

    /// Bound on the TCP connect and, separately, on the auth handshake.
    pub connect_timeout_ms: u64,

    /// How many events a slow subscriber may lag behind before it starts
    /// missing them.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            password: String::new(),
            ping_interval_ms: 120_000,
            auto_reconnect: true,
            auto_reconnect_delay_ms: 10_000,
            command_timeout_ms: Some(50_000),
            connect_timeout_ms: 10_000,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// A config for `host:port` with default timings.
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Self::default()
        }
    }

    /// Checks that the config can be used to connect.
    ///
    /// # Errors
    /// Returns [`RconError::Config`] for an empty host, port 0, an empty
    /// or oversized password, or a zero event capacity.
    pub fn validate(&self) -> Result<(), RconError> {
        if self.host.trim().is_empty() {
            return Err(RconError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(RconError::Config("port must not be 0".into()));
        }
        if self.password.is_empty() {
            return Err(RconError::Config("password must not be empty".into()));
        }
        check_body_len(&self.password)
            .map_err(|e| RconError::Config(format!("password: {e}")))?;
        if self.event_capacity == 0 {
            return Err(RconError::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Keep-alive interval; zero means disabled.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Delay before each reconnect attempt.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.auto_reconnect_delay_ms)
    }

    /// Per-command timeout, if any.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    /// Timeout for connect plus auth.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// The password must never end up in logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("ping_interval_ms", &self.ping_interval_ms)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("auto_reconnect_delay_ms", &self.auto_reconnect_delay_ms)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("event_capacity", &self.event_capacity)
            .finish()
    }
}

/// Converts a `Duration` to whole milliseconds, saturating.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
