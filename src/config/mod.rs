//! Configuration management
//!
//! Everything has a compiled-in default; a TOML file may override any
//! subset of it and CLI flags override the file.
//!
//! ```toml
//! [client]
//! local_port = 3000
//! wire_format = "json"
//! on_local_unreachable = "bad-gateway"
//!
//! [keepalive]
//! ping_interval_secs = 20
//!
//! [logging]
//! level = "debug"
//! ```

use crate::codec::WireFormat;
use crate::protocol;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tunnel client configuration
    pub client: ClientConfig,
    /// Keepalive and deadline configuration
    pub keepalive: KeepaliveConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot honour
    pub fn validate(&self) -> Result<(), crate::Error> {
        let periods = [
            ("keepalive.ping_interval_secs", self.keepalive.ping_interval_secs),
            ("keepalive.ping_deadline_secs", self.keepalive.ping_deadline_secs),
            ("keepalive.read_window_secs", self.keepalive.read_window_secs),
            ("keepalive.close_deadline_secs", self.keepalive.close_deadline_secs),
            ("client.local_timeout_secs", self.client.local_timeout_secs),
            ("client.connect_timeout_secs", self.client.connect_timeout_secs),
        ];

        for (name, secs) in periods {
            if secs == 0 {
                return Err(crate::Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    /// Transport settings derived from this configuration
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            read_window: Duration::from_secs(self.keepalive.read_window_secs),
            write_timeout: Duration::from_secs(self.keepalive.ping_deadline_secs),
        }
    }
}

/// What to do when the local server cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalFailurePolicy {
    /// Close the tunnel and exit with an error
    #[default]
    Exit,
    /// Answer the relay with a 502 and keep the session
    BadGateway,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay tunnel endpoint
    pub relay_url: String,
    /// Base the session id is appended to for the public URL
    pub public_base_url: String,
    /// Port of the local HTTP server
    pub local_port: u16,
    /// Payload encoding
    pub wire_format: WireFormat,
    /// Timeout for a whole local call in seconds
    pub local_timeout_secs: u64,
    /// Relay connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Reaction to an unreachable local server
    pub on_local_unreachable: LocalFailurePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: protocol::default_relay_url(),
            public_base_url: protocol::default_public_base_url(),
            local_port: protocol::DEFAULT_LOCAL_PORT,
            wire_format: WireFormat::Json,
            local_timeout_secs: protocol::LOCAL_TIMEOUT.as_secs(),
            connect_timeout_secs: 30,
            on_local_unreachable: LocalFailurePolicy::Exit,
        }
    }
}

/// Keepalive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Seconds between pings
    pub ping_interval_secs: u64,
    /// Seconds allowed to write one ping (also used for data frames)
    pub ping_deadline_secs: u64,
    /// Seconds without any frame or pong before the connection is dead
    pub read_window_secs: u64,
    /// Seconds allowed to write the close frame on shutdown
    pub close_deadline_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: protocol::PING_INTERVAL.as_secs(),
            ping_deadline_secs: protocol::PING_DEADLINE.as_secs(),
            read_window_secs: protocol::READ_WINDOW.as_secs(),
            close_deadline_secs: protocol::CLOSE_DEADLINE.as_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
