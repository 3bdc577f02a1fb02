//! Protocol definitions and constants
//!
//! The relay speaks a very small protocol over the tunnel:
//! the first inbound frame announces the session, every frame after
//! that is a codec-encoded [`Message`] describing one HTTP request.

mod message;
mod session;

pub use message::{canonical_header_key, Headers, Message, Response};
pub use session::Session;

use std::time::Duration;
use thiserror::Error;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid session announcement: {0}")]
    InvalidAnnouncement(String),

    #[error("Empty session id")]
    EmptySessionId,
}

/// Prefix of the first frame sent by the relay
pub const SESSION_PREFIX: &str = "Session Id: ";

/// Host of the public relay
pub const RELAY_HOST: &str = "horrible-maritsa-attorney-fa65d70c.koyeb.app";

/// Path of the tunnel endpoint on the relay
pub const RELAY_PATH: &str = "/ws";

/// Default local port requests are forwarded to
pub const DEFAULT_LOCAL_PORT: u16 = 8888;

/// Read window: the connection is considered dead if nothing arrives for this long
pub const READ_WINDOW: Duration = Duration::from_secs(60);

/// Keepalive ping period
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Time allowed for a single ping to be written
pub const PING_DEADLINE: Duration = Duration::from_secs(10);

/// Time allowed for the close frame to be written on shutdown
pub const CLOSE_DEADLINE: Duration = Duration::from_secs(1);

/// Timeout for a whole local call, body included
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Reason sent with the close frame on graceful shutdown
pub const CLOSE_REASON: &str = "Client closing connection";

/// Default relay endpoint
pub fn default_relay_url() -> String {
    format!("wss://{}{}", RELAY_HOST, RELAY_PATH)
}

/// Default base of public URLs handed out by the relay
pub fn default_public_base_url() -> String {
    format!("https://{}", RELAY_HOST)
}
