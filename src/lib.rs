//! # Portsicle
//!
//! Exposes a local HTTP server to the internet through a public relay.
//!
//! The client dials the relay over a WebSocket, receives a session id that
//! forms its public URL, and then replays every request the relay pushes
//! down the tunnel against `http://localhost:<port>`, sending the local
//! server's answer back up.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Tunnel Layer                     │
//! │    (session binding, relay loop, keepalive, close)   │
//! ├──────────────────────────┬──────────────────────────┤
//! │       Codec Layer        │    Local Dispatcher      │
//! │    (JSON / bincode)      │  (HTTP to localhost)     │
//! ├──────────────────────────┴──────────────────────────┤
//! │                   Transport Layer                    │
//! │      (WebSocket, deadlines, serialized writes)       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod local;
pub mod protocol;
pub mod transport;
pub mod tunnel;

pub use config::Config;
pub use tunnel::{SessionEnd, TunnelClient};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why a tunnel could not be established
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The relay could not be reached or dropped the connection
    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    /// The relay's first frame did not announce a session
    #[error(transparent)]
    Announcement(#[from] protocol::ProtocolError),
}

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Local call error: {0}")]
    Local(#[from] local::LocalCallError),

    /// The local server stopped answering; the session has been torn down
    #[error("Tunnel closed: {0}")]
    LocalUnreachable(#[source] local::LocalCallError),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),
}
