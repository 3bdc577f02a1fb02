//! Tunnel layer - the relay engine
//!
//! Provides:
//! - Session binding (first frame -> public URL)
//! - Keepalive pings
//! - The request/response relay loop
//! - Cooperative shutdown
//!
//! ```text
//!            ┌──────────────┐  ping   ┌───────────────┐
//!            │  Keepalive   │────────▶│               │
//!            └──────▲───────┘         │               │
//!                   │ done            │   Transport   │◀──▶ relay
//!            ┌──────┴───────┐  close  │  (serialized  │
//! SIGINT ───▶│   Shutdown   │────────▶│    writes)    │
//!            └──────┬───────┘         │               │
//!                   │ join            │               │
//!            ┌──────▼───────┐  recv/  │               │
//!            │  Relay loop  │◀──send─▶│               │
//!            └──────┬───────┘         └───────────────┘
//!                   │ HTTP
//!                   ▼
//!            localhost:<port>
//! ```

mod binder;
mod client;
mod keepalive;
mod relay;
mod shutdown;

pub use binder::bind_session;
pub use client::TunnelClient;
pub use keepalive::Keepalive;
pub use relay::RelayLoop;
pub use shutdown::ShutdownCoordinator;

use crate::transport::TransportError;

/// How a tunnel session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Local interrupt, close handshake performed
    Interrupted,
    /// The relay closed the connection cleanly
    RelayClosed,
    /// The connection failed or went silent past the read deadline
    ConnectionLost(TransportError),
}
