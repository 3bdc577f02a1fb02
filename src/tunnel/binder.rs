//! Session binding

use crate::protocol::Session;
use crate::transport::Transport;
use crate::{ConnectError, Error, Result};
use std::time::{Duration, Instant};
use tracing::debug;

/// Consume the relay's first frame and derive the public URL
///
/// Any failure here leaves the tunnel without a usable endpoint and is
/// reported as [`Error::Connect`].
pub async fn bind_session<T: Transport + ?Sized>(
    transport: &T,
    public_base_url: &str,
    read_window: Duration,
) -> Result<Session> {
    let payload = transport
        .receive()
        .await
        .map_err(|e| Error::Connect(ConnectError::Transport(e)))?;
    transport.set_read_deadline(Instant::now() + read_window);

    let session = Session::from_announcement(&payload, public_base_url)
        .map_err(|e| Error::Connect(ConnectError::Announcement(e)))?;
    debug!(session_id = %session.id, "Session bound");

    Ok(session)
}
