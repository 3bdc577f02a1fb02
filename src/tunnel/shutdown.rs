//! Cooperative shutdown on local interrupt

use super::SessionEnd;
use crate::protocol::CLOSE_REASON;
use crate::transport::{ControlFrame, Transport};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives the close handshake once an interrupt arrives
///
/// Ordering: raise `done`, wait for the keepalive to return, then write
/// the close frame. No ping can follow the close frame.
pub struct ShutdownCoordinator<T> {
    transport: Arc<T>,
    done: CancellationToken,
    close_deadline: Duration,
}

impl<T: Transport> ShutdownCoordinator<T> {
    pub fn new(transport: Arc<T>, done: CancellationToken, close_deadline: Duration) -> Self {
        Self {
            transport,
            done,
            close_deadline,
        }
    }

    /// Stop the keepalive, send the close frame, wait for the relay loop
    /// to observe the close and release the connection
    pub async fn shutdown(
        self,
        keepalive: JoinHandle<u64>,
        relay: JoinHandle<Result<SessionEnd>>,
    ) -> Result<SessionEnd> {
        info!("Closing connection...");

        self.done.cancel();
        match keepalive.await {
            Ok(pings) => debug!(pings, "Keepalive joined"),
            Err(e) => warn!(error = %e, "Keepalive task failed"),
        }

        let deadline = Instant::now() + self.close_deadline;
        if let Err(e) = self
            .transport
            .send_control(ControlFrame::close_normal(CLOSE_REASON), deadline)
            .await
        {
            // Still wait for the reader; the read deadline bounds it
            warn!(error = %e, "Error closing connection");
        }

        let outcome = relay.await?;
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Transport close");
        }

        match outcome {
            Ok(end) => {
                debug!(?end, "Relay loop finished after close");
                Ok(SessionEnd::Interrupted)
            }
            Err(e) => Err(e),
        }
    }
}
