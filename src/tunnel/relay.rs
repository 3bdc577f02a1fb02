//! Request/response relay loop

use super::SessionEnd;
use crate::codec::Codec;
use crate::config::LocalFailurePolicy;
use crate::local::{LocalCallError, LocalDispatcher};
use crate::protocol::Response;
use crate::transport::{CloseKind, Transport};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Receives relayed requests one at a time, replays them locally and
/// sends the answered message back
pub struct RelayLoop<T> {
    transport: Arc<T>,
    codec: Arc<dyn Codec>,
    dispatcher: LocalDispatcher,
    read_window: Duration,
    policy: LocalFailurePolicy,
}

impl<T: Transport> RelayLoop<T> {
    /// Create a relay loop
    pub fn new(
        transport: Arc<T>,
        codec: Arc<dyn Codec>,
        dispatcher: LocalDispatcher,
        read_window: Duration,
        policy: LocalFailurePolicy,
    ) -> Self {
        Self {
            transport,
            codec,
            dispatcher,
            read_window,
            policy,
        }
    }

    /// Run until the connection ends
    ///
    /// Returns `Err(Error::LocalUnreachable)` with the transport already
    /// closed when the local server cannot be reached under
    /// [`LocalFailurePolicy::Exit`].
    pub async fn run(self) -> Result<SessionEnd> {
        loop {
            let payload = match self.transport.receive().await {
                Ok(payload) => payload,
                Err(e) if e.close_kind() == CloseKind::Normal => {
                    info!("Disconnected from remote server");
                    return Ok(SessionEnd::RelayClosed);
                }
                Err(e) => {
                    error!(error = %e, "Error reading message");
                    return Ok(SessionEnd::ConnectionLost(e));
                }
            };

            self.transport
                .set_read_deadline(Instant::now() + self.read_window);

            self.relay(&payload).await?;
        }
    }

    /// Handle one inbound payload. Only an unreachable local server is fatal.
    async fn relay(&self, payload: &[u8]) -> Result<()> {
        let message = match self.codec.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %String::from_utf8_lossy(&payload[..payload.len().min(256)]),
                    "Received invalid message from relay"
                );
                return Ok(());
            }
        };

        let response = match self.dispatcher.forward(&message).await {
            Ok(response) => response,
            Err(e @ LocalCallError::Network(_)) => match self.policy {
                LocalFailurePolicy::Exit => {
                    error!(error = %e, "Cannot send request to local server");
                    if let Err(close_err) = self.transport.close().await {
                        debug!(error = %close_err, "Close after local failure");
                    }
                    return Err(Error::LocalUnreachable(e));
                }
                LocalFailurePolicy::BadGateway => {
                    warn!(error = %e, "Local server unreachable, answering 502");
                    Response::bad_gateway(&e.to_string())
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    method = %message.method,
                    path = %message.path,
                    "Dropping request"
                );
                return Ok(());
            }
        };

        info!(
            method = %message.method,
            path = %message.path,
            status = response.status_code,
            bytes = response.body.len(),
            "Relayed request"
        );

        let answered = message.respond(response);
        let frame = match self.codec.encode(&answered) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Error marshaling response");
                return Ok(());
            }
        };

        if let Err(e) = self.transport.send(frame, self.codec.kind()).await {
            warn!(error = %e, "Error sending response through tunnel");
        }

        Ok(())
    }
}
