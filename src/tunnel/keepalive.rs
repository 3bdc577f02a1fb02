//! Keepalive scheduler

use crate::transport::{ControlFrame, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Periodically pings the relay
///
/// A failed ping stops the scheduler only. Detecting the dead connection
/// is left to the transport's read deadline.
pub struct Keepalive<T> {
    transport: Arc<T>,
    interval: Duration,
    ping_deadline: Duration,
}

impl<T: Transport> Keepalive<T> {
    /// Create a scheduler pinging every `interval`, allowing `ping_deadline` per ping
    pub fn new(transport: Arc<T>, interval: Duration, ping_deadline: Duration) -> Self {
        Self {
            transport,
            interval,
            ping_deadline,
        }
    }

    /// Run until `done` is cancelled or a ping fails
    ///
    /// Returns the number of pings sent.
    pub async fn run(self, done: CancellationToken) -> u64 {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sent = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => {
                    debug!(pings = sent, "Keepalive stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let deadline = std::time::Instant::now() + self.ping_deadline;
            match self
                .transport
                .send_control(ControlFrame::Ping(Vec::new()), deadline)
                .await
            {
                Ok(()) => {
                    sent += 1;
                    trace!(seq = sent, "Ping sent");
                }
                Err(e) => {
                    warn!(error = %e, "Ping failed, keepalive stopped");
                    break;
                }
            }
        }

        sent
    }
}
