//! Tunnel client - owns one relay session from connect to teardown

use super::{bind_session, Keepalive, RelayLoop, SessionEnd, ShutdownCoordinator};
use crate::codec::Codec;
use crate::config::Config;
use crate::local::LocalDispatcher;
use crate::protocol::Session;
use crate::transport::{Transport, WsTransport};
use crate::{ConnectError, Error, Result};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunnel client
pub struct TunnelClient<T: Transport + 'static> {
    transport: Arc<T>,
    session: Session,
    codec: Arc<dyn Codec>,
    dispatcher: LocalDispatcher,
    config: Config,
}

impl TunnelClient<WsTransport> {
    /// Dial the relay and bind a session
    pub async fn connect(config: &Config) -> Result<Self> {
        info!(relay = %config.client.relay_url, "Connecting to relay");

        let transport = WsTransport::connect(&config.client.relay_url, config.transport())
            .await
            .map_err(|e| Error::Connect(ConnectError::Transport(e)))?;
        info!("Connected to remote server");

        Self::bind(Arc::new(transport), config).await
    }
}

impl<T: Transport + 'static> TunnelClient<T> {
    /// Bind a session over an already established transport
    pub async fn bind(transport: Arc<T>, config: &Config) -> Result<Self> {
        let read_window = Duration::from_secs(config.keepalive.read_window_secs);

        // A weak handle keeps the transport from owning itself through its callback
        let weak: Weak<T> = Arc::downgrade(&transport);
        transport.on_pong(Box::new(move || {
            if let Some(transport) = weak.upgrade() {
                transport.set_read_deadline(Instant::now() + read_window);
            }
        }));

        let session = match bind_session(
            transport.as_ref(),
            &config.client.public_base_url,
            read_window,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!(error = %close_err, "Close after failed bind");
                }
                return Err(e);
            }
        };
        info!(public_url = %session.public_url, "Your URL is: {}", session.public_url);

        let dispatcher = LocalDispatcher::new(
            config.client.local_port,
            Duration::from_secs(config.client.local_timeout_secs),
        )?;
        let codec = config.client.wire_format.codec();

        Ok(Self {
            transport,
            session,
            codec,
            dispatcher,
            config: config.clone(),
        })
    }

    /// Session bound at connect time
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Relay requests until `shutdown` resolves or the connection ends
    pub async fn run<F>(self, shutdown: F) -> Result<SessionEnd>
    where
        F: Future<Output = ()>,
    {
        let keepalive_cfg = &self.config.keepalive;
        let done = CancellationToken::new();

        let keepalive = tokio::spawn(
            Keepalive::new(
                Arc::clone(&self.transport),
                Duration::from_secs(keepalive_cfg.ping_interval_secs),
                Duration::from_secs(keepalive_cfg.ping_deadline_secs),
            )
            .run(done.clone()),
        );

        let mut relay = tokio::spawn(
            RelayLoop::new(
                Arc::clone(&self.transport),
                self.codec,
                self.dispatcher,
                Duration::from_secs(keepalive_cfg.read_window_secs),
                self.config.client.on_local_unreachable,
            )
            .run(),
        );

        tokio::select! {
            outcome = &mut relay => {
                done.cancel();
                match keepalive.await {
                    Ok(pings) => debug!(pings, "Keepalive joined"),
                    Err(e) => warn!(error = %e, "Keepalive task failed"),
                }
                if let Err(e) = self.transport.close().await {
                    debug!(error = %e, "Transport close");
                }
                outcome?
            }
            _ = shutdown => {
                ShutdownCoordinator::new(
                    Arc::clone(&self.transport),
                    done,
                    Duration::from_secs(keepalive_cfg.close_deadline_secs),
                )
                .shutdown(keepalive, relay)
                .await
            }
        }
    }
}
