//! WebSocket transport (relay connection)

use super::{
    ControlFrame, PayloadKind, PongHandler, Transport, TransportConfig, TransportError,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to the relay
///
/// The write half sits behind its own lock so pings from the keepalive
/// task and responses from the relay loop never interleave. The read
/// half is only ever used by one reader at a time.
pub struct WsTransport {
    sink: Mutex<Option<SplitSink<WsStream, WsMessage>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    deadline: watch::Sender<Instant>,
    pong_handler: StdMutex<Option<PongHandler>>,
    peer_closed: AtomicBool,
    closing: CancellationToken,
    config: TransportConfig,
}

impl WsTransport {
    /// Connect to a `ws://` or `wss://` endpoint
    ///
    /// The read deadline starts at `now + read_window`.
    pub async fn connect(url: &str, config: TransportConfig) -> Result<Self, TransportError> {
        let (ws, _response) = tokio::time::timeout(config.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::ConnectionFailed(format!("timed out connecting to {}", url)))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", url, e)))?;

        debug!(url, "WebSocket handshake complete");

        let (sink, stream) = ws.split();
        let (deadline, _) = watch::channel(Instant::now() + config.read_window);

        Ok(Self {
            sink: Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            deadline,
            pong_handler: StdMutex::new(None),
            peer_closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
            config,
        })
    }

    fn fire_pong(&self) {
        let handler = self
            .pong_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handler) = handler.as_ref() {
            handler();
        }
    }

    fn classify_close(&self, frame: Option<CloseFrame<'static>>) -> TransportError {
        self.peer_closed.store(true, Ordering::SeqCst);
        match frame {
            None => TransportError::Closed,
            Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
                TransportError::Closed
            }
            Some(frame) => TransportError::ConnectionLost(format!(
                "closed with status {}: {}",
                u16::from(frame.code),
                frame.reason
            )),
        }
    }

    fn classify_error(&self, err: WsError) -> TransportError {
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::ConnectionLost(other.to_string()),
        }
    }

    async fn write(&self, message: WsMessage, deadline: Instant) -> Result<(), TransportError> {
        if self.closing.is_cancelled() {
            return Err(TransportError::Closed);
        }

        tokio::time::timeout_at(deadline.into(), async {
            let mut sink = self.sink.lock().await;
            let sink = sink.as_mut().ok_or(TransportError::Closed)?;
            sink.send(message)
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
        .await
        .map_err(|_| TransportError::WriteTimeout)?
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::Closed)?;
        let mut deadline_rx = self.deadline.subscribe();

        loop {
            if self.peer_closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }

            let deadline = *deadline_rx.borrow_and_update();

            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = tokio::time::sleep_until(deadline.into()) => {
                    return Err(TransportError::Timeout);
                }
                Ok(()) = deadline_rx.changed() => continue,
                _ = self.closing.cancelled() => return Err(TransportError::Closed),
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(WsMessage::Binary(data))) => return Ok(data),
                Some(Ok(WsMessage::Pong(_))) => {
                    trace!("Pong received");
                    self.fire_pong();
                }
                // Pings are answered by tungstenite on the next read/write
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => return Err(self.classify_close(frame)),
                Some(Err(e)) => return Err(self.classify_error(e)),
                None => {
                    return Err(TransportError::ConnectionLost(
                        "connection ended without a close frame".to_string(),
                    ))
                }
            }
        }
    }

    async fn send(&self, payload: Vec<u8>, kind: PayloadKind) -> Result<(), TransportError> {
        let message = match kind {
            PayloadKind::Text => WsMessage::Text(
                String::from_utf8(payload)
                    .map_err(|e| TransportError::Send(format!("text payload is not UTF-8: {}", e)))?,
            ),
            PayloadKind::Binary => WsMessage::Binary(payload),
        };
        self.write(message, Instant::now() + self.config.write_timeout)
            .await
    }

    async fn send_control(
        &self,
        frame: ControlFrame,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        let message = match frame {
            ControlFrame::Ping(data) => WsMessage::Ping(data),
            ControlFrame::Close { code, reason } => WsMessage::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: Cow::Owned(reason),
            })),
        };
        self.write(message, deadline).await
    }

    fn set_read_deadline(&self, deadline: Instant) {
        self.deadline.send_replace(deadline);
    }

    fn on_pong(&self, handler: PongHandler) {
        *self
            .pong_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closing.cancel();

        // Flushes a close frame if none was sent yet, then drops the write half
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let deadline = Instant::now() + self.config.write_timeout;
            if let Ok(Err(e)) = tokio::time::timeout_at(deadline.into(), sink.close()).await {
                debug!(error = %e, "Close flush failed");
            }
        }

        // Dropping both halves releases the socket
        self.stream.lock().await.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closing.is_cancelled() && !self.peer_closed.load(Ordering::SeqCst)
    }
}
