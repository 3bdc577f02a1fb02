//! Scripted in-memory transport for tunnel tests

use super::{ControlFrame, PayloadKind, PongHandler, Transport, TransportError};
use crate::codec::{Codec, JsonCodec};
use crate::protocol::Message;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub(crate) type Inbound = mpsc::UnboundedSender<Result<Vec<u8>, TransportError>>;

/// Transport fed from a channel that records everything written to it
///
/// Dropping the inbound sender reads as a normal close.
pub(crate) struct MockTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>>,
    sent: StdMutex<Vec<(Vec<u8>, PayloadKind)>>,
    controls: StdMutex<Vec<ControlFrame>>,
    deadline: StdMutex<Option<Instant>>,
    pong_handler: StdMutex<Option<PongHandler>>,
    closes: AtomicUsize,
    fail_controls: AtomicBool,
    closing: CancellationToken,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, Inbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            inbound: Mutex::new(rx),
            sent: StdMutex::new(Vec::new()),
            controls: StdMutex::new(Vec::new()),
            deadline: StdMutex::new(None),
            pong_handler: StdMutex::new(None),
            closes: AtomicUsize::new(0),
            fail_controls: AtomicBool::new(false),
            closing: CancellationToken::new(),
        });
        (transport, tx)
    }

    /// Data frames sent so far, decoded as JSON messages
    pub(crate) fn sent_messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(payload, _)| JsonCodec.decode(payload).unwrap())
            .collect()
    }

    pub(crate) fn controls(&self) -> Vec<ControlFrame> {
        self.controls.lock().unwrap().clone()
    }

    pub(crate) fn read_deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make every following control frame write fail
    pub(crate) fn fail_controls(&self) {
        self.fail_controls.store(true, Ordering::SeqCst);
    }

    /// Invoke the installed pong handler as if a pong arrived
    pub(crate) fn deliver_pong(&self) {
        if let Some(handler) = self.pong_handler.lock().unwrap().as_ref() {
            handler();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.closing.cancelled() => Err(TransportError::Closed),
            next = inbound.recv() => next.unwrap_or(Err(TransportError::Closed)),
        }
    }

    async fn send(&self, payload: Vec<u8>, kind: PayloadKind) -> Result<(), TransportError> {
        if self.closing.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push((payload, kind));
        Ok(())
    }

    async fn send_control(
        &self,
        frame: ControlFrame,
        _deadline: Instant,
    ) -> Result<(), TransportError> {
        if self.closing.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if self.fail_controls.load(Ordering::SeqCst) {
            return Err(TransportError::Send("scripted failure".to_string()));
        }
        self.controls.lock().unwrap().push(frame);
        Ok(())
    }

    fn set_read_deadline(&self, deadline: Instant) {
        *self.deadline.lock().unwrap() = Some(deadline);
    }

    fn on_pong(&self, handler: PongHandler) {
        *self.pong_handler.lock().unwrap() = Some(handler);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closing.cancel();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closing.is_cancelled()
    }
}
