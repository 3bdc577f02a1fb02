//! Transport layer implementations
//!
//! A transport is a message-framed, full-duplex connection to the relay.
//! It is shared by the relay loop, the keepalive scheduler and the
//! shutdown path, so every operation takes `&self` and writes are
//! serialized internally.
//!
//! - WebSocket (`ws://` / `wss://`) via tokio-tungstenite

mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use websocket::WsTransport;

use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Read deadline exceeded")]
    Timeout,

    #[error("Write deadline exceeded")]
    WriteTimeout,

    #[error("Send failed: {0}")]
    Send(String),
}

/// How a read failure ended the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Peer closed cleanly
    Normal,
    /// Unexpected EOF, protocol error or read deadline
    Abnormal,
}

impl TransportError {
    /// Classify a read failure
    pub fn close_kind(&self) -> CloseKind {
        match self {
            TransportError::Closed => CloseKind::Normal,
            _ => CloseKind::Abnormal,
        }
    }
}

/// Kind of a data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    Binary,
}

/// Control frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Keepalive probe
    Ping(Vec<u8>),
    /// Close handshake with a status code and reason
    Close { code: u16, reason: String },
}

impl ControlFrame {
    /// Normal-closure close frame (status 1000)
    pub fn close_normal(reason: impl Into<String>) -> Self {
        ControlFrame::Close {
            code: 1000,
            reason: reason.into(),
        }
    }
}

/// Callback invoked whenever a pong arrives
pub type PongHandler = Box<dyn Fn() + Send + Sync>;

/// Trait for transport implementations
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receive the next data frame payload
    ///
    /// Control frames are handled internally. Fails with
    /// [`TransportError::Timeout`] once the read deadline passes.
    async fn receive(&self) -> Result<Vec<u8>, TransportError>;

    /// Send one data frame
    async fn send(&self, payload: Vec<u8>, kind: PayloadKind) -> Result<(), TransportError>;

    /// Send a control frame, giving up at `deadline`
    async fn send_control(&self, frame: ControlFrame, deadline: Instant)
        -> Result<(), TransportError>;

    /// Move the read deadline
    fn set_read_deadline(&self, deadline: Instant);

    /// Install the pong callback, replacing any previous one
    fn on_pong(&self, handler: PongHandler);

    /// Close the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), TransportError>;

    /// Check if connected
    fn is_connected(&self) -> bool;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read window, applied at connect time and on every extension
    pub read_window: Duration,
    /// Deadline for writing a data frame
    pub write_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_window: crate::protocol::READ_WINDOW,
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_kind() {
        assert_eq!(TransportError::Closed.close_kind(), CloseKind::Normal);
        assert_eq!(TransportError::Timeout.close_kind(), CloseKind::Abnormal);
        assert_eq!(
            TransportError::ConnectionLost("reset".to_string()).close_kind(),
            CloseKind::Abnormal
        );
    }
}
