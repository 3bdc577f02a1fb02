//! Wire codecs for tunnel payloads
//!
//! Two encodings are supported:
//! - JSON (textual, sent as text frames, what the public relay speaks)
//! - bincode (compact binary, sent as binary frames)

use crate::protocol::Message;
use crate::transport::PayloadKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Binary(#[from] bincode::Error),
}

/// Serializes messages to and from transport payloads
pub trait Codec: Send + Sync {
    /// Frame kind payloads of this codec travel in
    fn kind(&self) -> PayloadKind;

    /// Encode a message into a single payload
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Decode a payload into a message
    fn decode(&self, payload: &[u8]) -> Result<Message, CodecError>;
}

/// Textual JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Text
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Compact binary codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Binary
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, CodecError> {
        Ok(bincode::deserialize(payload)?)
    }
}

/// Encoding selected in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Json,
    Binary,
}

impl WireFormat {
    /// Build the codec for this format
    pub fn codec(self) -> Arc<dyn Codec> {
        match self {
            WireFormat::Json => Arc::new(JsonCodec),
            WireFormat::Binary => Arc::new(BincodeCodec),
        }
    }
}
