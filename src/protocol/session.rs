//! Session announcement parsing

use super::{ProtocolError, SESSION_PREFIX};

/// A relay-assigned session binding a public URL to this tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque id chosen by the relay
    pub id: String,
    /// URL under which the local server is reachable
    pub public_url: String,
}

impl Session {
    /// Parse the relay's first frame (`"Session Id: <id>"`)
    pub fn from_announcement(payload: &[u8], public_base_url: &str) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| ProtocolError::InvalidAnnouncement("not valid UTF-8".to_string()))?;

        let id = text
            .strip_prefix(SESSION_PREFIX)
            .ok_or_else(|| ProtocolError::InvalidAnnouncement(truncate(text, 64)))?
            .trim();

        if id.is_empty() {
            return Err(ProtocolError::EmptySessionId);
        }

        Ok(Self {
            id: id.to_string(),
            public_url: format!("{}/{}", public_base_url.trim_end_matches('/'), id),
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
