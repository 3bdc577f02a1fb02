//! Request/response entities carried over the tunnel
//!
//! Field names follow the relay's JSON shape:
//! ```text
//! { "method": "GET", "path": "/foo", "headers": {"Accept": ["*/*"]}, "body": "",
//!   "response": { "statusCode": 200, "headers": {...}, "body": "..." } }
//! ```

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Header name to ordered values
pub type Headers = BTreeMap<String, Vec<String>>;

/// One inbound HTTP request as relayed by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub method: String,
    pub path: String,
    #[serde(deserialize_with = "nullable_headers")]
    pub headers: Headers,
    #[serde(with = "body")]
    pub body: Bytes,
    /// Set once the local server has answered
    pub response: Option<Response>,
}

impl Message {
    /// Attach the local server's reply, consuming the unanswered message
    pub fn respond(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    /// Whether a response has been attached
    pub fn is_answered(&self) -> bool {
        self.response.is_some()
    }
}

/// The local server's reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    #[serde(deserialize_with = "nullable_headers")]
    pub headers: Headers,
    #[serde(with = "body")]
    pub body: Bytes,
}

impl Response {
    /// Synthetic reply used when the local server cannot be reached
    pub fn bad_gateway(reason: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            vec!["text/plain; charset=utf-8".to_string()],
        );
        Self {
            status_code: 502,
            headers,
            body: Bytes::from(format!("Bad Gateway: {}", reason)),
        }
    }
}

/// Canonical MIME form of a header name (`content-type` -> `Content-Type`)
///
/// Names containing characters outside the HTTP token set are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    let is_token = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
    if name.is_empty() || !name.chars().all(is_token) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// The relay sends `null` for empty header sets
fn nullable_headers<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        Ok(Option::<Headers>::deserialize(deserializer)?.unwrap_or_default())
    } else {
        Headers::deserialize(deserializer)
    }
}

/// Bodies are strings in textual encodings and raw bytes in binary ones
mod body {
    use bytes::Bytes;
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&String::from_utf8_lossy(body))
        } else {
            serializer.serialize_bytes(body)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(BodyVisitor)
        } else {
            deserializer.deserialize_byte_buf(BodyVisitor)
        }
    }

    struct BodyVisitor;

    impl<'de> Visitor<'de> for BodyVisitor {
        type Value = Bytes;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or byte body")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Bytes, E> {
            Ok(Bytes::copy_from_slice(v.as_bytes()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Bytes, E> {
            Ok(Bytes::from(v))
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Bytes, E> {
            Ok(Bytes::copy_from_slice(v))
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Bytes, E> {
            Ok(Bytes::from(v))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Bytes, E> {
            Ok(Bytes::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Bytes, A::Error> {
            let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                buf.push(byte);
            }
            Ok(Bytes::from(buf))
        }
    }
}
