#[cfg(test)]
mod payload_test;

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Payload is the opaque body of a data channel message, either UTF-8 text or
/// a binary blob. Payloads are passed through unmodified in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "data")]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    /// Builds a payload from an inbound data channel message. Messages flagged
    /// as strings that are not valid UTF-8 are kept as binary.
    pub(crate) fn from_message(is_string: bool, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if !is_string {
            return Payload::Binary(data);
        }
        match std::str::from_utf8(&data).map(str::to_owned) {
            Ok(text) => Payload::Text(text),
            Err(_) => Payload::Binary(data),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "'{text}'"),
            Payload::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Payload::Binary(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(data))
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(data))
    }
}
