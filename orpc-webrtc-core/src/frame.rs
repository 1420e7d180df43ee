//! Logical frame types.
//!
//! A [`Frame`] is the unit this layer passes to and from the RPC framework's
//! correlation engine: a correlation id, an opaque discriminator, and the
//! framework-level payload envelope. The adapter threads frames through
//! without interpreting their contents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque correlation id pairing a request with its eventual response.
///
/// Ids are minted by the correlation engine and are unique among *currently
/// outstanding* requests on a channel, not globally. Depending on the
/// framework version they may arrive as JSON numbers or strings, so both
/// shapes are preserved on the wire (serde untagged).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameId {
    Number(u64),
    Text(String),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Number(n) => write!(f, "{n}"),
            FrameId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for FrameId {
    fn from(n: u64) -> Self {
        FrameId::Number(n)
    }
}

impl From<String> for FrameId {
    fn from(s: String) -> Self {
        FrameId::Text(s)
    }
}

impl From<&str> for FrameId {
    fn from(s: &str) -> Self {
        FrameId::Text(s.to_owned())
    }
}

/// Opaque frame discriminator supplied by the correlation engine
/// (request, response, error, event chunk, ...).
///
/// The adapter never interprets the value, it only carries it through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameKind(pub u8);

/// Framework-level request/response envelope. Opaque to this layer.
pub type Payload = serde_json::Value;

/// The logical unit exchanged once a raw channel message is decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub id: FrameId,
    pub kind: FrameKind,
    pub payload: Payload,
}

impl Frame {
    /// Create a new frame.
    pub fn new(id: impl Into<FrameId>, kind: FrameKind, payload: Payload) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_id_serde_untagged() {
        let num: FrameId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(num, FrameId::Number(42));

        let text: FrameId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(text, FrameId::Text("42".into()));

        assert_eq!(serde_json::to_value(&num).unwrap(), json!(42));
        assert_eq!(serde_json::to_value(&text).unwrap(), json!("42"));
    }

    #[test]
    fn test_frame_id_display() {
        assert_eq!(FrameId::Number(7).to_string(), "7");
        assert_eq!(FrameId::from("abc").to_string(), "abc");
    }

    #[test]
    fn test_numeric_and_text_ids_are_distinct() {
        // "42" and 42 are different outstanding requests
        assert_ne!(FrameId::from(42), FrameId::from("42"));
    }

    #[test]
    fn test_frame_new() {
        let frame = Frame::new(1, FrameKind(0), json!({"x": 1}));
        assert_eq!(frame.id, FrameId::Number(1));
        assert_eq!(frame.kind, FrameKind(0));
        assert_eq!(frame.payload, json!({"x": 1}));
    }
}
