//! JSON frame codec double.
//!
//! Compact is a JSON `[id, kind, payload]` triple, emitted as text or as
//! binary depending on how the codec is constructed; either way it never
//! carries the verbose envelope keys, so format detection classifies it
//! correctly. Verbose is `{"i": id, "p": {"k": kind, "b": payload}}`.

use async_trait::async_trait;
use bytes::Bytes;
use orpc_webrtc_core::{Frame, FrameCodec, FrameId, FrameKind, RawMessage, TransportError};
use serde_json::{Value, json};

pub struct TestCodec {
    binary: bool,
}

impl TestCodec {
    /// Compact messages go out as text.
    pub fn text() -> Self {
        Self { binary: false }
    }

    /// Compact messages go out as binary buffers.
    pub fn binary() -> Self {
        Self { binary: true }
    }
}

#[async_trait]
impl FrameCodec for TestCodec {
    async fn encode_compact(&self, frame: Frame) -> Result<RawMessage, TransportError> {
        let body = json!([frame.id, frame.kind.0, frame.payload]);
        if self.binary {
            let bytes =
                serde_json::to_vec(&body).map_err(|err| TransportError::encode(err.to_string()))?;
            Ok(RawMessage::Binary(Bytes::from(bytes)))
        } else {
            Ok(RawMessage::Text(body.to_string()))
        }
    }

    async fn decode_compact(&self, raw: RawMessage) -> Result<Frame, TransportError> {
        let value: Value = match raw {
            RawMessage::Text(text) => serde_json::from_str(&text)
                .map_err(|err| TransportError::decode(err.to_string()))?,
            RawMessage::Binary(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| TransportError::decode(err.to_string()))?,
            RawMessage::Value(_) => {
                return Err(TransportError::decode(
                    "pre-parsed message is not a compact encoding",
                ));
            }
        };
        let parts = value
            .as_array()
            .filter(|parts| parts.len() == 3)
            .ok_or_else(|| TransportError::decode("compact message is not a triple"))?;
        let id: FrameId = serde_json::from_value(parts[0].clone())
            .map_err(|err| TransportError::decode(err.to_string()))?;
        let kind = parts[1]
            .as_u64()
            .ok_or_else(|| TransportError::decode("compact message missing kind"))?;
        Ok(Frame::new(id, FrameKind(kind as u8), parts[2].clone()))
    }

    fn serialize(&self, frame: &Frame) -> Result<Value, TransportError> {
        Ok(json!({"i": frame.id, "p": {"k": frame.kind.0, "b": frame.payload}}))
    }

    fn deserialize(&self, envelope: Value) -> Result<Frame, TransportError> {
        let id = envelope
            .get("i")
            .cloned()
            .ok_or_else(|| TransportError::decode("envelope missing id"))?;
        let id: FrameId = serde_json::from_value(id)
            .map_err(|err| TransportError::decode(err.to_string()))?;
        let p = envelope
            .get("p")
            .ok_or_else(|| TransportError::decode("envelope missing payload"))?;
        let kind = p
            .get("k")
            .and_then(Value::as_u64)
            .ok_or_else(|| TransportError::decode("envelope missing kind"))?;
        let body = p.get("b").cloned().unwrap_or(Value::Null);
        Ok(Frame::new(id, FrameKind(kind as u8), body))
    }
}
