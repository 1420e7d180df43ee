//! Wire format detection and frame encoding/decoding.
//!
//! Two encodings travel on a data channel:
//!
//! - **Compact**: the RPC framework's native encoding. May be a non-JSON
//!   string or a binary buffer; its internal shape is opaque to this layer
//!   and is handled by the injected [`FrameCodec`].
//! - **Verbose**: a UTF-8 JSON string `{"i": <id>, "p": <payload>}`, kept
//!   for cross-version compatibility and debuggability.
//!
//! There is no format header on the wire, so detection is structural: a
//! binary message is always Compact, and a text message is Verbose exactly
//! when it parses as a JSON object carrying both the `"i"` and `"p"` keys.

use bytes::Bytes;
use serde_json::Value;

use crate::error::TransportError;
use crate::frame::Frame;
use crate::peer::FrameCodec;

/// A raw message as delivered by (or sent on) the channel.
///
/// Some transports deliver already-parsed objects instead of text, so that
/// shape is accepted alongside text and binary.
#[derive(Clone, Debug)]
pub enum RawMessage {
    Text(String),
    Binary(Bytes),
    Value(Value),
}

/// The wire encoding a raw message used. Exactly one of the two describes
/// any given message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// The framework's native encoding.
    Compact,
    /// The JSON `{"i", "p"}` compatibility encoding.
    Verbose,
}

/// Whether a parsed value is a verbose envelope: a JSON object with both
/// the `"i"` and `"p"` keys.
///
/// A compact-encoded string that happens to parse this way is
/// misclassified; the framing carries no header to disambiguate, so the
/// structural probe is the contract.
fn is_envelope(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("i") && obj.contains_key("p"))
}

/// Decide which wire encoding a raw message used.
pub fn detect(raw: &RawMessage) -> WireFormat {
    match raw {
        RawMessage::Binary(_) => WireFormat::Compact,
        RawMessage::Value(value) => {
            if is_envelope(value) {
                WireFormat::Verbose
            } else {
                WireFormat::Compact
            }
        }
        RawMessage::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) if is_envelope(&value) => WireFormat::Verbose,
            _ => WireFormat::Compact,
        },
    }
}

/// Decode a raw message into a frame, reporting the encoding it arrived in.
///
/// Verbose messages go through the codec's envelope deserializer; compact
/// messages go through its native decoder, which is async because it may
/// need to reassemble multi-part binary payloads. Pre-parsed values are
/// always treated as envelopes.
pub async fn decode(
    raw: RawMessage,
    codec: &dyn FrameCodec,
) -> Result<(Frame, WireFormat), TransportError> {
    match raw {
        RawMessage::Binary(_) => {
            let frame = codec.decode_compact(raw).await?;
            Ok((frame, WireFormat::Compact))
        }
        RawMessage::Value(value) => {
            let format = if is_envelope(&value) {
                WireFormat::Verbose
            } else {
                WireFormat::Compact
            };
            let frame = codec.deserialize(value)?;
            Ok((frame, format))
        }
        RawMessage::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) if is_envelope(&value) => {
                let frame = codec.deserialize(value)?;
                Ok((frame, WireFormat::Verbose))
            }
            _ => {
                let frame = codec.decode_compact(RawMessage::Text(text)).await?;
                Ok((frame, WireFormat::Compact))
            }
        },
    }
}

/// Encode a frame for the wire in the given encoding.
///
/// Verbose always produces a JSON text message; compact may produce text or
/// binary depending on the payload shape, at the codec's discretion.
pub async fn encode(
    frame: Frame,
    format: WireFormat,
    codec: &dyn FrameCodec,
) -> Result<RawMessage, TransportError> {
    match format {
        WireFormat::Verbose => {
            let envelope = codec.serialize(&frame)?;
            let text = serde_json::to_string(&envelope)
                .map_err(|err| TransportError::encode(err.to_string()))?;
            Ok(RawMessage::Text(text))
        }
        WireFormat::Compact => codec.encode_compact(frame).await,
    }
}
