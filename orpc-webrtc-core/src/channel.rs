//! Transport-facing data channel abstraction.
//!
//! An `RTCDataChannel` delivers whole messages (text or binary) and fires a
//! close event; this module models that surface as a send method plus a
//! single-consumer event stream, so a binding owns exactly one receive loop
//! and disposal can deterministically stop dispatch.

use futures::stream::BoxStream;

use crate::error::TransportError;
use crate::wire::RawMessage;

/// One inbound channel event.
#[derive(Clone, Debug)]
pub enum ChannelEvent {
    /// A whole message arrived.
    Message(RawMessage),
    /// The channel closed. No further messages follow.
    Closed,
}

/// A message-oriented, bidirectional channel between two peers.
///
/// Implementations wrap a WebRTC data channel (or an in-memory double in
/// tests). A binding calls [`events`](DataChannel::events) once and consumes
/// the stream until [`ChannelEvent::Closed`] or disposal.
///
/// Binding the same channel twice without disposing the first binding is a
/// caller bug: both bindings would observe every message.
pub trait DataChannel: Send + Sync + 'static {
    /// Queue an outbound message.
    ///
    /// Errors indicate the channel is no longer usable for sending; they do
    /// not affect inbound processing.
    fn send(&self, message: RawMessage) -> Result<(), TransportError>;

    /// The inbound event stream for one binding.
    fn events(&self) -> BoxStream<'static, ChannelEvent>;
}
