//! Injected correlation-engine interfaces.
//!
//! The adapter does not track outstanding requests itself: correlation by id
//! lives in the RPC framework's peer objects. This module defines the narrow
//! seams the adapter is written against, so a concrete engine (or a test
//! double) can be supplied from outside.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::TransportError;
use crate::frame::{Frame, Payload};
use crate::wire::RawMessage;

/// Write callback a peer is bound with. Receives the frames the peer wants
/// on the wire; the adapter encodes and sends them.
pub type WriteFn = Arc<dyn Fn(Frame) -> BoxFuture<'static, ()> + Send + Sync>;

/// Request handler supplied by the RPC framework on the server side. Maps a
/// decoded request frame to the response frame for the same id.
pub type HandlerFn =
    Arc<dyn Fn(Frame) -> BoxFuture<'static, Result<Frame, TransportError>> + Send + Sync>;

/// The correlation engine's frame codec.
///
/// Compact is the framework's native encoding; the verbose side produces and
/// consumes the `{"i", "p"}` envelope. The adapter holds the codec opaque
/// and only routes messages to the right half.
#[async_trait]
pub trait FrameCodec: Send + Sync + 'static {
    /// Encode a frame in the native compact form. May yield text or binary
    /// depending on the payload shape.
    async fn encode_compact(&self, frame: Frame) -> Result<RawMessage, TransportError>;

    /// Decode a compact message. Async because multi-part binary payloads
    /// may need reassembly.
    async fn decode_compact(&self, raw: RawMessage) -> Result<Frame, TransportError>;

    /// Produce the verbose envelope value for a frame.
    fn serialize(&self, frame: &Frame) -> Result<Value, TransportError>;

    /// Rebuild a frame from a verbose envelope value.
    fn deserialize(&self, envelope: Value) -> Result<Frame, TransportError>;
}

/// Initiator-side correlation engine: mints request frames, matches response
/// frames to pending calls by id.
#[async_trait]
pub trait ClientPeer: Send + Sync + 'static {
    /// Register an outstanding request, emit its frame through the bound
    /// [`WriteFn`], and await the matching response payload.
    async fn request(&self, request: Payload) -> Result<Payload, TransportError>;

    /// Feed one decoded inbound frame to the engine, resolving the pending
    /// call it correlates with.
    async fn accept(&self, frame: Frame) -> Result<(), TransportError>;

    /// Release the engine. Every still-pending call must reject with a
    /// cancellation-classified error rather than hang.
    fn close(&self);
}

/// Responder-side correlation engine: drives the handler for one decoded
/// request frame and emits response frames through the bound [`WriteFn`].
#[async_trait]
pub trait ServerPeer: Send + Sync + 'static {
    /// Dispatch one decoded request frame to `handler`. Response frames
    /// (including the engine's own error frames) are delivered through the
    /// write callback this peer was bound with.
    async fn message(&self, frame: Frame, handler: &HandlerFn) -> Result<(), TransportError>;

    /// Release the engine and any per-request state it holds.
    fn close(&self);
}

/// Binds one initiator-side engine instance to a write callback. One bind
/// per channel binding.
pub trait BindClientPeer: Send + Sync + 'static {
    type Peer: ClientPeer;

    fn bind(&self, write: WriteFn) -> Arc<Self::Peer>;
}

/// Binds one responder-side engine instance to a write callback. One bind
/// per channel binding.
pub trait BindServerPeer: Send + Sync + 'static {
    type Peer: ServerPeer;

    fn bind(&self, write: WriteFn) -> Arc<Self::Peer>;
}
