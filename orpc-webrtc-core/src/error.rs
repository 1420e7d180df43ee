//! Transport error types.
//!
//! This module provides [`TransportError`], the error vocabulary for the
//! data channel transport, and [`ErrorHook`], the single externally
//! observable reporting seam. Every error is isolated to the message that
//! produced it: the channel stays usable and other in-flight requests are
//! unaffected.

use std::sync::Arc;

use crate::frame::FrameId;

/// Coarse classification of a [`TransportError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A raw message could not be parsed in either wire format.
    Decode,
    /// The request handler failed while processing a decoded request.
    Dispatch,
    /// A frame could not be encoded for the wire.
    Encode,
    /// The channel closed (or the binding was disposed) with work in flight.
    Cancelled,
    /// The underlying channel rejected a send.
    Channel,
}

/// Errors surfaced by the data channel transport.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// Raw message could not be decoded. No correlation id is available
    /// when this is raised at the message boundary.
    #[error("decode error: {0}")]
    Decode(String),

    /// Handler failed while processing a successfully decoded request.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Frame could not be encoded in the requested wire format.
    #[error("encode error: {0}")]
    Encode(String),

    /// The channel closed or the binding was disposed while the request was
    /// outstanding. Distinguishable from [`Dispatch`](TransportError::Dispatch)
    /// so callers can decide whether to retry on a fresh channel.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The underlying channel refused an outbound message.
    #[error("channel error: {0}")]
    Channel(String),
}

impl TransportError {
    /// Create a decode error.
    pub fn decode<S: Into<String>>(message: S) -> Self {
        TransportError::Decode(message.into())
    }

    /// Create a dispatch error.
    pub fn dispatch<S: Into<String>>(message: S) -> Self {
        TransportError::Dispatch(message.into())
    }

    /// Create an encode error.
    pub fn encode<S: Into<String>>(message: S) -> Self {
        TransportError::Encode(message.into())
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        TransportError::Cancelled(message.into())
    }

    /// Create a channel error.
    pub fn channel<S: Into<String>>(message: S) -> Self {
        TransportError::Channel(message.into())
    }

    /// Get the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Decode(_) => ErrorKind::Decode,
            TransportError::Dispatch(_) => ErrorKind::Dispatch,
            TransportError::Encode(_) => ErrorKind::Encode,
            TransportError::Cancelled(_) => ErrorKind::Cancelled,
            TransportError::Channel(_) => ErrorKind::Channel,
        }
    }

    /// Whether this error came from channel closure rather than a failed
    /// request.
    ///
    /// Pending calls rejected this way may be retried on a fresh channel;
    /// dispatch failures generally should not be.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled(_))
    }
}

/// Hook invoked with every per-message failure.
///
/// The id is `None` when the failure occurred before a correlation id could
/// be extracted from the raw message. The hook must not panic; it is called
/// from inside the binding's event loop.
pub type ErrorHook = Arc<dyn Fn(&TransportError, Option<&FrameId>) + Send + Sync>;

/// Default error hook: log the failure and keep the channel alive.
///
/// A channel is never torn down just because one message failed.
pub fn default_error_hook() -> ErrorHook {
    Arc::new(|err, id| match id {
        Some(id) => tracing::warn!(%id, %err, "data channel message failed"),
        None => tracing::warn!(%err, "data channel message failed"),
    })
}
