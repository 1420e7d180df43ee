//! Server-side RPC handler for WebRTC data channels.
//!
//! This crate upgrades a data channel so that an RPC framework's request
//! handler can serve calls arriving on it. The channel delivers raw
//! messages in one of two wire encodings; the handler detects the encoding
//! per message, dispatches the decoded request, and answers in the encoding
//! the request arrived in.
//!
//! ```ignore
//! use orpc_webrtc::DataChannelHandler;
//!
//! let handler = DataChannelHandler::new(engine_factory, codec);
//! let binding = handler.upgrade(channel, handle_fn);
//! // later, when the peer goes away:
//! binding.dispose();
//! ```

mod handler;
mod registry;

pub use handler::*;
pub use registry::*;

pub use orpc_webrtc_core::*;
