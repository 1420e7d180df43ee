//! Test doubles for the data channel transport.
//!
//! This crate provides the pieces the transport is injected with, in
//! in-memory form:
//!
//! - [`channel`]: an in-memory [`DataChannel`](orpc_webrtc_core::DataChannel)
//!   with scripted delivery and a connected-pair mode
//! - [`codec`]: a JSON frame codec with text and binary compact encodings
//! - [`engine`]: a minimal correlation engine (pending map, id counter)
//!
//! The end-to-end transport tests live in `tests/`.

pub mod channel;
pub mod codec;
pub mod engine;
