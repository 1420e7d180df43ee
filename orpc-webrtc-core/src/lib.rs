//! Core protocol types for RPC over WebRTC data channels.
//!
//! This crate provides the shared vocabulary used by both the server
//! (`orpc-webrtc`) and client (`orpc-webrtc-client`) crates:
//!
//! - [`frame`]: the logical `(id, kind, payload)` unit exchanged with the
//!   RPC framework's correlation engine
//! - [`wire`]: the two wire encodings, structural format detection, and
//!   frame encoding/decoding
//! - [`peer`]: the injected correlation-engine and codec interfaces
//! - [`channel`]: the transport-facing data channel abstraction
//! - [`binding`]: the shared binding lifecycle (disposal funnel)
//! - [`error`]: transport error types and the error-reporting hook

mod binding;
mod channel;
mod error;
mod frame;
mod peer;
pub mod wire;

pub use binding::*;
pub use channel::*;
pub use error::*;
pub use frame::*;
pub use peer::*;
pub use wire::{RawMessage, WireFormat};
