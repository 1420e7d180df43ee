//! Client-side RPC link for WebRTC data channels.
//!
//! This crate lets an RPC framework's client issue calls over a data
//! channel as if it were a normal call-and-await transport: many calls may
//! be in flight at once, responses are matched to calls by correlation id,
//! and closing the channel rejects every pending call instead of letting
//! it hang.
//!
//! ```ignore
//! use orpc_webrtc_client::LinkBuilder;
//!
//! let link = LinkBuilder::new(engine_factory, codec).connect(channel);
//! let response = link.call(request).await?;
//! link.close();
//! ```

mod link;

pub use link::*;

pub use orpc_webrtc_core::*;
