//! Per-request wire format tracking.
//!
//! A response must go out in the encoding its request arrived in, and the
//! two peers may disagree per request (a legacy peer speaking verbose next
//! to a current one speaking compact). The registry holds `id -> format`
//! for exactly the requests that have been received but not yet answered;
//! the entry is deleted in the same step that reads it.
//!
//! Entries are keyed on the id's string rendering, not on [`FrameId`]
//! itself: framework versions disagree on whether ids travel as JSON
//! numbers or strings, and a response frame must find the entry its
//! request recorded even when the engine normalized the representation in
//! between.

use std::collections::HashMap;
use std::sync::Mutex;

use orpc_webrtc_core::{FrameId, WireFormat};

/// Short-lived table mapping in-flight correlation ids to the wire format
/// their request used.
#[derive(Default)]
pub struct FormatRegistry {
    entries: Mutex<HashMap<String, WireFormat>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the format a request arrived in.
    pub fn remember(&self, id: &FrameId, format: WireFormat) {
        self.lock().insert(id.to_string(), format);
    }

    /// Look up and delete the entry for a response id. `None` when the id
    /// was never recorded or the entry was already consumed.
    pub fn take(&self, id: &FrameId) -> Option<WireFormat> {
        self.lock().remove(&id.to_string())
    }

    /// Drop all entries. Called when the channel closes with requests still
    /// unanswered.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of received-but-unanswered requests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WireFormat>> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }
}
