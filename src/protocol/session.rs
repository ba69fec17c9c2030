//! The three facts tracked per proxy: initialized, cached initialize
//! request, and the single most-recent in-flight request (spec §3, §4.3).

use bytes::Bytes;
use serde_json::Value;

use super::message::{ParsedMessage, PendingRequest};

#[derive(Default)]
pub struct SessionState {
    initialized: bool,
    initialize_request: Option<Bytes>,
    initialize_id: Option<Value>,
    pending_request: Option<PendingRequest>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn initialize_request(&self) -> Option<&Bytes> {
        self.initialize_request.as_ref()
    }

    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.pending_request.as_ref()
    }

    /// Update state from a frame read off the client's side of the wire.
    pub fn on_client_message(&mut self, parsed: &ParsedMessage, raw: &Bytes) {
        if let (Some(id), Some(method)) = (parsed.id.clone(), parsed.method.clone()) {
            self.pending_request = Some(PendingRequest { id, method });
        }
        if parsed.is_initialize() {
            self.initialize_request = Some(raw.clone());
            self.initialize_id = parsed.id.clone();
            self.initialized = false;
        }
    }

    /// Update state from a frame read off the server's side of the wire.
    pub fn on_server_message(&mut self, parsed: &ParsedMessage) {
        if let Some(id) = &parsed.id {
            if self.initialize_id.as_ref() == Some(id) && parsed.has_result && !parsed.has_error {
                self.initialized = true;
            }
            if self
                .pending_request
                .as_ref()
                .is_some_and(|p| &p.id == id)
            {
                self.pending_request = None;
            }
        }
    }

    /// Clears the pending request, e.g. after synthesizing a crash error
    /// for it.
    pub fn clear_pending(&mut self) {
        self.pending_request = None;
    }

    /// Forces `initialized` back to false without touching the cached
    /// initialize request. Used on `connect_server`: a freshly attached
    /// child has not seen the handshake yet, even though the client's
    /// session logically continues (spec §4.4).
    pub fn force_uninitialized(&mut self) {
        self.initialized = false;
    }

    /// Resets all three facts. Used on `shutdown`; resetting
    /// `initialize_request` always resets `initialized` too (spec §3
    /// invariant).
    pub fn reset(&mut self) {
        self.initialized = false;
        self.initialize_request = None;
        self.initialize_id = None;
        self.pending_request = None;
    }
}
