//! Dialog Registry (§4.2)
//!
//! Tracks the confirmed dialog and any early dialogs for a session,
//! keyed by the composite (call-id, local-tag, remote-tag) id.

mod registry;

pub use registry::DialogRegistry;

use rsip::Uri;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite dialog identifier: call-id + local-tag + remote-tag.
///
/// For a UAC this is call-id+from-tag+to-tag; for a UAS it is
/// call-id+to-tag+from-tag (§4.2, §9 open question) — callers build the id
/// with the right (local, remote) ordering for their role via
/// [`DialogId::new`], which only cares about local vs. remote, not which
/// SIP header each came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(call_id: impl Into<String>, local_tag: impl Into<String>, remote_tag: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), local_tag: local_tag.into(), remote_tag: remote_tag.into() }
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.call_id, self.local_tag, self.remote_tag)
    }
}

/// Dialog lifecycle state (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Early,
    Confirmed,
}

/// A SIP dialog (RFC 3261 §12), exclusively owned by the session that
/// created it (§5).
#[derive(Debug, Clone)]
pub struct Dialog {
    pub id: DialogId,
    pub state: DialogState,
    pub remote_target: Option<Uri>,
    pub route_set: Vec<Uri>,
    pub local_cseq: u32,
    pub remote_cseq: Option<u32>,

    /// Set while a UAC-initiated re-INVITE/UPDATE transaction is pending a
    /// final response; blocks new re-offers (§4.3 eligibility).
    pub uac_pending_reply: bool,
    /// Set while a UAS-initiated re-INVITE/UPDATE transaction (one we
    /// received and haven't replied to yet) is pending; blocks new
    /// re-offers (§4.3 eligibility).
    pub uas_pending_reply: bool,
}

impl Dialog {
    pub fn new(id: DialogId, state: DialogState) -> Self {
        Self {
            id,
            state,
            remote_target: None,
            route_set: Vec::new(),
            local_cseq: 0,
            remote_cseq: None,
            uac_pending_reply: false,
            uas_pending_reply: false,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, DialogState::Confirmed)
    }

    pub fn next_local_cseq(&mut self) -> u32 {
        self.local_cseq += 1;
        self.local_cseq
    }

    /// RFC 3261 §12.2.1.2 — a re-INVITE/UPDATE that changes the remote
    /// target updates the dialog's notion of where to route further
    /// in-dialog requests.
    pub fn update_remote_target(&mut self, target: Uri) {
        self.remote_target = Some(target);
    }
}

/// Error constructing a dialog from a malformed SIP message (§4.2: "Dialog
/// construction can fail").
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to construct dialog: {reason}")]
pub struct DialogConstructionError {
    pub reason: String,
}
