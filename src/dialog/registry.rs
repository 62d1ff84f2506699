//! Early/confirmed dialog bookkeeping.
//!
//! Grounded on the (early, confirmed) distinction in the grounding crate's
//! `DialogState`/`DialogSession` (`dialog/types.rs`), adapted from a
//! session-to-dialog map into a per-session early-dialog-map plus single
//! confirmed slot.

use super::{Dialog, DialogId, DialogState};
use std::collections::HashMap;

/// Tracks the confirmed dialog and any early dialogs for one session.
#[derive(Debug, Default)]
pub struct DialogRegistry {
    confirmed: Option<Dialog>,
    early: HashMap<DialogId, Dialog>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an early dialog. A repeat call with an id already present is
    /// a no-op that returns success (§4.2).
    pub fn create_early(&mut self, id: DialogId) -> &Dialog {
        self.early.entry(id.clone()).or_insert_with(|| Dialog::new(id.clone(), DialogState::Early));
        self.early.get(&id).expect("just inserted")
    }

    pub fn get_early(&self, id: &DialogId) -> Option<&Dialog> {
        self.early.get(id)
    }

    pub fn get_early_mut(&mut self, id: &DialogId) -> Option<&mut Dialog> {
        self.early.get_mut(id)
    }

    pub fn confirmed(&self) -> Option<&Dialog> {
        self.confirmed.as_ref()
    }

    pub fn confirmed_mut(&mut self) -> Option<&mut Dialog> {
        self.confirmed.as_mut()
    }

    pub fn has_confirmed(&self) -> bool {
        self.confirmed.is_some()
    }

    /// Promote an early dialog to confirmed: a move, not a duplication
    /// (§4.2). If no early dialog exists for `id`, a fresh confirmed
    /// dialog is created directly (covers a 2xx arriving without a prior
    /// 1xx-with-tag).
    pub fn promote(&mut self, id: DialogId) -> &Dialog {
        let mut dialog = self.early.remove(&id).unwrap_or_else(|| Dialog::new(id.clone(), DialogState::Early));
        dialog.state = DialogState::Confirmed;
        self.confirmed = Some(dialog);
        self.confirmed.as_ref().expect("just set")
    }

    pub fn close_all(&mut self) {
        self.confirmed = None;
        self.early.clear();
    }
}
