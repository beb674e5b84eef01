//! Bounded undo/redo log over wizard-state snapshots.
//!
//! A ring of deep copies with a cursor: pushing truncates the redo tail,
//! appends, and evicts the oldest entry once capacity is exceeded. Undo and
//! redo only move the cursor; the caller replaces live state with the
//! returned snapshot.

use crate::state::WizardState;

/// Default retained snapshot count.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct HistoryStack {
    entries: Vec<WizardState>,
    /// Index of the entry representing current state, when non-empty.
    cursor: usize,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor + 1 < self.entries.len()
    }

    /// Record a new snapshot. Any redo tail beyond the cursor is discarded;
    /// the oldest entry is evicted once capacity is exceeded.
    pub fn push(&mut self, state: &WizardState) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(state.clone());
        self.cursor = self.entries.len() - 1;

        if self.entries.len() > self.capacity {
            self.entries.remove(0);
            self.cursor -= 1;
        }
    }

    /// Step back one snapshot, if any remain.
    pub fn undo(&mut self) -> Option<WizardState> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].clone())
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self) -> Option<WizardState> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].clone())
    }
}
