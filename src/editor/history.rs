//! Linear undo/redo over whole document states.
//!
//! Consecutive text edits that share a group tag and arrive within the
//! coalescing window collapse into one entry; structural edits always open a
//! new one. Selection-only commits and restores are never recorded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use super::state::DocumentState;
use super::transaction::{ChangeKind, GroupTag};
use crate::config::HistoryConfig;

#[derive(Clone, Debug)]
struct Entry {
    state: Arc<DocumentState>,
    tag: Option<GroupTag>,
    coalescible: bool,
    at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recorded {
    Pushed,
    Merged,
    Skipped,
}

#[derive(Debug)]
pub struct History {
    base: Arc<DocumentState>,
    undo: Vec<Entry>,
    redo: Vec<Entry>,
    max_entries: usize,
    coalesce_window: Duration,
    merge_open: bool,
}

impl History {
    pub fn new(initial: Arc<DocumentState>, config: &HistoryConfig) -> Self {
        Self {
            base: initial,
            undo: Vec::new(),
            redo: Vec::new(),
            max_entries: config.max_entries.max(1),
            coalesce_window: config.coalesce_window,
            merge_open: false,
        }
    }

    /// Record the transition `previous -> next` produced by one commit.
    pub fn record(
        &mut self,
        previous: &Arc<DocumentState>,
        next: &Arc<DocumentState>,
        change: ChangeKind,
        tag: Option<&GroupTag>,
        at: Instant,
    ) -> Recorded {
        match change {
            ChangeKind::Restore => return Recorded::Skipped,
            ChangeKind::Selection => {
                self.merge_open = false;
                return Recorded::Skipped;
            }
            ChangeKind::Text | ChangeKind::Structural => {}
        }
        self.redo.clear();

        let coalescible = change == ChangeKind::Text && tag.is_some();
        if coalescible && self.merge_open {
            if let Some(top) = self.undo.last_mut() {
                let within_window = at.saturating_duration_since(top.at) <= self.coalesce_window;
                if top.coalescible
                    && top.tag.as_ref() == tag
                    && within_window
                    && Arc::ptr_eq(&top.state, previous)
                {
                    top.state = Arc::clone(next);
                    top.at = at;
                    trace!(depth = self.undo.len(), "merged into previous history entry");
                    return Recorded::Merged;
                }
            }
        }

        self.undo.push(Entry {
            state: Arc::clone(next),
            tag: tag.cloned(),
            coalescible,
            at,
        });
        self.merge_open = coalescible;
        while self.undo.len() > self.max_entries {
            let dropped = self.undo.remove(0);
            self.base = dropped.state;
        }
        trace!(depth = self.undo.len(), "pushed history entry");
        Recorded::Pushed
    }

    /// Step back one entry and return the state to restore.
    pub fn undo(&mut self) -> Option<Arc<DocumentState>> {
        let entry = self.undo.pop()?;
        self.redo.push(entry);
        self.merge_open = false;
        Some(
            self.undo
                .last()
                .map(|entry| Arc::clone(&entry.state))
                .unwrap_or_else(|| Arc::clone(&self.base)),
        )
    }

    pub fn redo(&mut self) -> Option<Arc<DocumentState>> {
        let entry = self.redo.pop()?;
        let state = Arc::clone(&entry.state);
        self.undo.push(entry);
        self.merge_open = false;
        Some(state)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Forget everything and treat `current` as the new baseline.
    pub fn clear(&mut self, current: Arc<DocumentState>) {
        self.base = current;
        self.undo.clear();
        self.redo.clear();
        self.merge_open = false;
    }
}
