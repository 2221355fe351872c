use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

mod codec;
mod content;
mod history;
mod node;
mod plugins;
mod shortcuts;
mod state;
mod transaction;

pub use codec::{Snapshot, SnapshotNode, decode, encode};
pub use content::{BlockType, CaretMove};
pub use history::{History, Recorded};
pub use node::{KindSet, Node, NodeData, NodeId, NodeKind, TextFormat, can_contain};
pub use plugins::{
    AutoFocus, Capabilities, ChangeNotifier, ErrorContainment, HistoryPlugin,
    HorizontalRuleCommand, MarkdownShortcuts, Plugin, PluginContext, PluginFault, PluginHost,
};
pub use shortcuts::{
    Replacement, ShortcutMatch, ShortcutRule, ShortcutTable, ShortcutTransformer, Trigger,
};
pub use state::{DocumentState, Point, Selection};
pub use transaction::{ChangeKind, EditIntent, GroupTag, Operation, Transaction, Violation};

use transaction::IdAllocator;

use crate::config::EditorConfig;
use crate::error::EditorError;

/// Follow-up requests drained per commit cycle before the rest are dropped.
const MAX_FOLLOWUPS: usize = 64;

/// Where a commit came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Input,
    Followup,
    History,
}

/// Delivered to every listener after a state transition.
#[derive(Clone, Debug)]
pub struct Commit {
    pub state: Arc<DocumentState>,
    pub previous: Arc<DocumentState>,
    pub change: ChangeKind,
    pub origin: Origin,
    pub intent: EditIntent,
    pub tag: Option<GroupTag>,
    pub operations: Vec<Operation>,
    pub revision: u64,
    /// Selection-only commits also happen while the editor is read-only.
    pub editable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Committed(Arc<DocumentState>),
    /// The builder succeeded but changed nothing.
    Unchanged(Arc<DocumentState>),
    /// The builder or a structural check refused; state is untouched.
    Rejected(Violation),
}

impl DispatchOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, DispatchOutcome::Committed(_))
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            DispatchOutcome::Rejected(violation) => Some(violation),
            _ => None,
        }
    }
}

pub type Builder = Box<dyn FnOnce(&mut Transaction<'_>) -> Result<(), Violation>>;

/// Deferred editor work, executed after the current commit's listeners
/// return.
pub enum Request {
    Transaction(Builder),
    Undo,
    Redo,
    Focus,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Transaction(_) => f.write_str("Transaction"),
            Request::Undo => f.write_str("Undo"),
            Request::Redo => f.write_str("Redo"),
            Request::Focus => f.write_str("Focus"),
        }
    }
}

/// Queue handed to listeners. Listeners never mutate the editor directly.
#[derive(Debug, Default)]
pub struct Followups {
    requests: Vec<Request>,
}

impl Followups {
    pub fn transaction<F>(&mut self, builder: F)
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<(), Violation> + 'static,
    {
        self.requests.push(Request::Transaction(Box::new(builder)));
    }

    pub fn push(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn extend(&mut self, requests: impl IntoIterator<Item = Request>) {
        self.requests.extend(requests);
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&Commit, &mut Followups)>;

/// Owns the current document state and is the only thing that replaces it.
pub struct Editor {
    state: Arc<DocumentState>,
    kinds: KindSet,
    ids: IdAllocator,
    history: History,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    editable: bool,
    focused: bool,
    revision: u64,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("revision", &self.revision)
            .field("editable", &self.editable)
            .field("focused", &self.focused)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Editor {
    /// Start from `snapshot`, or from a single empty paragraph.
    pub fn new(config: &EditorConfig, snapshot: Option<&Snapshot>) -> Result<Self, EditorError> {
        config.validate()?;
        let mut ids = IdAllocator::new();
        let state = match snapshot {
            Some(snapshot) => decode(snapshot, &config.kinds)?,
            None => {
                let root = ids.allocate();
                let paragraph = ids.allocate();
                DocumentState::empty(root, paragraph)
            }
        };
        ids.reserve_past(&state);
        let state = Arc::new(state);
        debug!(nodes = state.len(), editable = config.editable, "editor created");
        Ok(Self {
            history: History::new(Arc::clone(&state), &config.history),
            state,
            kinds: config.kinds.clone(),
            ids,
            listeners: Vec::new(),
            next_listener: 0,
            editable: config.editable,
            focused: false,
            revision: 0,
        })
    }

    pub fn state(&self) -> Arc<DocumentState> {
        Arc::clone(&self.state)
    }

    pub fn kinds(&self) -> &KindSet {
        &self.kinds
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn snapshot(&self) -> Snapshot {
        encode(&self.state)
    }

    /// Replace the document with a decoded snapshot and reset history.
    pub fn load(&mut self, snapshot: &Snapshot) -> Result<(), EditorError> {
        let state = decode(snapshot, &self.kinds)?;
        self.ids.reserve_past(&state);
        self.state = Arc::new(state);
        self.history.clear(Arc::clone(&self.state));
        self.revision += 1;
        debug!(nodes = self.state.len(), "snapshot loaded");
        Ok(())
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Commit, &mut Followups) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Run `builder` against a working copy and commit the result if every
    /// mutation passed validation.
    pub fn dispatch<F>(&mut self, builder: F) -> Result<DispatchOutcome, EditorError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<(), Violation>,
    {
        let mut queue = VecDeque::new();
        let outcome = self.commit_transaction(Origin::Input, builder, &mut queue)?;
        self.drain(queue);
        Ok(outcome)
    }

    /// Apply a queued request as if it came from input.
    pub fn apply(&mut self, request: Request) -> Result<DispatchOutcome, EditorError> {
        let mut queue = VecDeque::new();
        let outcome = self.apply_request(request, Origin::Input, &mut queue)?;
        self.drain(queue);
        Ok(outcome)
    }

    pub fn undo(&mut self) -> Result<Option<Arc<DocumentState>>, EditorError> {
        match self.apply(Request::Undo)? {
            DispatchOutcome::Committed(state) => Ok(Some(state)),
            _ => Ok(None),
        }
    }

    pub fn redo(&mut self) -> Result<Option<Arc<DocumentState>>, EditorError> {
        match self.apply(Request::Redo)? {
            DispatchOutcome::Committed(state) => Ok(Some(state)),
            _ => Ok(None),
        }
    }

    /// Focus never mutates the document, so it is allowed while read-only.
    pub fn focus(&mut self) {
        if !self.focused {
            debug!("editor focused");
        }
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    fn apply_request(
        &mut self,
        request: Request,
        origin: Origin,
        queue: &mut VecDeque<Request>,
    ) -> Result<DispatchOutcome, EditorError> {
        match request {
            Request::Transaction(builder) => self.commit_transaction(origin, builder, queue),
            Request::Undo => {
                self.ensure_editable()?;
                match self.history.undo() {
                    Some(state) => Ok(self.restore(state, queue)),
                    None => Ok(DispatchOutcome::Unchanged(self.state())),
                }
            }
            Request::Redo => {
                self.ensure_editable()?;
                match self.history.redo() {
                    Some(state) => Ok(self.restore(state, queue)),
                    None => Ok(DispatchOutcome::Unchanged(self.state())),
                }
            }
            Request::Focus => {
                self.focus();
                Ok(DispatchOutcome::Unchanged(self.state()))
            }
        }
    }

    fn ensure_editable(&self) -> Result<(), EditorError> {
        if self.editable {
            Ok(())
        } else {
            Err(EditorError::ReadOnly)
        }
    }

    fn commit_transaction<F>(
        &mut self,
        origin: Origin,
        builder: F,
        queue: &mut VecDeque<Request>,
    ) -> Result<DispatchOutcome, EditorError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<(), Violation>,
    {
        let working = DocumentState::clone(&self.state);
        let mut tx = Transaction::new(working, &self.kinds, &mut self.ids);
        if let Err(violation) = builder(&mut tx) {
            self.ensure_editable()?;
            debug!(%violation, ?origin, "transaction rejected");
            return Ok(DispatchOutcome::Rejected(violation));
        }
        let finished = tx.finish();
        let Some(change) = ChangeKind::classify(&finished.ops) else {
            return Ok(DispatchOutcome::Unchanged(self.state()));
        };
        // Read-only editors still let the caret and selection move.
        if change.changes_content() {
            self.ensure_editable()?;
        }

        let next = Arc::new(finished.state);
        let previous = std::mem::replace(&mut self.state, Arc::clone(&next));
        self.revision += 1;
        let recorded = self.history.record(
            &previous,
            &next,
            change,
            finished.tag.as_ref(),
            Instant::now(),
        );
        debug!(
            revision = self.revision,
            ?change,
            intent = ?finished.intent,
            ?origin,
            ?recorded,
            "transaction committed"
        );

        let commit = Commit {
            state: Arc::clone(&next),
            previous,
            change,
            origin,
            intent: finished.intent,
            tag: finished.tag,
            operations: finished.ops,
            revision: self.revision,
            editable: self.editable,
        };
        self.notify(&commit, queue);
        Ok(DispatchOutcome::Committed(next))
    }

    fn restore(&mut self, state: Arc<DocumentState>, queue: &mut VecDeque<Request>) -> DispatchOutcome {
        let previous = std::mem::replace(&mut self.state, Arc::clone(&state));
        self.revision += 1;
        debug!(revision = self.revision, "history restored");
        let commit = Commit {
            state: Arc::clone(&state),
            previous,
            change: ChangeKind::Restore,
            origin: Origin::History,
            intent: EditIntent::Other,
            tag: None,
            operations: Vec::new(),
            revision: self.revision,
            editable: self.editable,
        };
        self.notify(&commit, queue);
        DispatchOutcome::Committed(state)
    }

    fn notify(&mut self, commit: &Commit, queue: &mut VecDeque<Request>) {
        let mut followups = Followups::default();
        for (_, listener) in self.listeners.iter_mut() {
            listener(commit, &mut followups);
        }
        queue.extend(followups.requests);
    }

    fn drain(&mut self, mut queue: VecDeque<Request>) {
        let mut processed = 0;
        while let Some(request) = queue.pop_front() {
            if processed == MAX_FOLLOWUPS {
                warn!(
                    dropped = queue.len() + 1,
                    "follow-up limit reached; dropping remaining requests"
                );
                break;
            }
            processed += 1;
            match self.apply_request(request, Origin::Followup, &mut queue) {
                Ok(DispatchOutcome::Rejected(violation)) => {
                    debug!(%violation, "follow-up rejected");
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "follow-up skipped"),
            }
        }
    }
}

#[cfg(test)]
#[path = "editor_tests.rs"]
mod editor_tests;
