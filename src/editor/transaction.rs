use thiserror::Error;

use super::node::{KindSet, Node, NodeData, NodeId, NodeKind, TextFormat, can_contain};
use super::state::{DocumentState, Selection};

/// Why a transaction was refused. A refused transaction never commits.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    #[error("{parent} cannot contain {child}")]
    IllegalChild { parent: NodeKind, child: NodeKind },

    #[error("node kind {0} is not registered")]
    UnregisteredKind(NodeKind),

    #[error("the root node cannot be removed or moved")]
    RootMutation,

    #[error("invalid attributes for {0}")]
    InvalidAttributes(NodeKind),

    #[error("cannot change a {from} into a {to} in place")]
    KindChange { from: NodeKind, to: NodeKind },

    #[error("index {index} is out of range for {parent}")]
    IndexOutOfRange { parent: NodeId, index: usize },

    #[error("moving {0} would create a cycle")]
    Cycle(NodeId),

    #[error("node {0} is not a text node")]
    NotText(NodeId),

    #[error("transaction aborted: {0}")]
    Aborted(String),
}

/// Mutation intent, used for shortcut triggering and history grouping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditIntent {
    InsertText,
    DeleteBackward,
    DeleteForward,
    ParagraphBreak,
    InsertRule,
    Format,
    Shortcut,
    Selection,
    #[default]
    Other,
}

/// Merge-group key for history coalescing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupTag(String);

impl GroupTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn typing(block: NodeId) -> Self {
        Self(format!("insert:{}", block.raw()))
    }

    pub fn deleting(block: NodeId) -> Self {
        Self(format!("delete:{}", block.raw()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Insert {
        id: NodeId,
        parent: NodeId,
        index: usize,
        kind: NodeKind,
    },
    Remove {
        id: NodeId,
        kind: NodeKind,
    },
    SetText {
        id: NodeId,
    },
    SetFormat {
        id: NodeId,
    },
    Update {
        id: NodeId,
        kind: NodeKind,
    },
    Move {
        id: NodeId,
        parent: NodeId,
        index: usize,
    },
    SetSelection(Selection),
}

/// What a committed batch of operations touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Only the selection moved.
    Selection,
    /// Only text runs were inserted, removed or edited.
    Text,
    Structural,
    /// Whole-state replacement by undo or redo.
    Restore,
}

impl ChangeKind {
    pub fn classify(ops: &[Operation]) -> Option<ChangeKind> {
        if ops.is_empty() {
            return None;
        }
        let mut kind = ChangeKind::Selection;
        for op in ops {
            match op {
                Operation::SetSelection(_) => {}
                Operation::SetText { .. }
                | Operation::Insert {
                    kind: NodeKind::Text,
                    ..
                }
                | Operation::Remove {
                    kind: NodeKind::Text,
                    ..
                } => kind = ChangeKind::Text,
                _ => return Some(ChangeKind::Structural),
            }
        }
        Some(kind)
    }

    pub fn changes_content(self) -> bool {
        !matches!(self, ChangeKind::Selection)
    }
}

/// Monotonic id source owned by the controller; ids handed out are never
/// handed out again, even when their transaction is rejected.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self { next: 1 }
    }

    pub(crate) fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    pub(crate) fn reserve_past(&mut self, state: &DocumentState) {
        if let Some(max) = state.nodes.keys().next_back() {
            self.next = self.next.max(max.0 + 1);
        }
    }
}

/// Working copy handed to a transaction builder. Every mutation is checked
/// against the node model as it is recorded.
pub struct Transaction<'a> {
    state: DocumentState,
    kinds: &'a KindSet,
    ids: &'a mut IdAllocator,
    ops: Vec<Operation>,
    intent: EditIntent,
    tag: Option<GroupTag>,
}

pub(crate) struct Finished {
    pub(crate) state: DocumentState,
    pub(crate) ops: Vec<Operation>,
    pub(crate) intent: EditIntent,
    pub(crate) tag: Option<GroupTag>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(state: DocumentState, kinds: &'a KindSet, ids: &'a mut IdAllocator) -> Self {
        Self {
            state,
            kinds,
            ids,
            ops: Vec::new(),
            intent: EditIntent::Other,
            tag: None,
        }
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn intent(&self) -> EditIntent {
        self.intent
    }

    pub fn set_intent(&mut self, intent: EditIntent) {
        self.intent = intent;
    }

    pub fn set_tag(&mut self, tag: GroupTag) {
        self.tag = Some(tag);
    }

    pub fn abort<T>(&self, reason: impl Into<String>) -> Result<T, Violation> {
        Err(Violation::Aborted(reason.into()))
    }

    fn node(&self, id: NodeId) -> Result<&Node, Violation> {
        self.state.node(id).ok_or(Violation::MissingNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, Violation> {
        self.state.nodes.get_mut(&id).ok_or(Violation::MissingNode(id))
    }

    fn check_child(&self, parent: NodeKind, child: NodeKind) -> Result<(), Violation> {
        if !self.kinds.contains(child) {
            return Err(Violation::UnregisteredKind(child));
        }
        if !can_contain(parent, child) {
            return Err(Violation::IllegalChild { parent, child });
        }
        Ok(())
    }

    pub fn insert(
        &mut self,
        parent: NodeId,
        index: usize,
        data: NodeData,
    ) -> Result<NodeId, Violation> {
        let parent_node = self.node(parent)?;
        let kind = data.kind();
        self.check_child(parent_node.kind(), kind)?;
        if !data.attributes_valid() {
            return Err(Violation::InvalidAttributes(kind));
        }
        if index > parent_node.children.len() {
            return Err(Violation::IndexOutOfRange { parent, index });
        }
        let id = self.ids.allocate();
        self.state.nodes.insert(id, Node::new(id, Some(parent), data));
        self.node_mut(parent)?.children.insert(index, id);
        self.ops.push(Operation::Insert {
            id,
            parent,
            index,
            kind,
        });
        Ok(id)
    }

    pub fn append(&mut self, parent: NodeId, data: NodeData) -> Result<NodeId, Violation> {
        let index = self.node(parent)?.children.len();
        self.insert(parent, index, data)
    }

    pub fn insert_before(&mut self, sibling: NodeId, data: NodeData) -> Result<NodeId, Violation> {
        let (parent, index) = self.position(sibling)?;
        self.insert(parent, index, data)
    }

    pub fn insert_after(&mut self, sibling: NodeId, data: NodeData) -> Result<NodeId, Violation> {
        let (parent, index) = self.position(sibling)?;
        self.insert(parent, index + 1, data)
    }

    fn position(&self, id: NodeId) -> Result<(NodeId, usize), Violation> {
        let node = self.node(id)?;
        let parent = node.parent.ok_or(Violation::RootMutation)?;
        let index = self
            .state
            .index_in_parent(id)
            .ok_or(Violation::MissingNode(id))?;
        Ok((parent, index))
    }

    /// Removes `id` together with its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), Violation> {
        let (parent, index) = self.position(id)?;
        let kind = self.node(id)?.kind();
        for descendant in self.state.descendants(id) {
            self.state.nodes.remove(&descendant);
        }
        self.node_mut(parent)?.children.remove(index);
        self.ops.push(Operation::Remove { id, kind });
        Ok(())
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<(), Violation> {
        let node = self.node_mut(id)?;
        let NodeData::Text { text: current, .. } = &mut node.data else {
            return Err(Violation::NotText(id));
        };
        *current = text.into();
        self.ops.push(Operation::SetText { id });
        Ok(())
    }

    pub fn set_format(&mut self, id: NodeId, format: TextFormat) -> Result<(), Violation> {
        let node = self.node_mut(id)?;
        let NodeData::Text { format: current, .. } = &mut node.data else {
            return Err(Violation::NotText(id));
        };
        *current = format;
        self.ops.push(Operation::SetFormat { id });
        Ok(())
    }

    /// Replaces the attributes of a node without changing its kind.
    pub fn update(&mut self, id: NodeId, data: NodeData) -> Result<(), Violation> {
        let from = self.node(id)?.kind();
        let to = data.kind();
        if from != to {
            return Err(Violation::KindChange { from, to });
        }
        if !data.attributes_valid() {
            return Err(Violation::InvalidAttributes(to));
        }
        self.node_mut(id)?.data = data;
        self.ops.push(Operation::Update { id, kind: to });
        Ok(())
    }

    /// Moves `id` under `parent`; `index` is taken after detaching the node.
    pub fn move_node(&mut self, id: NodeId, parent: NodeId, index: usize) -> Result<(), Violation> {
        let (old_parent, old_index) = self.position(id)?;
        let kind = self.node(id)?.kind();
        let parent_kind = self.node(parent)?.kind();
        if parent == id || self.state.is_ancestor(id, parent) {
            return Err(Violation::Cycle(id));
        }
        self.check_child(parent_kind, kind)?;
        let mut len = self.node(parent)?.children.len();
        if parent == old_parent {
            len -= 1;
        }
        if index > len {
            return Err(Violation::IndexOutOfRange { parent, index });
        }
        self.node_mut(old_parent)?.children.remove(old_index);
        self.node_mut(parent)?.children.insert(index, id);
        self.node_mut(id)?.parent = Some(parent);
        self.ops.push(Operation::Move { id, parent, index });
        Ok(())
    }

    /// Moves every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> Result<(), Violation> {
        let children = self.node(from)?.children.clone();
        for child in children {
            let index = self.node(to)?.children.len();
            self.move_node(child, to, index)?;
        }
        Ok(())
    }

    /// Swaps `id` for a new node of a possibly different kind at the same
    /// position, carrying the children over.
    pub fn replace(&mut self, id: NodeId, data: NodeData) -> Result<NodeId, Violation> {
        let replacement = self.insert_before(id, data)?;
        self.move_children(id, replacement)?;
        self.remove(id)?;
        Ok(replacement)
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<(), Violation> {
        for point in [selection.anchor, selection.focus] {
            self.node(point.node)?;
        }
        self.state.selection = selection;
        self.ops.push(Operation::SetSelection(selection));
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Finished {
        let selection = self.state.selection;
        self.state.selection = Selection::range(
            self.state.normalize_point(selection.anchor),
            self.state.normalize_point(selection.focus),
        );
        Finished {
            state: self.state,
            ops: self.ops,
            intent: self.intent,
            tag: self.tag,
        }
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod transaction_tests;
