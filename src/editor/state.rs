use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::node::{Node, NodeData, NodeId, NodeKind};

/// A caret position. The offset counts chars inside a Text node and child
/// slots inside any other node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub node: NodeId,
    pub offset: usize,
}

impl Point {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn caret(point: Point) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Immutable snapshot of a document tree and its selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentState {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) root: NodeId,
    pub(crate) selection: Selection,
}

impl DocumentState {
    /// Root with a single empty paragraph, caret inside the paragraph.
    pub(crate) fn empty(root: NodeId, paragraph: NodeId) -> Self {
        let mut nodes = BTreeMap::new();
        let mut root_node = Node::new(root, None, NodeData::Root);
        root_node.children.push(paragraph);
        nodes.insert(root, root_node);
        nodes.insert(paragraph, Node::new(paragraph, Some(root), NodeData::Paragraph));
        Self {
            nodes,
            root,
            selection: Selection::caret(Point::new(paragraph, 0)),
        }
    }

    pub(crate) fn bare(root: NodeId) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(root, Node::new(root, None, NodeData::Root));
        Self {
            nodes,
            root,
            selection: Selection::caret(Point::new(root, 0)),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn caret(&self) -> Option<Point> {
        self.selection
            .is_collapsed()
            .then_some(self.selection.focus)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(Node::kind)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(Node::parent)
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|child| *child == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|idx| self.children(parent).get(idx).copied())
    }

    /// Pre-order list of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        while let Some(parent) = self.parent(node) {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    /// The direct child of root that contains `id`.
    pub fn top_level_block(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let parent = self.parent(id)?;
            if parent == self.root {
                return Some(id);
            }
            id = parent;
        }
    }

    /// Blocks whose text children the caret can edit, in document order.
    pub fn text_blocks(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.kind(*id).is_some_and(NodeKind::holds_text))
            .collect()
    }

    pub fn text_children(&self, block: NodeId) -> Vec<NodeId> {
        self.children(block)
            .iter()
            .copied()
            .filter(|id| self.kind(*id) == Some(NodeKind::Text))
            .collect()
    }

    pub fn block_text(&self, block: NodeId) -> String {
        self.text_children(block)
            .into_iter()
            .filter_map(|id| self.node(id).and_then(Node::text))
            .collect()
    }

    pub fn block_text_len(&self, block: NodeId) -> usize {
        self.text_children(block)
            .into_iter()
            .filter_map(|id| self.node(id))
            .map(Node::text_len)
            .sum()
    }

    /// The text-holding block a point sits in.
    pub fn block_of(&self, point: Point) -> Option<NodeId> {
        match self.kind(point.node)? {
            NodeKind::Text => self.parent(point.node),
            kind if kind.holds_text() => Some(point.node),
            _ => None,
        }
    }

    /// Translate a point into a char offset within its block's text.
    pub fn block_offset(&self, point: Point) -> Option<(NodeId, usize)> {
        let block = self.block_of(point)?;
        let mut offset = 0;
        if point.node == block {
            for (index, child) in self.children(block).iter().enumerate() {
                if index >= point.offset {
                    break;
                }
                offset += self.node(*child).map(Node::text_len).unwrap_or(0);
            }
            return Some((block, offset));
        }
        for child in self.children(block) {
            if *child == point.node {
                let len = self.node(*child).map(Node::text_len).unwrap_or(0);
                return Some((block, offset + point.offset.min(len)));
            }
            offset += self.node(*child).map(Node::text_len).unwrap_or(0);
        }
        None
    }

    /// Inverse of [`DocumentState::block_offset`]. At a boundary between two
    /// runs the earlier run wins.
    pub fn point_at_block_offset(&self, block: NodeId, offset: usize) -> Point {
        let texts = self.text_children(block);
        let mut remaining = offset;
        let mut last = None;
        for id in texts {
            let len = self.node(id).map(Node::text_len).unwrap_or(0);
            if remaining <= len {
                return Point::new(id, remaining);
            }
            remaining -= len;
            last = Some((id, len));
        }
        match last {
            Some((id, len)) => Point::new(id, len),
            None => Point::new(block, 0),
        }
    }

    pub fn block_start(&self, block: NodeId) -> Point {
        self.point_at_block_offset(block, 0)
    }

    pub fn block_end(&self, block: NodeId) -> Point {
        self.point_at_block_offset(block, self.block_text_len(block))
    }

    pub fn first_caret(&self) -> Point {
        match self.text_blocks().first() {
            Some(block) => self.block_start(*block),
            None => Point::new(self.root, 0),
        }
    }

    pub fn last_caret(&self) -> Point {
        match self.text_blocks().last() {
            Some(block) => self.block_end(*block),
            None => Point::new(self.root, self.children(self.root).len()),
        }
    }

    /// Clamp a point into this state, falling back to the document end.
    pub(crate) fn normalize_point(&self, point: Point) -> Point {
        let Some(node) = self.node(point.node) else {
            return self.last_caret();
        };
        match node.kind() {
            NodeKind::Text => Point::new(point.node, point.offset.min(node.text_len())),
            NodeKind::HorizontalRule => match (node.parent, self.index_in_parent(point.node)) {
                (Some(parent), Some(index)) => Point::new(parent, index + 1),
                _ => self.last_caret(),
            },
            _ => Point::new(point.node, point.offset.min(node.children.len())),
        }
    }

    /// Tree shape, kinds, attributes and text are equal; ids and
    /// selection are ignored.
    pub fn structurally_eq(&self, other: &DocumentState) -> bool {
        fn same(a: &DocumentState, a_id: NodeId, b: &DocumentState, b_id: NodeId) -> bool {
            let (Some(left), Some(right)) = (a.node(a_id), b.node(b_id)) else {
                return false;
            };
            left.data == right.data
                && left.children.len() == right.children.len()
                && left
                    .children
                    .iter()
                    .zip(&right.children)
                    .all(|(l, r)| same(a, *l, b, *r))
        }
        same(self, self.root, other, other.root)
    }

    /// Blocks as lines of text; rules and empty blocks are skipped.
    pub fn plain_text(&self) -> String {
        self.text_blocks()
            .into_iter()
            .map(|block| self.block_text(block))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Compact one-line rendering of the tree, handy in assertions and logs.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(self.root, &mut out);
        out
    }

    fn write_outline(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text { text, format } if format.is_plain() => {
                let _ = write!(out, "{text:?}");
            }
            NodeData::Text { text, format } => {
                let _ = write!(out, "{text:?}/{}", format.bits());
            }
            NodeData::Heading { level } => {
                let _ = write!(out, "h{level}");
            }
            NodeData::List { ordered: true } => out.push_str("ol"),
            NodeData::List { ordered: false } => out.push_str("ul"),
            NodeData::ListItem => out.push_str("li"),
            NodeData::HorizontalRule => out.push_str("hr"),
            NodeData::Paragraph => out.push('p'),
            NodeData::Root => out.push_str("root"),
        }
        if node.children.is_empty() || node.kind().is_leaf() {
            return;
        }
        out.push('[');
        for (index, child) in node.children.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            self.write_outline(*child, out);
        }
        out.push(']');
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
