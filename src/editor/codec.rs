//! Lexical-compatible JSON snapshots.
//!
//! Decoding validates the whole tree before anything is built, so a bad
//! snapshot never yields a partial document.

use serde::{Deserialize, Serialize};

use super::node::{KindSet, Node, NodeData, NodeId, NodeKind, TextFormat, can_contain};
use super::state::{DocumentState, Selection};
use super::transaction::IdAllocator;
use crate::error::EditorError;

const FORMAT_VERSION: u32 = 1;

fn default_version() -> u32 {
    FORMAT_VERSION
}

fn default_start() -> u32 {
    1
}

fn default_mode() -> String {
    "normal".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub root: SnapshotNode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SnapshotNode {
    Root {
        #[serde(default)]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
    Paragraph {
        #[serde(default)]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
    Heading {
        tag: String,
        #[serde(default)]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
    List {
        #[serde(rename = "listType")]
        list_type: String,
        #[serde(default = "default_start")]
        start: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        #[serde(default)]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
    ListItem {
        #[serde(default = "default_start")]
        value: u32,
        #[serde(default)]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
    HorizontalRule {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
    Text {
        text: String,
        #[serde(default)]
        format: u32,
        #[serde(default)]
        detail: u32,
        #[serde(default = "default_mode")]
        mode: String,
        #[serde(default)]
        style: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<SnapshotNode>,
        #[serde(default = "default_version")]
        version: u32,
    },
}

impl SnapshotNode {
    fn children(&self) -> &[SnapshotNode] {
        match self {
            SnapshotNode::Root { children, .. }
            | SnapshotNode::Paragraph { children, .. }
            | SnapshotNode::Heading { children, .. }
            | SnapshotNode::List { children, .. }
            | SnapshotNode::ListItem { children, .. }
            | SnapshotNode::HorizontalRule { children, .. }
            | SnapshotNode::Text { children, .. } => children,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            SnapshotNode::Root { .. } => "root",
            SnapshotNode::Paragraph { .. } => "paragraph",
            SnapshotNode::Heading { .. } => "heading",
            SnapshotNode::List { .. } => "list",
            SnapshotNode::ListItem { .. } => "listitem",
            SnapshotNode::HorizontalRule { .. } => "horizontalrule",
            SnapshotNode::Text { .. } => "text",
        }
    }
}

impl Snapshot {
    pub fn from_json(input: &str) -> Result<Self, EditorError> {
        serde_json::from_str(input).map_err(|err| EditorError::MalformedSnapshot(err.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, EditorError> {
        serde_json::from_value(value).map_err(|err| EditorError::MalformedSnapshot(err.to_string()))
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn encode(state: &DocumentState) -> Snapshot {
    Snapshot {
        root: encode_node(state, state.root(), 0),
    }
}

fn encode_node(state: &DocumentState, id: NodeId, position: usize) -> SnapshotNode {
    let children = || -> Vec<SnapshotNode> {
        state
            .children(id)
            .iter()
            .enumerate()
            .map(|(index, child)| encode_node(state, *child, index))
            .collect()
    };
    let Some(node) = state.node(id) else {
        return SnapshotNode::Paragraph {
            children: Vec::new(),
            version: FORMAT_VERSION,
        };
    };
    match node.data() {
        NodeData::Root => SnapshotNode::Root {
            children: children(),
            version: FORMAT_VERSION,
        },
        NodeData::Paragraph => SnapshotNode::Paragraph {
            children: children(),
            version: FORMAT_VERSION,
        },
        NodeData::Heading { level } => SnapshotNode::Heading {
            tag: format!("h{level}"),
            children: children(),
            version: FORMAT_VERSION,
        },
        NodeData::List { ordered } => SnapshotNode::List {
            list_type: if *ordered { "number" } else { "bullet" }.to_string(),
            start: 1,
            tag: Some(if *ordered { "ol" } else { "ul" }.to_string()),
            children: children(),
            version: FORMAT_VERSION,
        },
        NodeData::ListItem => SnapshotNode::ListItem {
            value: position as u32 + 1,
            children: children(),
            version: FORMAT_VERSION,
        },
        NodeData::HorizontalRule => SnapshotNode::HorizontalRule {
            children: Vec::new(),
            version: FORMAT_VERSION,
        },
        NodeData::Text { text, format } => SnapshotNode::Text {
            text: text.clone(),
            format: format.bits(),
            detail: 0,
            mode: default_mode(),
            style: String::new(),
            children: Vec::new(),
            version: FORMAT_VERSION,
        },
    }
}

/// Build a document from a snapshot, or fail without side effects.
pub fn decode(snapshot: &Snapshot, kinds: &KindSet) -> Result<DocumentState, EditorError> {
    if !matches!(snapshot.root, SnapshotNode::Root { .. }) {
        return Err(EditorError::MalformedSnapshot(format!(
            "top-level node must be root, found {}",
            snapshot.root.type_name()
        )));
    }
    let mut ids = IdAllocator::new();
    let root = ids.allocate();
    let mut state = DocumentState::bare(root);
    for child in snapshot.root.children() {
        decode_into(&mut state, &mut ids, kinds, root, child)?;
    }
    state.selection = Selection::caret(state.first_caret());
    Ok(state)
}

fn node_data(node: &SnapshotNode) -> Result<NodeData, EditorError> {
    let data = match node {
        SnapshotNode::Root { .. } => {
            return Err(EditorError::MalformedSnapshot(
                "root may only appear at the top".to_string(),
            ));
        }
        SnapshotNode::Paragraph { .. } => NodeData::Paragraph,
        SnapshotNode::Heading { tag, .. } => {
            let level = tag
                .strip_prefix('h')
                .and_then(|digits| digits.parse::<u8>().ok())
                .filter(|level| (1..=6).contains(level))
                .ok_or_else(|| {
                    EditorError::MalformedSnapshot(format!("unknown heading tag {tag:?}"))
                })?;
            NodeData::heading(level)
        }
        SnapshotNode::List { list_type, .. } => match list_type.as_str() {
            "bullet" => NodeData::list(false),
            "number" => NodeData::list(true),
            other => {
                return Err(EditorError::MalformedSnapshot(format!(
                    "unsupported list type {other:?}"
                )));
            }
        },
        SnapshotNode::ListItem { .. } => NodeData::ListItem,
        SnapshotNode::HorizontalRule { .. } => NodeData::HorizontalRule,
        SnapshotNode::Text { text, format, .. } => {
            NodeData::formatted_text(text.clone(), TextFormat::from_bits(*format))
        }
    };
    Ok(data)
}

fn decode_into(
    state: &mut DocumentState,
    ids: &mut IdAllocator,
    kinds: &KindSet,
    parent: NodeId,
    node: &SnapshotNode,
) -> Result<(), EditorError> {
    let data = node_data(node)?;
    let kind = data.kind();
    if !kinds.contains(kind) {
        return Err(EditorError::MalformedSnapshot(format!(
            "node kind {kind} is not registered"
        )));
    }
    let parent_kind = state.kind(parent).unwrap_or(NodeKind::Root);
    if !can_contain(parent_kind, kind) {
        return Err(EditorError::MalformedSnapshot(format!(
            "{parent_kind} cannot contain {kind}"
        )));
    }
    if kind.is_leaf() && !node.children().is_empty() {
        return Err(EditorError::MalformedSnapshot(format!(
            "{kind} cannot contain children"
        )));
    }
    let id = ids.allocate();
    state.nodes.insert(id, Node::new(id, Some(parent), data));
    if let Some(parent_node) = state.nodes.get_mut(&parent) {
        parent_node.children.push(id);
    }
    for child in node.children() {
        decode_into(state, ids, kinds, id, child)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod codec_tests;
