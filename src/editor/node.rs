use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag of a node variant, used for containment checks and registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading,
    List,
    ListItem,
    HorizontalRule,
    Text,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Root,
        NodeKind::Paragraph,
        NodeKind::Heading,
        NodeKind::List,
        NodeKind::ListItem,
        NodeKind::HorizontalRule,
        NodeKind::Text,
    ];

    pub fn is_block(self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading | NodeKind::List | NodeKind::HorizontalRule
        )
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::HorizontalRule)
    }

    /// Kinds whose direct children are text runs the caret can sit in.
    pub fn holds_text(self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph | NodeKind::Heading | NodeKind::ListItem
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::List => "list",
            NodeKind::ListItem => "listitem",
            NodeKind::HorizontalRule => "horizontalrule",
            NodeKind::Text => "text",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn can_contain(parent: NodeKind, child: NodeKind) -> bool {
    match parent {
        NodeKind::Root => child.is_block(),
        NodeKind::Paragraph | NodeKind::Heading => child == NodeKind::Text,
        NodeKind::List => child == NodeKind::ListItem,
        NodeKind::ListItem => matches!(child, NodeKind::Text | NodeKind::List),
        NodeKind::Text | NodeKind::HorizontalRule => false,
    }
}

/// Registered node kinds for one editor instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindSet {
    kinds: Vec<NodeKind>,
}

impl KindSet {
    pub fn all() -> Self {
        Self {
            kinds: NodeKind::ALL.to_vec(),
        }
    }

    pub fn new(kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        let mut set = Self { kinds: Vec::new() };
        for kind in kinds {
            set.insert(kind);
        }
        set
    }

    pub fn insert(&mut self, kind: NodeKind) {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
            self.kinds.sort();
        }
    }

    pub fn contains(&self, kind: NodeKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl Default for KindSet {
    fn default() -> Self {
        Self::all()
    }
}

/// Inline formatting flags, bit-compatible with the Lexical text `format` field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextFormat(u32);

impl TextFormat {
    pub const PLAIN: TextFormat = TextFormat(0);
    pub const BOLD: TextFormat = TextFormat(1);
    pub const ITALIC: TextFormat = TextFormat(1 << 1);
    pub const STRIKETHROUGH: TextFormat = TextFormat(1 << 2);
    pub const UNDERLINE: TextFormat = TextFormat(1 << 3);
    pub const CODE: TextFormat = TextFormat(1 << 4);
    pub const SUBSCRIPT: TextFormat = TextFormat(1 << 5);
    pub const SUPERSCRIPT: TextFormat = TextFormat(1 << 6);
    pub const HIGHLIGHT: TextFormat = TextFormat(1 << 7);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_plain(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: TextFormat) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn union(self, other: TextFormat) -> Self {
        Self(self.0 | other.0)
    }

    pub fn without(self, other: TextFormat) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn toggled(self, other: TextFormat) -> Self {
        if self.contains(other) {
            self.without(other)
        } else {
            self.union(other)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Root,
    Paragraph,
    Heading { level: u8 },
    List { ordered: bool },
    ListItem,
    HorizontalRule,
    Text { text: String, format: TextFormat },
}

impl NodeData {
    pub fn text(text: impl Into<String>) -> Self {
        NodeData::Text {
            text: text.into(),
            format: TextFormat::PLAIN,
        }
    }

    pub fn formatted_text(text: impl Into<String>, format: TextFormat) -> Self {
        NodeData::Text {
            text: text.into(),
            format,
        }
    }

    pub fn heading(level: u8) -> Self {
        NodeData::Heading { level }
    }

    pub fn list(ordered: bool) -> Self {
        NodeData::List { ordered }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Root => NodeKind::Root,
            NodeData::Paragraph => NodeKind::Paragraph,
            NodeData::Heading { .. } => NodeKind::Heading,
            NodeData::List { .. } => NodeKind::List,
            NodeData::ListItem => NodeKind::ListItem,
            NodeData::HorizontalRule => NodeKind::HorizontalRule,
            NodeData::Text { .. } => NodeKind::Text,
        }
    }

    pub(crate) fn attributes_valid(&self) -> bool {
        match self {
            NodeData::Heading { level } => (1..=6).contains(level),
            _ => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) data: NodeData,
}

impl Node {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, data: NodeData) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            data,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn format(&self) -> Option<TextFormat> {
        match &self.data {
            NodeData::Text { format, .. } => Some(*format),
            _ => None,
        }
    }

    pub(crate) fn text_len(&self) -> usize {
        self.text().map(|text| text.chars().count()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_accepts_only_block_kinds() {
        for kind in NodeKind::ALL {
            assert_eq!(can_contain(NodeKind::Root, kind), kind.is_block(), "{kind}");
        }
    }

    #[test]
    fn leaves_contain_nothing() {
        for kind in NodeKind::ALL {
            assert!(!can_contain(NodeKind::Text, kind));
            assert!(!can_contain(NodeKind::HorizontalRule, kind));
        }
    }

    #[test]
    fn nothing_contains_root() {
        for kind in NodeKind::ALL {
            assert!(!can_contain(kind, NodeKind::Root));
        }
    }

    #[test]
    fn list_items_nest_lists_but_not_paragraphs() {
        assert!(can_contain(NodeKind::List, NodeKind::ListItem));
        assert!(can_contain(NodeKind::ListItem, NodeKind::List));
        assert!(!can_contain(NodeKind::ListItem, NodeKind::Paragraph));
        assert!(!can_contain(NodeKind::List, NodeKind::Text));
    }

    #[test]
    fn text_format_toggle_keeps_other_bits() {
        let format = TextFormat::BOLD.union(TextFormat::ITALIC);
        let toggled = format.toggled(TextFormat::BOLD);
        assert!(!toggled.contains(TextFormat::BOLD));
        assert!(toggled.contains(TextFormat::ITALIC));
        assert_eq!(toggled.toggled(TextFormat::BOLD), format);
    }
}
