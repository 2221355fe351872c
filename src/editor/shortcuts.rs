//! Markdown-style shortcuts: typing a marker at the start of a paragraph
//! rewrites the paragraph into a rule, heading or list, and closing a
//! wrapped span such as `**flour**` formats the text between the markers.

use tracing::trace;

use super::content;
use super::node::{NodeData, NodeId, NodeKind, TextFormat};
use super::state::DocumentState;
use super::transaction::{EditIntent, Transaction, Violation};
use super::{Commit, Origin};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The whole paragraph equals the marker, optionally followed by one
    /// space, with the caret at its end.
    Line(String),
    /// The text between paragraph start and caret equals the marker.
    Prefix(String),
    /// One or more digits followed by `". "`.
    Numbered,
    /// Text before the caret ends in `marker content marker`. Works in any
    /// text block, not only top-level paragraphs.
    Wrapped(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replacement {
    HorizontalRule,
    Heading(u8),
    List { ordered: bool },
    Format(TextFormat),
}

impl Replacement {
    pub fn produced_kinds(self) -> &'static [NodeKind] {
        match self {
            Replacement::HorizontalRule => &[NodeKind::HorizontalRule],
            Replacement::Heading(_) => &[NodeKind::Heading],
            Replacement::List { .. } => &[NodeKind::List, NodeKind::ListItem],
            Replacement::Format(_) => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortcutRule {
    pub trigger: Trigger,
    pub replacement: Replacement,
}

impl ShortcutRule {
    pub fn new(trigger: Trigger, replacement: Replacement) -> Self {
        Self {
            trigger,
            replacement,
        }
    }
}

/// Ordered rules; the first match wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortcutTable {
    rules: Vec<ShortcutRule>,
}

impl Default for ShortcutTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for marker in ["---", "***", "___"] {
            table = table.with_rule(ShortcutRule::new(
                Trigger::Line(marker.to_string()),
                Replacement::HorizontalRule,
            ));
        }
        for level in 1..=6u8 {
            let marker = format!("{} ", "#".repeat(usize::from(level)));
            table = table.with_rule(ShortcutRule::new(
                Trigger::Prefix(marker),
                Replacement::Heading(level),
            ));
        }
        for marker in ["- ", "* ", "+ "] {
            table = table.with_rule(ShortcutRule::new(
                Trigger::Prefix(marker.to_string()),
                Replacement::List { ordered: false },
            ));
        }
        table = table.with_rule(ShortcutRule::new(
            Trigger::Numbered,
            Replacement::List { ordered: true },
        ));
        // Longer markers first so `**` is not read as two italic markers.
        let inline = [
            ("***", TextFormat::BOLD.union(TextFormat::ITALIC)),
            ("**", TextFormat::BOLD),
            ("__", TextFormat::BOLD),
            ("~~", TextFormat::STRIKETHROUGH),
            ("`", TextFormat::CODE),
            ("*", TextFormat::ITALIC),
            ("_", TextFormat::ITALIC),
        ];
        for (marker, format) in inline {
            table = table.with_rule(ShortcutRule::new(
                Trigger::Wrapped(marker.to_string()),
                Replacement::Format(format),
            ));
        }
        table
    }
}

impl ShortcutTable {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: ShortcutRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ShortcutRule] {
        &self.rules
    }

    pub fn produced_kinds(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<NodeKind> = self
            .rules
            .iter()
            .flat_map(|rule| rule.replacement.produced_kinds().iter().copied())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

fn is_numbered_marker(text: &str) -> bool {
    text.strip_suffix(". ").is_some_and(|digits| {
        !digits.is_empty() && digits.len() <= 9 && digits.chars().all(|ch| ch.is_ascii_digit())
    })
}

/// Char offset where `marker content marker` starts in `before`, which
/// must end with the closing marker. The content may not be empty or
/// padded with whitespace, and the opening marker may not follow a word
/// char or another marker char.
fn wrapped_start(before: &str, marker: &str) -> Option<usize> {
    let inner = before.strip_suffix(marker)?;
    let open = inner.rfind(marker)?;
    let content = &inner[open + marker.len()..];
    let first = content.chars().next()?;
    let last = content.chars().next_back()?;
    if first.is_whitespace() || last.is_whitespace() {
        return None;
    }
    let lead = marker.chars().next()?;
    let preceding = inner[..open].chars().next_back();
    if preceding.is_some_and(|ch| ch == lead || ch.is_alphanumeric()) {
        return None;
    }
    Some(inner[..open].chars().count())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortcutMatch {
    pub block: NodeId,
    /// Char offset in the block where `matched` begins.
    pub start: usize,
    /// Text the replacement consumes: the leading marker of a paragraph,
    /// or a whole wrapped span including both markers.
    pub matched: String,
    /// Chars of each marker around a wrapped span; zero for block rules.
    pub marker_len: usize,
    pub replacement: Replacement,
}

impl ShortcutMatch {
    /// Rewrite the matched text. Aborts if the markers are no longer where
    /// they were found.
    pub fn apply(&self, tx: &mut Transaction<'_>) -> Result<(), Violation> {
        tx.set_intent(EditIntent::Shortcut);
        let state = tx.state();
        let kind_fits = match self.replacement {
            Replacement::Format(_) => state.kind(self.block).is_some_and(NodeKind::holds_text),
            _ => state.kind(self.block) == Some(NodeKind::Paragraph),
        };
        let text: String = state.block_text(self.block).chars().skip(self.start).collect();
        if !kind_fits || !text.starts_with(&self.matched) {
            return tx.abort("shortcut marker is gone");
        }
        let len = self.matched.chars().count();
        if let Replacement::Format(format) = self.replacement {
            let end = self.start + len;
            let closing = end - self.marker_len;
            content::remove_block_text(tx, self.block, closing, end)?;
            content::remove_block_text(tx, self.block, self.start, self.start + self.marker_len)?;
            let formatted_end = closing - self.marker_len;
            content::format_span(tx, self.block, self.start, formatted_end, format)?;
            return content::set_caret_between_runs(tx, self.block, formatted_end);
        }
        content::remove_block_text(tx, self.block, self.start, self.start + len)?;
        match self.replacement {
            Replacement::HorizontalRule => content::replace_with_rule(tx, self.block),
            Replacement::Heading(level) => {
                let heading = content::retype_block(tx, self.block, NodeData::heading(level))?;
                content::set_caret(tx, heading, 0)
            }
            Replacement::List { ordered } => {
                let item = content::convert_to_list(tx, self.block, ordered)?;
                content::set_caret(tx, item, 0)
            }
            Replacement::Format(_) => Ok(()),
        }
    }
}

/// Watches committed input and reports at most one shortcut per keystroke.
#[derive(Clone, Debug, Default)]
pub struct ShortcutTransformer {
    table: ShortcutTable,
}

impl ShortcutTransformer {
    pub fn new(table: ShortcutTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ShortcutTable {
        &self.table
    }

    /// Only text typed by the user triggers; follow-ups and restores never
    /// do, so an expansion cannot feed another one.
    pub fn evaluate(&self, commit: &Commit) -> Option<ShortcutMatch> {
        if commit.origin != Origin::Input
            || commit.intent != EditIntent::InsertText
            || !commit.change.changes_content()
        {
            return None;
        }
        let found = self.find_match(&commit.state);
        if let Some(found) = &found {
            trace!(block = %found.block, matched = %found.matched, "shortcut matched");
        }
        found
    }

    pub fn find_match(&self, state: &DocumentState) -> Option<ShortcutMatch> {
        let caret = state.caret()?;
        let (block, offset) = state.block_offset(caret)?;
        let text = state.block_text(block);
        let before: String = text.chars().take(offset).collect();
        // Block rules only fire while typing at the head of a top-level paragraph.
        let block_rules = state.kind(block) == Some(NodeKind::Paragraph)
            && state.parent(block) == Some(state.root())
            && state.children(block).first() == Some(&caret.node);
        let at_end = offset == state.block_text_len(block);

        self.table.rules.iter().find_map(|rule| {
            let (start, matched, marker_len) = match &rule.trigger {
                Trigger::Wrapped(marker) => {
                    let start = wrapped_start(&before, marker)?;
                    let matched: String = before.chars().skip(start).collect();
                    (start, matched, marker.chars().count())
                }
                _ if !block_rules => return None,
                Trigger::Line(marker) => {
                    let exact = text == *marker || text.strip_suffix(' ') == Some(marker.as_str());
                    (at_end && exact).then(|| (0, text.clone(), 0))?
                }
                Trigger::Prefix(marker) => (before == *marker).then(|| (0, before.clone(), 0))?,
                Trigger::Numbered => is_numbered_marker(&before).then(|| (0, before.clone(), 0))?,
            };
            Some(ShortcutMatch {
                block,
                start,
                matched,
                marker_len,
                replacement: rule.replacement,
            })
        })
    }
}
