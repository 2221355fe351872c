//! Conversion of a document state into `tdoc` documents and plain recipe
//! step lines.

use tdoc::{Document, InlineStyle, Paragraph, Span, markdown, writer::Writer};

use crate::editor::{DocumentState, NodeData, NodeId, NodeKind, TextFormat};
use crate::error::EditorError;

/// Formats in the order they nest, outermost first. Formats with no inline
/// style in `tdoc` are dropped.
const STYLE_ORDER: [(TextFormat, InlineStyle); 5] = [
    (TextFormat::BOLD, InlineStyle::Bold),
    (TextFormat::ITALIC, InlineStyle::Italic),
    (TextFormat::UNDERLINE, InlineStyle::Underline),
    (TextFormat::STRIKETHROUGH, InlineStyle::Strike),
    (TextFormat::HIGHLIGHT, InlineStyle::Highlight),
];

fn styled_span(text: &str, format: TextFormat) -> Span {
    if format.contains(TextFormat::CODE) {
        let mut span = Span::new_text(text);
        span.style = InlineStyle::Code;
        return span;
    }
    let styles: Vec<InlineStyle> = STYLE_ORDER
        .iter()
        .filter(|(flag, _)| format.contains(*flag))
        .map(|(_, style)| *style)
        .collect();
    let Some((innermost, outer)) = styles.split_last() else {
        return Span::new_text(text);
    };
    let mut span = Span::new_text(text);
    span.style = *innermost;
    for style in outer.iter().rev() {
        let mut wrapper = Span::new_text("");
        wrapper.style = *style;
        wrapper.children = vec![span];
        span = wrapper;
    }
    span
}

fn inline_content(state: &DocumentState, block: NodeId) -> Vec<Span> {
    let content: Vec<Span> = state
        .text_children(block)
        .into_iter()
        .filter_map(|id| state.node(id))
        .filter_map(|node| match node.data() {
            NodeData::Text { text, format } if !text.is_empty() => Some(styled_span(text, *format)),
            _ => None,
        })
        .collect();
    if content.is_empty() {
        vec![Span::new_text("")]
    } else {
        content
    }
}

fn list_entries(state: &DocumentState, list: NodeId) -> Vec<Vec<Paragraph>> {
    state
        .children(list)
        .iter()
        .map(|item| {
            let mut entry = vec![Paragraph::Text {
                content: inline_content(state, *item),
            }];
            entry.extend(
                state
                    .children(*item)
                    .iter()
                    .filter(|child| state.kind(**child) == Some(NodeKind::List))
                    .filter_map(|child| block_paragraph(state, *child)),
            );
            entry
        })
        .collect()
}

fn block_paragraph(state: &DocumentState, block: NodeId) -> Option<Paragraph> {
    let node = state.node(block)?;
    let paragraph = match node.data() {
        NodeData::Paragraph => Paragraph::Text {
            content: inline_content(state, block),
        },
        NodeData::Heading { level } => {
            let content = inline_content(state, block);
            match level {
                1 => Paragraph::Header1 { content },
                2 => Paragraph::Header2 { content },
                _ => Paragraph::Header3 { content },
            }
        }
        NodeData::List { ordered: true } => Paragraph::OrderedList {
            entries: list_entries(state, block),
        },
        NodeData::List { ordered: false } => Paragraph::UnorderedList {
            entries: list_entries(state, block),
        },
        // tdoc has no rule paragraph.
        NodeData::HorizontalRule => return None,
        NodeData::Root | NodeData::ListItem | NodeData::Text { .. } => return None,
    };
    Some(paragraph)
}

/// Lossy conversion: rules are dropped and headings deeper than three
/// levels collapse into level three.
pub fn to_tdoc(state: &DocumentState) -> Document {
    let paragraphs = state
        .children(state.root())
        .iter()
        .filter_map(|block| block_paragraph(state, *block))
        .collect();
    Document::new().with_paragraphs(paragraphs)
}

pub fn to_markdown(state: &DocumentState) -> Result<String, EditorError> {
    let mut contents = Vec::new();
    markdown::write(&mut contents, &to_tdoc(state))
        .map_err(|err| EditorError::Export(format!("failed to render Markdown: {err}")))?;
    String::from_utf8(contents)
        .map_err(|err| EditorError::Export(format!("Markdown output is not UTF-8: {err}")))
}

pub fn to_ftml(state: &DocumentState) -> Result<String, EditorError> {
    Writer::new()
        .write_to_string(&to_tdoc(state))
        .map_err(|err| EditorError::Export(format!("failed to render FTML: {err}")))
}

/// One line per non-empty text block, list items included, in document
/// order. This is the flat form recipe steps are stored in alongside the
/// snapshot.
pub fn step_lines(state: &DocumentState) -> Vec<String> {
    state
        .text_blocks()
        .into_iter()
        .map(|block| state.block_text(block).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
