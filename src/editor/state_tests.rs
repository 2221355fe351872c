use super::*;
use crate::editor::node::{KindSet, TextFormat};
use crate::editor::transaction::{IdAllocator, Transaction};

fn recipe() -> DocumentState {
    let mut ids = IdAllocator::new();
    let root = ids.allocate();
    let paragraph = ids.allocate();
    let kinds = KindSet::all();
    let mut tx = Transaction::new(DocumentState::empty(root, paragraph), &kinds, &mut ids);
    tx.append(paragraph, NodeData::text("Soft ")).unwrap();
    tx.append(paragraph, NodeData::formatted_text("butter", TextFormat::BOLD))
        .unwrap();
    tx.append(root, NodeData::HorizontalRule).unwrap();
    let list = tx.append(root, NodeData::list(false)).unwrap();
    let item = tx.append(list, NodeData::ListItem).unwrap();
    tx.append(item, NodeData::text("flour")).unwrap();
    tx.finish().state
}

#[test]
fn empty_state_has_one_paragraph() {
    let state = DocumentState::empty(NodeId(1), NodeId(2));
    assert_eq!(state.outline(), "root[p]");
    assert_eq!(state.caret(), Some(Point::new(NodeId(2), 0)));
    assert!(!state.is_empty());
    assert!(DocumentState::bare(NodeId(1)).is_empty());
}

#[test]
fn outline_shows_formats_and_blocks() {
    let state = recipe();
    assert_eq!(
        state.outline(),
        "root[p[\"Soft \", \"butter\"/1], hr, ul[li[\"flour\"]]]"
    );
}

#[test]
fn text_blocks_follow_document_order() {
    let state = recipe();
    let texts: Vec<String> = state
        .text_blocks()
        .into_iter()
        .map(|block| state.block_text(block))
        .collect();
    assert_eq!(texts, vec!["Soft butter".to_string(), "flour".to_string()]);
    assert_eq!(state.plain_text(), "Soft butter\nflour");
}

#[test]
fn block_offsets_span_runs() {
    let state = recipe();
    let paragraph = state.text_blocks()[0];
    let runs = state.text_children(paragraph);
    let (block, offset) = state.block_offset(Point::new(runs[1], 2)).unwrap();
    assert_eq!(block, paragraph);
    assert_eq!(offset, 7);
    assert_eq!(state.point_at_block_offset(paragraph, 7), Point::new(runs[1], 2));
}

#[test]
fn run_boundary_prefers_earlier_run() {
    let state = recipe();
    let paragraph = state.text_blocks()[0];
    let runs = state.text_children(paragraph);
    assert_eq!(state.point_at_block_offset(paragraph, 5), Point::new(runs[0], 5));
    assert_eq!(state.block_end(paragraph), Point::new(runs[1], 6));
}

#[test]
fn element_point_offsets_count_preceding_runs() {
    let state = recipe();
    let paragraph = state.text_blocks()[0];
    assert_eq!(state.block_offset(Point::new(paragraph, 1)), Some((paragraph, 5)));
    assert_eq!(state.block_offset(Point::new(paragraph, 2)), Some((paragraph, 11)));
}

#[test]
fn rule_points_normalize_after_the_rule() {
    let state = recipe();
    let rule = state.children(state.root())[1];
    assert_eq!(
        state.normalize_point(Point::new(rule, 0)),
        Point::new(state.root(), 2)
    );
}

#[test]
fn missing_nodes_normalize_to_document_end() {
    let state = recipe();
    assert_eq!(state.normalize_point(Point::new(NodeId(999), 3)), state.last_caret());
}

#[test]
fn top_level_block_walks_up_to_root_child() {
    let state = recipe();
    let list = state.children(state.root())[2];
    let item = state.children(list)[0];
    let text = state.children(item)[0];
    assert_eq!(state.top_level_block(text), Some(list));
    assert_eq!(state.top_level_block(state.root()), None);
    assert!(state.is_ancestor(list, text));
}

#[test]
fn structural_equality_ignores_ids_and_selection() {
    let left = recipe();
    let mut right = recipe();
    right.selection = Selection::caret(right.last_caret());
    assert!(left.structurally_eq(&right));

    let empty = DocumentState::empty(NodeId(10), NodeId(11));
    assert!(!left.structurally_eq(&empty));
}
