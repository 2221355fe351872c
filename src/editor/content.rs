//! Editing commands. Each command is a transaction builder; the `Editor`
//! methods at the bottom dispatch them.

use super::node::{NodeData, NodeId, NodeKind, TextFormat};
use super::state::{DocumentState, Point, Selection};
use super::transaction::{EditIntent, GroupTag, Transaction, Violation};
use super::{DispatchOutcome, Editor};
use crate::error::EditorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockType {
    Paragraph,
    Heading(u8),
    List { ordered: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaretMove {
    Left,
    Right,
    WordLeft,
    WordRight,
    Up,
    Down,
    LineStart,
    LineEnd,
    DocumentStart,
    DocumentEnd,
}

pub(crate) fn char_to_byte_idx(text: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count == char_idx {
            return byte_idx;
        }
    }
    text.len()
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

pub(crate) fn previous_word_boundary(text: &str, offset: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = offset.min(chars.len());
    while idx > 0 && chars[idx - 1].is_whitespace() {
        idx -= 1;
    }
    if idx > 0 && is_word_char(chars[idx - 1]) {
        while idx > 0 && is_word_char(chars[idx - 1]) {
            idx -= 1;
        }
    } else {
        while idx > 0 && !is_word_char(chars[idx - 1]) && !chars[idx - 1].is_whitespace() {
            idx -= 1;
        }
    }
    idx
}

pub(crate) fn next_word_boundary(text: &str, offset: usize) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut idx = offset.min(len);
    if idx < len && is_word_char(chars[idx]) {
        while idx < len && is_word_char(chars[idx]) {
            idx += 1;
        }
    } else {
        while idx < len && !chars[idx].is_whitespace() && !is_word_char(chars[idx]) {
            idx += 1;
        }
    }
    while idx < len && chars[idx].is_whitespace() {
        idx += 1;
    }
    idx
}

fn run_text(state: &DocumentState, id: NodeId) -> String {
    state
        .node(id)
        .and_then(|node| node.text())
        .unwrap_or_default()
        .to_string()
}

/// `(run, start, len)` for every text child of `block`, offsets in chars.
fn runs(state: &DocumentState, block: NodeId) -> Vec<(NodeId, usize, usize)> {
    let mut position = 0;
    state
        .text_children(block)
        .into_iter()
        .map(|id| {
            let len = run_text(state, id).chars().count();
            let run = (id, position, len);
            position += len;
            run
        })
        .collect()
}

/// Child slot right after the last text run; new runs land here so nested
/// lists stay at the end of a list item.
fn text_insert_index(state: &DocumentState, block: NodeId) -> usize {
    state
        .children(block)
        .iter()
        .rposition(|child| state.kind(*child) == Some(NodeKind::Text))
        .map_or(0, |index| index + 1)
}

pub(crate) fn set_caret(
    tx: &mut Transaction<'_>,
    block: NodeId,
    offset: usize,
) -> Result<(), Violation> {
    let point = tx.state().point_at_block_offset(block, offset);
    tx.set_selection(Selection::caret(point))
}

/// Put the caret on `block` itself at the run boundary for `offset`, so the
/// next keystroke does not extend the run before it.
pub(crate) fn set_caret_between_runs(
    tx: &mut Transaction<'_>,
    block: NodeId,
    offset: usize,
) -> Result<(), Violation> {
    let state = tx.state();
    let mut position = 0;
    let mut slot = None;
    for (index, child) in state.children(block).iter().enumerate() {
        let Some(text) = state.node(*child).and_then(|node| node.text()) else {
            continue;
        };
        let len = text.chars().count();
        if position >= offset {
            slot = Some(index);
            break;
        }
        position += len;
    }
    let slot = slot.unwrap_or_else(|| text_insert_index(state, block));
    tx.set_selection(Selection::caret(Point::new(block, slot)))
}

/// Delete chars `[start, end)` of a block's text, dropping runs that empty.
pub(crate) fn remove_block_text(
    tx: &mut Transaction<'_>,
    block: NodeId,
    start: usize,
    end: usize,
) -> Result<(), Violation> {
    if start >= end {
        return Ok(());
    }
    for (id, run_start, len) in runs(tx.state(), block) {
        let run_end = run_start + len;
        if run_end <= start || run_start >= end {
            continue;
        }
        let cut_start = start.max(run_start) - run_start;
        let cut_end = end.min(run_end) - run_start;
        if cut_start == 0 && cut_end == len {
            tx.remove(id)?;
            continue;
        }
        let text = run_text(tx.state(), id);
        let kept: String = text
            .chars()
            .take(cut_start)
            .chain(text.chars().skip(cut_end))
            .collect();
        tx.set_text(id, kept)?;
    }
    Ok(())
}

/// Ensure a run boundary at `offset` and return the child index where the
/// text after `offset` begins.
fn split_text_at(tx: &mut Transaction<'_>, block: NodeId, offset: usize) -> Result<usize, Violation> {
    let children = tx.state().children(block).to_vec();
    let mut position = 0;
    let mut after_last_text = 0;
    for (index, child) in children.iter().enumerate() {
        let Some(node) = tx.state().node(*child) else {
            continue;
        };
        let (Some(text), Some(format)) = (node.text(), node.format()) else {
            continue;
        };
        let text = text.to_string();
        let len = text.chars().count();
        after_last_text = index + 1;
        if offset <= position {
            return Ok(index);
        }
        if offset < position + len {
            let cut = offset - position;
            let head: String = text.chars().take(cut).collect();
            let tail: String = text.chars().skip(cut).collect();
            tx.set_text(*child, head)?;
            tx.insert(block, index + 1, NodeData::formatted_text(tail, format))?;
            return Ok(index + 1);
        }
        position += len;
    }
    Ok(after_last_text)
}

fn text_runs_from(state: &DocumentState, block: NodeId, index: usize) -> Vec<NodeId> {
    state
        .children(block)
        .iter()
        .skip(index)
        .copied()
        .filter(|child| state.kind(*child) == Some(NodeKind::Text))
        .collect()
}

/// Merge adjacent runs with equal formatting and drop empty ones, keeping
/// the selection at the same text offsets.
fn normalize_runs(tx: &mut Transaction<'_>, block: NodeId) -> Result<(), Violation> {
    let selection = tx.state().selection();
    let anchor = tx
        .state()
        .block_offset(selection.anchor)
        .filter(|(owner, _)| *owner == block);
    let focus = tx
        .state()
        .block_offset(selection.focus)
        .filter(|(owner, _)| *owner == block);

    let mut changed = false;
    let mut previous: Option<(NodeId, TextFormat)> = None;
    for child in tx.state().children(block).to_vec() {
        let Some(node) = tx.state().node(child) else {
            continue;
        };
        let (Some(text), Some(format)) = (node.text(), node.format()) else {
            previous = None;
            continue;
        };
        let text = text.to_string();
        if text.is_empty() {
            tx.remove(child)?;
            changed = true;
            continue;
        }
        match previous {
            Some((run, run_format)) if run_format == format => {
                let merged = run_text(tx.state(), run) + &text;
                tx.set_text(run, merged)?;
                tx.remove(child)?;
                changed = true;
            }
            _ => previous = Some((child, format)),
        }
    }

    if changed && (anchor.is_some() || focus.is_some()) {
        let state = tx.state();
        let anchor = anchor.map_or(selection.anchor, |(_, offset)| {
            state.point_at_block_offset(block, offset)
        });
        let focus = focus.map_or(selection.focus, |(_, offset)| {
            state.point_at_block_offset(block, offset)
        });
        tx.set_selection(Selection::range(anchor, focus))?;
    }
    Ok(())
}

/// Remove lists left without items, walking up through nested lists.
fn cleanup_empty(tx: &mut Transaction<'_>, node: Option<NodeId>) -> Result<(), Violation> {
    let mut current = node;
    while let Some(id) = current {
        let state = tx.state();
        if state.kind(id) != Some(NodeKind::List) || !state.children(id).is_empty() {
            break;
        }
        current = state.parent(id);
        tx.remove(id)?;
    }
    Ok(())
}

/// Append the runs of `source` to `target`, drop `source` once it is empty
/// and put the caret at the join.
fn merge_blocks(tx: &mut Transaction<'_>, target: NodeId, source: NodeId) -> Result<(), Violation> {
    let join = tx.state().block_text_len(target);
    let mut index = text_insert_index(tx.state(), target);
    for run in tx.state().text_children(source) {
        tx.move_node(run, target, index)?;
        index += 1;
    }
    let leftovers = tx.state().children(source).to_vec();
    if !leftovers.is_empty() && tx.state().kind(target) == Some(NodeKind::ListItem) {
        for child in leftovers {
            let end = tx.state().children(target).len();
            tx.move_node(child, target, end)?;
        }
    }
    if tx.state().children(source).is_empty() {
        let parent = tx.state().parent(source);
        tx.remove(source)?;
        cleanup_empty(tx, parent)?;
    }
    normalize_runs(tx, target)?;
    set_caret(tx, target, join)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TextRange {
    start: (NodeId, usize),
    end: (NodeId, usize),
    forward: bool,
}

fn selected_range(state: &DocumentState) -> Option<TextRange> {
    let selection = state.selection();
    if selection.is_collapsed() {
        return None;
    }
    let anchor = state.block_offset(selection.anchor)?;
    let focus = state.block_offset(selection.focus)?;
    let blocks = state.text_blocks();
    let order = |(block, offset): (NodeId, usize)| {
        blocks
            .iter()
            .position(|candidate| *candidate == block)
            .map(|index| (index, offset))
    };
    let (anchor_order, focus_order) = (order(anchor)?, order(focus)?);
    if anchor_order == focus_order {
        return None;
    }
    Some(if anchor_order < focus_order {
        TextRange {
            start: anchor,
            end: focus,
            forward: true,
        }
    } else {
        TextRange {
            start: focus,
            end: anchor,
            forward: false,
        }
    })
}

/// Delete the selected text, if any. Ranges that do not start and end in
/// text blocks collapse to their focus instead.
fn delete_selection(tx: &mut Transaction<'_>) -> Result<bool, Violation> {
    let selection = tx.state().selection();
    if selection.is_collapsed() {
        return Ok(false);
    }
    let Some(range) = selected_range(tx.state()) else {
        tx.set_selection(Selection::caret(selection.focus))?;
        return Ok(false);
    };
    delete_range(tx, range)?;
    Ok(true)
}

fn delete_range(tx: &mut Transaction<'_>, range: TextRange) -> Result<(), Violation> {
    let (start_block, start) = range.start;
    let (end_block, end) = range.end;
    if start_block == end_block {
        remove_block_text(tx, start_block, start, end)?;
        normalize_runs(tx, start_block)?;
        return set_caret(tx, start_block, start);
    }

    let state = tx.state();
    let blocks = state.text_blocks();
    let between: Vec<NodeId> = blocks
        .iter()
        .skip_while(|block| **block != start_block)
        .skip(1)
        .take_while(|block| **block != end_block)
        .copied()
        .collect();
    let root = state.root();
    let root_between: Vec<NodeId> = match (
        state.top_level_block(start_block),
        state.top_level_block(end_block),
    ) {
        (Some(first), Some(last)) if first != last => {
            let children = state.children(root);
            let from = children.iter().position(|id| *id == first).unwrap_or(0);
            let to = children.iter().position(|id| *id == last).unwrap_or(from);
            children
                .get(from + 1..to)
                .map(<[NodeId]>::to_vec)
                .unwrap_or_default()
        }
        _ => Vec::new(),
    };
    let start_len = state.block_text_len(start_block);

    remove_block_text(tx, start_block, start, start_len)?;
    remove_block_text(tx, end_block, 0, end)?;
    for node in root_between {
        if tx.state().contains(node) {
            tx.remove(node)?;
        }
    }
    for block in between {
        if !tx.state().contains(block) {
            continue;
        }
        if tx.state().is_ancestor(block, end_block) {
            let len = tx.state().block_text_len(block);
            remove_block_text(tx, block, 0, len)?;
        } else {
            let parent = tx.state().parent(block);
            tx.remove(block)?;
            cleanup_empty(tx, parent)?;
        }
    }
    merge_blocks(tx, start_block, end_block)
}

/// Make sure there is a text block at `point`, creating one between blocks
/// when the caret sits on the root or a list.
fn ensure_block_at(tx: &mut Transaction<'_>, point: Point) -> Result<NodeId, Violation> {
    let state = tx.state();
    let slot = point.offset.min(state.children(point.node).len());
    match state.kind(point.node) {
        Some(kind) if kind.holds_text() => Ok(point.node),
        Some(NodeKind::Root) => tx.insert(point.node, slot, NodeData::Paragraph),
        Some(NodeKind::List) => tx.insert(point.node, slot, NodeData::ListItem),
        _ => tx.abort("caret is not inside an editable block"),
    }
}

/// Insert a single line at the caret and return the block it went into.
fn insert_str(tx: &mut Transaction<'_>, text: &str) -> Result<NodeId, Violation> {
    let focus = tx.state().selection().focus;
    let added = text.chars().count();

    if tx.state().kind(focus.node) == Some(NodeKind::Text) {
        let mut current = run_text(tx.state(), focus.node);
        let offset = focus.offset.min(current.chars().count());
        current.insert_str(char_to_byte_idx(&current, offset), text);
        tx.set_text(focus.node, current)?;
        tx.set_selection(Selection::caret(Point::new(focus.node, offset + added)))?;
        return tx
            .state()
            .parent(focus.node)
            .ok_or(Violation::MissingNode(focus.node));
    }

    let block = ensure_block_at(tx, focus)?;
    let slot = if block == focus.node { focus.offset } else { 0 };
    let children = tx.state().children(block).to_vec();
    let slot = slot.min(children.len());
    // Between runs, typing joins a plain neighbour or starts a plain run.
    let plain = |id: &NodeId| {
        tx.state()
            .node(*id)
            .and_then(|node| node.format())
            .is_some_and(TextFormat::is_plain)
    };
    let before = slot
        .checked_sub(1)
        .and_then(|index| children.get(index).copied())
        .filter(|id| plain(id));
    let after = children.get(slot).copied().filter(|id| plain(id));

    let caret = if let Some(run) = before {
        let current = run_text(tx.state(), run);
        let len = current.chars().count();
        tx.set_text(run, current + text)?;
        Point::new(run, len + added)
    } else if let Some(run) = after {
        let current = run_text(tx.state(), run);
        tx.set_text(run, format!("{text}{current}"))?;
        Point::new(run, added)
    } else {
        let run = tx.insert(block, slot, NodeData::text(text))?;
        Point::new(run, added)
    };
    tx.set_selection(Selection::caret(caret))?;
    Ok(block)
}

/// Type `text` at the caret, replacing any selection. Newlines become
/// paragraph breaks.
pub(crate) fn insert_text(tx: &mut Transaction<'_>, text: &str) -> Result<(), Violation> {
    if text.is_empty() {
        return Ok(());
    }
    delete_selection(tx)?;
    let multiline = text.contains('\n');
    let mut last_block = None;
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            paragraph_break(tx)?;
        }
        if !line.is_empty() {
            last_block = Some(insert_str(tx, line)?);
        }
    }
    if multiline {
        tx.set_intent(EditIntent::Other);
    } else {
        tx.set_intent(EditIntent::InsertText);
        if let Some(block) = last_block {
            tx.set_tag(GroupTag::typing(block));
        }
    }
    Ok(())
}

pub(crate) fn delete_backward(tx: &mut Transaction<'_>) -> Result<(), Violation> {
    tx.set_intent(EditIntent::DeleteBackward);
    if delete_selection(tx)? {
        return Ok(());
    }
    let focus = tx.state().selection().focus;
    let Some((block, offset)) = tx.state().block_offset(focus) else {
        return delete_between_blocks(tx, focus, false);
    };
    if offset > 0 {
        remove_block_text(tx, block, offset - 1, offset)?;
        tx.set_tag(GroupTag::deleting(block));
        return set_caret(tx, block, offset - 1);
    }
    join_backward(tx, block)
}

pub(crate) fn delete_forward(tx: &mut Transaction<'_>) -> Result<(), Violation> {
    tx.set_intent(EditIntent::DeleteForward);
    if delete_selection(tx)? {
        return Ok(());
    }
    let focus = tx.state().selection().focus;
    let Some((block, offset)) = tx.state().block_offset(focus) else {
        return delete_between_blocks(tx, focus, true);
    };
    if offset < tx.state().block_text_len(block) {
        remove_block_text(tx, block, offset, offset + 1)?;
        tx.set_tag(GroupTag::deleting(block));
        return set_caret(tx, block, offset);
    }
    join_forward(tx, block)
}

/// Caret on a root slot: delete an adjacent rule, or step into the
/// neighbouring block.
fn delete_between_blocks(tx: &mut Transaction<'_>, focus: Point, forward: bool) -> Result<(), Violation> {
    let state = tx.state();
    if state.kind(focus.node) != Some(NodeKind::Root) {
        return Ok(());
    }
    let neighbour = if forward {
        state.children(focus.node).get(focus.offset).copied()
    } else {
        focus
            .offset
            .checked_sub(1)
            .and_then(|index| state.children(focus.node).get(index).copied())
    };
    let Some(neighbour) = neighbour else {
        return Ok(());
    };
    if state.kind(neighbour) == Some(NodeKind::HorizontalRule) {
        let slot = if forward { focus.offset } else { focus.offset - 1 };
        tx.remove(neighbour)?;
        return tx.set_selection(Selection::caret(Point::new(focus.node, slot)));
    }
    let blocks: Vec<NodeId> = state
        .text_blocks()
        .into_iter()
        .filter(|block| state.top_level_block(*block) == Some(neighbour))
        .collect();
    let target = if forward {
        blocks.first().map(|block| state.block_start(*block))
    } else {
        blocks.last().map(|block| state.block_end(*block))
    };
    match target {
        Some(point) => tx.set_selection(Selection::caret(point)),
        None => Ok(()),
    }
}

fn join_backward(tx: &mut Transaction<'_>, block: NodeId) -> Result<(), Violation> {
    let state = tx.state();
    match state.kind(block) {
        Some(NodeKind::ListItem) => {
            lift_list_item(tx, block)?;
            Ok(())
        }
        Some(kind) => {
            let Some(previous) = state.previous_sibling(block) else {
                if kind == NodeKind::Heading {
                    let paragraph = tx.replace(block, NodeData::Paragraph)?;
                    return set_caret(tx, paragraph, 0);
                }
                return Ok(());
            };
            if state.kind(previous) == Some(NodeKind::HorizontalRule) {
                tx.remove(previous)?;
                return set_caret(tx, block, 0);
            }
            let target = state
                .descendants(previous)
                .into_iter()
                .filter(|id| state.kind(*id).is_some_and(NodeKind::holds_text))
                .last();
            match target {
                Some(target) => merge_blocks(tx, target, block),
                None => Ok(()),
            }
        }
        None => Ok(()),
    }
}

fn join_forward(tx: &mut Transaction<'_>, block: NodeId) -> Result<(), Violation> {
    let state = tx.state();
    let blocks = state.text_blocks();
    let top = state.top_level_block(block);
    let last_in_top = blocks
        .iter()
        .filter(|candidate| state.top_level_block(**candidate) == top)
        .last()
        .copied();
    if last_in_top == Some(block) {
        if let Some(next) = top.and_then(|top| state.next_sibling(top)) {
            if state.kind(next) == Some(NodeKind::HorizontalRule) {
                tx.remove(next)?;
                let end = tx.state().block_text_len(block);
                return set_caret(tx, block, end);
            }
        }
    }
    let next_block = blocks
        .iter()
        .skip_while(|candidate| **candidate != block)
        .nth(1)
        .copied();
    match next_block {
        Some(next) => merge_blocks(tx, block, next),
        None => Ok(()),
    }
}

/// Move a list item out of its list. Top-level items become paragraphs and
/// split the list around them; nested items move up one level.
pub(crate) fn lift_list_item(tx: &mut Transaction<'_>, item: NodeId) -> Result<NodeId, Violation> {
    let state = tx.state();
    let list = state.parent(item).ok_or(Violation::MissingNode(item))?;
    let holder = state.parent(list).ok_or(Violation::MissingNode(list))?;
    let offset = state
        .block_offset(state.selection().focus)
        .filter(|(owner, _)| *owner == item)
        .map_or(0, |(_, offset)| offset);

    if state.kind(holder) == Some(NodeKind::ListItem) {
        let outer = state.parent(holder).ok_or(Violation::MissingNode(holder))?;
        let index = state
            .index_in_parent(holder)
            .ok_or(Violation::MissingNode(holder))?;
        tx.move_node(item, outer, index + 1)?;
        cleanup_empty(tx, Some(list))?;
        set_caret(tx, item, offset)?;
        return Ok(item);
    }

    let ordered = matches!(
        state.node(list).map(|node| node.data()),
        Some(NodeData::List { ordered: true })
    );
    let list_index = state.index_in_parent(list).ok_or(Violation::MissingNode(list))?;
    let item_index = state.index_in_parent(item).ok_or(Violation::MissingNode(item))?;
    let runs = state.text_children(item);
    let mut tail_items: Vec<NodeId> = Vec::new();
    for child in state.children(item) {
        if state.kind(*child) == Some(NodeKind::List) {
            tail_items.extend_from_slice(state.children(*child));
        }
    }
    tail_items.extend_from_slice(&state.children(list)[item_index + 1..]);

    let paragraph = tx.insert(holder, list_index + 1, NodeData::Paragraph)?;
    for run in runs {
        let end = tx.state().children(paragraph).len();
        tx.move_node(run, paragraph, end)?;
    }
    if !tail_items.is_empty() {
        let tail = tx.insert(holder, list_index + 2, NodeData::list(ordered))?;
        for moved in tail_items {
            let end = tx.state().children(tail).len();
            tx.move_node(moved, tail, end)?;
        }
    }
    tx.remove(item)?;
    cleanup_empty(tx, Some(list))?;
    set_caret(tx, paragraph, offset)?;
    Ok(paragraph)
}

/// Split `block` at `offset`, moving the tail into a new sibling built from
/// `data`. The caret lands at the start of the sibling.
fn split_block(
    tx: &mut Transaction<'_>,
    block: NodeId,
    offset: usize,
    data: NodeData,
) -> Result<NodeId, Violation> {
    let index = split_text_at(tx, block, offset)?;
    let tail = text_runs_from(tx.state(), block, index);
    let sibling = tx.insert_after(block, data)?;
    for run in tail {
        let end = tx.state().children(sibling).len();
        tx.move_node(run, sibling, end)?;
    }
    set_caret(tx, sibling, 0)?;
    Ok(sibling)
}

fn paragraph_break(tx: &mut Transaction<'_>) -> Result<(), Violation> {
    let focus = tx.state().selection().focus;
    let Some((block, offset)) = tx.state().block_offset(focus) else {
        let block = ensure_block_at(tx, focus)?;
        return set_caret(tx, block, 0);
    };
    let state = tx.state();
    let len = state.block_text_len(block);
    let data = state
        .node(block)
        .map(|node| node.data().clone())
        .ok_or(Violation::MissingNode(block))?;
    match data {
        NodeData::ListItem => {
            let only_text = state.children(block).len() == state.text_children(block).len();
            if len == 0 && only_text {
                lift_list_item(tx, block)?;
            } else {
                split_block(tx, block, offset, NodeData::ListItem)?;
            }
        }
        NodeData::Heading { .. } if offset == len => {
            let paragraph = tx.insert_after(block, NodeData::Paragraph)?;
            set_caret(tx, paragraph, 0)?;
        }
        NodeData::Heading { .. } if offset == 0 => {
            tx.insert_before(block, NodeData::Paragraph)?;
            set_caret(tx, block, 0)?;
        }
        data => {
            split_block(tx, block, offset, data)?;
        }
    }
    Ok(())
}

pub(crate) fn insert_paragraph_break(tx: &mut Transaction<'_>) -> Result<(), Violation> {
    tx.set_intent(EditIntent::ParagraphBreak);
    delete_selection(tx)?;
    paragraph_break(tx)
}

/// Put the caret at the first editable spot after `rule`, adding an empty
/// paragraph when nothing editable follows.
pub(crate) fn place_caret_after(tx: &mut Transaction<'_>, rule: NodeId) -> Result<(), Violation> {
    let state = tx.state();
    let next_block = state.next_sibling(rule).and_then(|next| {
        state
            .descendants(next)
            .into_iter()
            .find(|id| state.kind(*id).is_some_and(NodeKind::holds_text))
    });
    let block = match next_block {
        Some(block) => block,
        None => tx.insert_after(rule, NodeData::Paragraph)?,
    };
    set_caret(tx, block, 0)
}

pub(crate) fn insert_horizontal_rule(tx: &mut Transaction<'_>) -> Result<(), Violation> {
    tx.set_intent(EditIntent::InsertRule);
    delete_selection(tx)?;
    let state = tx.state();
    let focus = state.selection().focus;
    let root = state.root();

    let Some((block, offset)) = state.block_offset(focus) else {
        let slot = match state.kind(focus.node) {
            Some(NodeKind::Root) => focus.offset.min(state.children(root).len()),
            _ => state
                .top_level_block(focus.node)
                .and_then(|top| state.index_in_parent(top))
                .map_or(state.children(root).len(), |index| index + 1),
        };
        let rule = tx.insert(root, slot, NodeData::HorizontalRule)?;
        return place_caret_after(tx, rule);
    };

    let top = state.top_level_block(block).ok_or(Violation::MissingNode(block))?;
    if top != block {
        let rule = tx.insert_after(top, NodeData::HorizontalRule)?;
        return place_caret_after(tx, rule);
    }
    let len = state.block_text_len(block);
    if offset == 0 {
        tx.insert_before(block, NodeData::HorizontalRule)?;
        return set_caret(tx, block, 0);
    }
    if offset >= len {
        let rule = tx.insert_after(block, NodeData::HorizontalRule)?;
        return place_caret_after(tx, rule);
    }
    let data = state
        .node(block)
        .map(|node| node.data().clone())
        .ok_or(Violation::MissingNode(block))?;
    let tail = split_block(tx, block, offset, data)?;
    tx.insert_before(tail, NodeData::HorizontalRule)?;
    set_caret(tx, tail, 0)
}

/// Swap an emptied block for a rule, as the `---` shortcut does.
pub(crate) fn replace_with_rule(tx: &mut Transaction<'_>, block: NodeId) -> Result<(), Violation> {
    let rule = tx.replace(block, NodeData::HorizontalRule)?;
    place_caret_after(tx, rule)
}

/// Turn a top-level paragraph or heading into a list item, joining a
/// directly preceding list of the same kind.
pub(crate) fn convert_to_list(
    tx: &mut Transaction<'_>,
    block: NodeId,
    ordered: bool,
) -> Result<NodeId, Violation> {
    let wanted = NodeData::list(ordered);
    let previous = tx
        .state()
        .previous_sibling(block)
        .filter(|id| tx.state().node(*id).map(|node| node.data()) == Some(&wanted));
    let list = match previous {
        Some(list) => list,
        None => tx.insert_before(block, wanted)?,
    };
    let item = tx.append(list, NodeData::ListItem)?;
    tx.move_children(block, item)?;
    tx.remove(block)?;
    Ok(item)
}

/// Retype a paragraph or heading in place; runs keep their ids.
pub(crate) fn retype_block(
    tx: &mut Transaction<'_>,
    block: NodeId,
    data: NodeData,
) -> Result<NodeId, Violation> {
    let current = tx.state().node(block).map(|node| node.data().clone());
    match current {
        Some(existing) if existing == data => Ok(block),
        Some(existing) if existing.kind() == data.kind() => {
            tx.update(block, data)?;
            Ok(block)
        }
        Some(_) => tx.replace(block, data),
        None => Err(Violation::MissingNode(block)),
    }
}

pub(crate) fn set_block_type(tx: &mut Transaction<'_>, target: BlockType) -> Result<(), Violation> {
    let focus = tx.state().selection().focus;
    let Some((block, offset)) = tx.state().block_offset(focus) else {
        return Ok(());
    };
    let kind = tx.state().kind(block);
    let converted = match (kind, target) {
        (Some(NodeKind::ListItem), BlockType::List { ordered }) => {
            let list = tx.state().parent(block).ok_or(Violation::MissingNode(block))?;
            retype_block(tx, list, NodeData::list(ordered))?;
            block
        }
        (Some(NodeKind::ListItem), BlockType::Paragraph) => lift_list_item(tx, block)?,
        (Some(NodeKind::ListItem), BlockType::Heading(level)) => {
            let paragraph = lift_list_item(tx, block)?;
            retype_block(tx, paragraph, NodeData::heading(level))?
        }
        (Some(_), BlockType::List { ordered }) => convert_to_list(tx, block, ordered)?,
        (Some(_), BlockType::Paragraph) => retype_block(tx, block, NodeData::Paragraph)?,
        (Some(_), BlockType::Heading(level)) => retype_block(tx, block, NodeData::heading(level))?,
        (None, _) => return Ok(()),
    };
    if tx.operations().is_empty() {
        return Ok(());
    }
    set_caret(tx, converted, offset)
}

/// Add `format` to chars `[start, end)` of one block.
pub(crate) fn format_span(
    tx: &mut Transaction<'_>,
    block: NodeId,
    start: usize,
    end: usize,
    format: TextFormat,
) -> Result<(), Violation> {
    if start >= end {
        return Ok(());
    }
    split_text_at(tx, block, start)?;
    split_text_at(tx, block, end)?;
    for (run, run_start, len) in runs(tx.state(), block) {
        if len == 0 || run_start < start || run_start + len > end {
            continue;
        }
        let current = tx
            .state()
            .node(run)
            .and_then(|node| node.format())
            .unwrap_or_default();
        tx.set_format(run, current.union(format))?;
    }
    normalize_runs(tx, block)
}

/// Toggle `format` over the selected text. Runs that all carry the flag
/// lose it; otherwise every run gains it.
pub(crate) fn toggle_format(tx: &mut Transaction<'_>, format: TextFormat) -> Result<(), Violation> {
    tx.set_intent(EditIntent::Format);
    let Some(range) = selected_range(tx.state()) else {
        return Ok(());
    };
    let blocks = tx.state().text_blocks();
    let covered: Vec<NodeId> = blocks
        .iter()
        .skip_while(|block| **block != range.start.0)
        .take_while(|block| **block != range.end.0)
        .chain(std::iter::once(&range.end.0))
        .copied()
        .collect();

    let mut selected_runs = Vec::new();
    for block in &covered {
        let start = if *block == range.start.0 { range.start.1 } else { 0 };
        let end = if *block == range.end.0 {
            range.end.1
        } else {
            tx.state().block_text_len(*block)
        };
        if start >= end {
            continue;
        }
        split_text_at(tx, *block, start)?;
        split_text_at(tx, *block, end)?;
        for (run, run_start, len) in runs(tx.state(), *block) {
            if run_start >= start && run_start + len <= end && len > 0 {
                selected_runs.push(run);
            }
        }
    }
    if selected_runs.is_empty() {
        return Ok(());
    }

    let state = tx.state();
    let remove = selected_runs.iter().all(|run| {
        state
            .node(*run)
            .and_then(|node| node.format())
            .is_some_and(|current| current.contains(format))
    });
    for run in selected_runs {
        let current = tx
            .state()
            .node(run)
            .and_then(|node| node.format())
            .unwrap_or_default();
        let next = if remove {
            current.without(format)
        } else {
            current.union(format)
        };
        tx.set_format(run, next)?;
    }
    for block in &covered {
        normalize_runs(tx, *block)?;
    }

    let state = tx.state();
    let start = state.point_at_block_offset(range.start.0, range.start.1);
    let end = state.point_at_block_offset(range.end.0, range.end.1);
    let selection = if range.forward {
        Selection::range(start, end)
    } else {
        Selection::range(end, start)
    };
    tx.set_selection(selection)
}

fn neighbour_block(state: &DocumentState, block: NodeId, forward: bool) -> Option<NodeId> {
    let blocks = state.text_blocks();
    let index = blocks.iter().position(|candidate| *candidate == block)?;
    if forward {
        blocks.get(index + 1).copied()
    } else {
        index.checked_sub(1).and_then(|prev| blocks.get(prev).copied())
    }
}

fn caret_target(state: &DocumentState, focus: Point, movement: CaretMove) -> Point {
    match movement {
        CaretMove::DocumentStart => return state.first_caret(),
        CaretMove::DocumentEnd => return state.last_caret(),
        _ => {}
    }
    let forward = matches!(
        movement,
        CaretMove::Right | CaretMove::WordRight | CaretMove::Down | CaretMove::LineEnd
    );
    let Some((block, offset)) = state.block_offset(focus) else {
        // Between blocks: step into the nearest text block on that side.
        let root = state.root();
        let slot = if focus.node == root { focus.offset } else { 0 };
        let blocks = state.text_blocks();
        let side = |block: &NodeId| {
            state
                .top_level_block(*block)
                .and_then(|top| state.index_in_parent(top))
                .is_some_and(|index| if forward { index >= slot } else { index < slot })
        };
        let target = if forward {
            blocks.iter().find(|block| side(block)).map(|block| state.block_start(*block))
        } else {
            blocks.iter().rev().find(|block| side(block)).map(|block| state.block_end(*block))
        };
        return target.unwrap_or(focus);
    };

    let len = state.block_text_len(block);
    let text = state.block_text(block);
    let at = |offset: usize| state.point_at_block_offset(block, offset);
    match movement {
        CaretMove::Left if offset > 0 => at(offset - 1),
        CaretMove::WordLeft if offset > 0 => at(previous_word_boundary(&text, offset)),
        CaretMove::Left | CaretMove::WordLeft => neighbour_block(state, block, false)
            .map_or_else(|| at(0), |prev| state.block_end(prev)),
        CaretMove::Right if offset < len => at(offset + 1),
        CaretMove::WordRight if offset < len => at(next_word_boundary(&text, offset)),
        CaretMove::Right | CaretMove::WordRight => neighbour_block(state, block, true)
            .map_or_else(|| at(len), |next| state.block_start(next)),
        CaretMove::Up => neighbour_block(state, block, false).map_or_else(
            || at(0),
            |prev| state.point_at_block_offset(prev, offset.min(state.block_text_len(prev))),
        ),
        CaretMove::Down => neighbour_block(state, block, true).map_or_else(
            || at(len),
            |next| state.point_at_block_offset(next, offset.min(state.block_text_len(next))),
        ),
        CaretMove::LineStart => at(0),
        CaretMove::LineEnd => at(len),
        CaretMove::DocumentStart | CaretMove::DocumentEnd => focus,
    }
}

pub(crate) fn move_caret(
    tx: &mut Transaction<'_>,
    movement: CaretMove,
    extend: bool,
) -> Result<(), Violation> {
    tx.set_intent(EditIntent::Selection);
    let selection = tx.state().selection();
    let target = caret_target(tx.state(), selection.focus, movement);
    let next = if extend {
        Selection::range(selection.anchor, target)
    } else {
        Selection::caret(target)
    };
    if next == selection {
        return Ok(());
    }
    tx.set_selection(next)
}

impl Editor {
    pub fn insert_text(&mut self, text: &str) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(|tx| insert_text(tx, text))
    }

    pub fn delete_backward(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(delete_backward)
    }

    pub fn delete_forward(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(delete_forward)
    }

    pub fn insert_paragraph_break(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(insert_paragraph_break)
    }

    pub fn insert_horizontal_rule(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(insert_horizontal_rule)
    }

    pub fn set_block_type(&mut self, target: BlockType) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(|tx| set_block_type(tx, target))
    }

    pub fn toggle_format(&mut self, format: TextFormat) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(|tx| toggle_format(tx, format))
    }

    pub fn move_caret(
        &mut self,
        movement: CaretMove,
        extend: bool,
    ) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(|tx| move_caret(tx, movement, extend))
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(|tx| {
            tx.set_intent(EditIntent::Selection);
            tx.set_selection(selection)
        })
    }

    pub fn select_all(&mut self) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(|tx| {
            tx.set_intent(EditIntent::Selection);
            let state = tx.state();
            let selection = Selection::range(state.first_caret(), state.last_caret());
            tx.set_selection(selection)
        })
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod content_tests;
