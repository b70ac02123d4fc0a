//! Document update policies. Each policy inspects a state, decides whether
//! it applies, and either extends the given transaction or declines by
//! returning `None`, leaving the transaction untouched for the caller.

use std::sync::Arc;

use tracing::trace;

use crate::node::Node;
use crate::resolve::ResolvedPos;
use crate::schema::{ATTR_ID, Attrs, MARK_HOLDER, Schema};
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transform::{
    Side, Transaction, find_cut_before, lift_target, textblock_at,
};

/// Create a block of the given type at the selection. An empty block under
/// the cursor is retyped in place; otherwise a fresh block is inserted below
/// the current one and the cursor moves into it.
pub fn create_block_below(
    state: &EditorState,
    mut tr: Transaction,
    type_name: &str,
    attrs: Attrs,
) -> Option<Transaction> {
    if matches!(tr.selection(), Selection::Gap { .. }) {
        return None;
    }
    let kind = Arc::clone(state.schema.get(type_name).ok()?);
    let sel = *tr.selection();
    let anchor = tr.doc().resolve(sel.anchor()).ok()?;
    let parent = anchor.parent();

    let only_blank_text = parent.child_count() > 0
        && parent
            .content()
            .children()
            .iter()
            .all(|child| child.is_text() && child.text_content().trim().is_empty());
    let holds_only_mark_holder = parent.content_size() == 1
        && parent
            .first_child()
            .is_some_and(|child| child.kind().name == MARK_HOLDER);
    let retype_in_place = sel.is_empty(tr.doc())
        && (parent.content_size() < 1 || only_blank_text || holds_only_mark_holder);

    if retype_in_place {
        let range = anchor.block_range(&anchor)?;
        let (from, to) = (range.from.pos, range.to.pos);
        tr.set_block_type(from, to, &kind, attrs);
        let sel = Selection::near(tr.doc(), to.saturating_sub(1), 1);
        tr.set_selection(sel);
        return Some(tr);
    }

    let head = head_position(tr.doc(), &sel);
    let head = tr.doc().resolve(head).ok()?;
    let (above, creation_pos) = if head.depth() == 0 {
        (head.node(0), head.pos)
    } else {
        (head.node(head.depth() - 1), head.after(head.depth()))
    };
    if !above.kind().allows_child(&kind) {
        return None;
    }
    let mut attrs = attrs;
    if kind.is_atom() && !attrs.contains_key(ATTR_ID) {
        attrs.insert(
            ATTR_ID.to_string(),
            serde_json::json!(Schema::generate_node_id()),
        );
    }
    let new_node = state.schema.create_and_fill(&kind, attrs)?;
    tr.replace_with(creation_pos, creation_pos, vec![new_node]).ok()?;
    let sel = Selection::near(tr.doc(), creation_pos + 1, 1);
    tr.set_selection(sel);
    Some(tr)
}

fn head_position(doc: &Node, sel: &Selection) -> usize {
    match *sel {
        Selection::Node { pos } => pos + doc.node_at(pos).map_or(0, Node::size),
        _ => sel.head(),
    }
}

/// Backspace at the start or in an emptied block of the given type: strip
/// the block back to the default type and lift it out of its wrappers.
/// Declines everywhere else so ordinary character deletion can run.
pub fn block_backspace(
    state: &EditorState,
    tr: Transaction,
    type_name: &str,
) -> Option<Transaction> {
    let cursor = state.selection.cursor_pos()?;
    let anchor = state.doc.resolve(cursor).ok()?;
    if anchor.parent().kind().name != type_name {
        return None;
    }
    if cursor == 1 || anchor.parent().text_content().is_empty() {
        return clear_nodes(state, tr);
    }
    None
}

/// Reset every block touching the selection to the schema's default block
/// type and lift it out of any wrapping nodes. Applies unconditionally:
/// a selection over nothing but default blocks yields an empty transaction.
pub fn clear_nodes(state: &EditorState, mut tr: Transaction) -> Option<Transaction> {
    let default = Arc::clone(state.schema.default_block_type());
    for (from, to) in tr.selection().ranges(tr.doc()) {
        let base = state.doc.clone();
        base.nodes_between(from, to, &mut |node, pos| {
            if node.is_text() {
                return false;
            }
            let mapped_from = tr.mapping().map(pos, 1);
            let mapped_to = tr.mapping().map(pos + node.size(), 1);
            let Ok(rf) = tr.doc().resolve(mapped_from) else {
                return true;
            };
            let Ok(rt) = tr.doc().resolve(mapped_to) else {
                return true;
            };
            let Some(range) = rf.block_range(&rt) else {
                return true;
            };
            let target = lift_target(&range);
            if node.is_textblock() && node.kind().name != default.name {
                let start = range.start();
                let _ = tr.set_node_markup(start, &default, Attrs::new());
            }
            if let Some(target) = target {
                let _ = tr.lift(&range, target);
            }
            true
        });
    }
    Some(tr)
}

/// Dissolve an empty block that sits in the middle of its parent: split the
/// parent before it when possible, otherwise lift the block out.
pub fn lift_empty_block(state: &EditorState, mut tr: Transaction) -> Option<Transaction> {
    let cursor = state.selection.cursor_pos()?;
    let cursor = state.doc.resolve(cursor).ok()?;
    if !cursor.parent().is_textblock() || cursor.parent().content_size() > 0 {
        return None;
    }
    let depth = cursor.depth();
    if depth > 1 && cursor.after(depth) != cursor.end(depth - 1) {
        let pos_before = cursor.before(depth);
        if tr.split(pos_before).is_ok() {
            return Some(tr);
        }
    }
    let range = cursor.block_range(&cursor)?;
    let target = lift_target(&range)?;
    tr.lift(&range, target).ok()?;
    Some(tr)
}

/// Backspace at the start of a textblock: merge with what comes before the
/// nearest cut, falling back to deleting the emptied block or a preceding
/// atom. Declines when the cursor is not at such a boundary.
pub fn join_backward(state: &EditorState, mut tr: Transaction) -> Option<Transaction> {
    let cursor = state.selection.cursor_pos()?;
    let cursor = state.doc.resolve(cursor).ok()?;
    if !cursor.parent().is_textblock() || cursor.text_offset() != 0 {
        return None;
    }
    if cursor.pos != cursor.start(cursor.depth()) {
        return None;
    }

    let Some(cut) = find_cut_before(&state.doc, &cursor) else {
        // No cut point: the block is hard against the document start. Try to
        // lift it out of whatever wraps it.
        let range = cursor.block_range(&cursor)?;
        let target = lift_target(&range)?;
        tr.lift(&range, target).ok()?;
        return Some(tr);
    };
    let node_before = cut.node_before()?;

    if !node_before.kind().isolating && tr.join(cut.pos).is_ok() {
        trace!(pos = cut.pos, "joined across block boundary");
        return Some(tr);
    }

    if cursor.parent().content_size() == 0
        && (textblock_at(&node_before, Side::End) || node_before.kind().selectable)
    {
        if try_delete_block(&mut tr, &cursor, &cut, &node_before) {
            return Some(tr);
        }
    }

    if node_before.is_atom() && cut.depth() == cursor.depth() - 1 {
        tr.delete(cut.pos - node_before.size(), cut.pos).ok()?;
        return Some(tr);
    }
    None
}

fn try_delete_block(
    tr: &mut Transaction,
    cursor: &ResolvedPos,
    cut: &ResolvedPos,
    node_before: &Node,
) -> bool {
    let from = cursor.before(cursor.depth());
    let to = cursor.after(cursor.depth());
    let maps_before = tr.mapping().len();
    if tr.delete(from, to).is_err() {
        return false;
    }
    let sel = if textblock_at(node_before, Side::End) {
        let mapped = tr.mapping().map_from(maps_before, cut.pos, -1);
        Selection::find_from(tr.doc(), mapped, -1).unwrap_or(Selection::cursor(mapped))
    } else {
        Selection::Node {
            pos: cut.pos - node_before.size(),
        }
    };
    tr.set_selection(sel);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        BLOCKQUOTE, CODE_BLOCK, DEMO_ASYNC_NODE, DOC, HEADING, PARAGRAPH, Schema,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn para(schema: &Schema, text: &str) -> Node {
        let children = if text.is_empty() {
            vec![]
        } else {
            vec![schema.text(text)]
        };
        schema.node(PARAGRAPH, Attrs::new(), children).unwrap()
    }

    fn state_at(schema: &Arc<Schema>, children: Vec<Node>, cursor: usize) -> EditorState {
        let doc = schema.node(DOC, Attrs::new(), children).unwrap();
        let mut state = EditorState::with_doc(Arc::clone(schema), doc).unwrap();
        state.selection = Selection::cursor(cursor);
        state
    }

    #[test]
    fn create_block_retypes_an_empty_paragraph_in_place() {
        let schema = Schema::notebook();
        let state = state_at(&schema, vec![para(&schema, "")], 1);
        let tr = create_block_below(&state, state.tr(), HEADING, Attrs::new()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 1);
        assert_eq!(next.doc.child(0).kind().name, HEADING);
        assert_eq!(next.selection, Selection::cursor(1));
    }

    #[test]
    fn create_block_inserts_below_a_non_empty_paragraph() {
        let schema = Schema::notebook();
        let state = state_at(&schema, vec![para(&schema, "ab")], 2);
        let tr = create_block_below(&state, state.tr(), CODE_BLOCK, Attrs::new()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 2);
        assert_eq!(next.doc.child(0).kind().name, PARAGRAPH);
        assert_eq!(next.doc.child(0).text_content(), "ab");
        assert_eq!(next.doc.child(1).kind().name, CODE_BLOCK);
        // Cursor lands inside the new block.
        assert_eq!(next.selection, Selection::cursor(5));
    }

    #[test]
    fn create_block_declines_on_a_gap_cursor() {
        let schema = Schema::notebook();
        let mut state = state_at(&schema, vec![para(&schema, "ab")], 1);
        state.selection = Selection::Gap { pos: 0 };
        assert!(create_block_below(&state, state.tr(), HEADING, Attrs::new()).is_none());
    }

    #[test]
    fn block_backspace_resets_an_emptied_heading() {
        let schema = Schema::notebook();
        let heading = schema
            .node(HEADING, Attrs::new(), vec![])
            .unwrap();
        let state = state_at(&schema, vec![para(&schema, "ab"), heading], 5);
        let tr = block_backspace(&state, state.tr(), HEADING).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child(1).kind().name, PARAGRAPH);
    }

    #[test]
    fn block_backspace_declines_mid_content() {
        let schema = Schema::notebook();
        let heading = schema
            .node(HEADING, Attrs::new(), vec![schema.text("hi")])
            .unwrap();
        let state = state_at(&schema, vec![heading], 2);
        assert!(block_backspace(&state, state.tr(), HEADING).is_none());
    }

    #[test]
    fn block_backspace_applies_at_the_document_start() {
        let schema = Schema::notebook();
        let heading = schema
            .node(HEADING, Attrs::new(), vec![schema.text("hi")])
            .unwrap();
        let state = state_at(&schema, vec![heading], 1);
        let tr = block_backspace(&state, state.tr(), HEADING).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child(0).kind().name, PARAGRAPH);
        assert_eq!(next.doc.child(0).text_content(), "hi");
    }

    #[test]
    fn clear_nodes_retypes_and_lifts_to_top_level() {
        let schema = Schema::notebook();
        let mut attrs = Attrs::new();
        attrs.insert("level".into(), json!(2));
        let heading = schema
            .node(HEADING, attrs, vec![schema.text("hi")])
            .unwrap();
        let quote = schema.node(BLOCKQUOTE, Attrs::new(), vec![heading]).unwrap();
        let mut state = state_at(&schema, vec![quote], 2);
        state.selection = Selection::Text { anchor: 2, head: 4 };
        let tr = clear_nodes(&state, state.tr()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 1);
        assert_eq!(next.doc.child(0).kind().name, PARAGRAPH);
        assert_eq!(next.doc.child(0).text_content(), "hi");
    }

    #[test]
    fn clear_nodes_is_idempotent() {
        let schema = Schema::notebook();
        let mut state = state_at(&schema, vec![para(&schema, "hi")], 1);
        state.selection = Selection::Text { anchor: 1, head: 3 };
        let tr = clear_nodes(&state, state.tr()).unwrap();
        assert_eq!(tr.step_count(), 0);
    }

    #[test]
    fn lift_empty_block_splits_a_quote_around_a_middle_block() {
        let schema = Schema::notebook();
        let quote = schema
            .node(
                BLOCKQUOTE,
                Attrs::new(),
                vec![para(&schema, "a"), para(&schema, ""), para(&schema, "b")],
            )
            .unwrap();
        // Cursor inside the empty middle paragraph.
        let state = state_at(&schema, vec![quote], 5);
        let tr = lift_empty_block(&state, state.tr()).unwrap();
        let next = state.apply(tr);
        // The quote splits in two at the empty block's boundary.
        assert_eq!(next.doc.child_count(), 2);
        assert_eq!(next.doc.child(0).kind().name, BLOCKQUOTE);
        assert_eq!(next.doc.child(1).kind().name, BLOCKQUOTE);
    }

    #[test]
    fn lift_empty_block_lifts_a_trailing_empty_block() {
        let schema = Schema::notebook();
        let quote = schema
            .node(
                BLOCKQUOTE,
                Attrs::new(),
                vec![para(&schema, "a"), para(&schema, "")],
            )
            .unwrap();
        let state = state_at(&schema, vec![quote], 5);
        let tr = lift_empty_block(&state, state.tr()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 2);
        assert_eq!(next.doc.child(0).kind().name, BLOCKQUOTE);
        assert_eq!(next.doc.child(1).kind().name, PARAGRAPH);
        assert_eq!(next.doc.child(1).content_size(), 0);
    }

    #[test]
    fn lift_empty_block_declines_in_a_non_empty_block() {
        let schema = Schema::notebook();
        let state = state_at(&schema, vec![para(&schema, "ab")], 1);
        assert!(lift_empty_block(&state, state.tr()).is_none());
    }

    #[test]
    fn join_backward_merges_two_paragraphs() {
        let schema = Schema::notebook();
        let state = state_at(&schema, vec![para(&schema, "ab"), para(&schema, "cd")], 5);
        let tr = join_backward(&state, state.tr()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 1);
        assert_eq!(next.doc.child(0).text_content(), "abcd");
    }

    #[test]
    fn join_backward_deletes_a_preceding_atom() {
        let schema = Schema::notebook();
        let atom = schema.node(DEMO_ASYNC_NODE, Attrs::new(), vec![]).unwrap();
        let state = state_at(&schema, vec![atom, para(&schema, "ab")], 2);
        let tr = join_backward(&state, state.tr()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 1);
        assert_eq!(next.doc.child(0).kind().name, PARAGRAPH);
        assert_eq!(next.doc.child(0).text_content(), "ab");
    }

    #[test]
    fn join_backward_declines_mid_block() {
        let schema = Schema::notebook();
        let state = state_at(&schema, vec![para(&schema, "ab")], 2);
        assert!(join_backward(&state, state.tr()).is_none());
    }

    #[test]
    fn join_backward_lifts_a_quoted_block_at_the_document_start() {
        let schema = Schema::notebook();
        let quote = schema
            .node(BLOCKQUOTE, Attrs::new(), vec![para(&schema, "ab")])
            .unwrap();
        let state = state_at(&schema, vec![quote], 2);
        let tr = join_backward(&state, state.tr()).unwrap();
        let next = state.apply(tr);
        assert_eq!(next.doc.child_count(), 1);
        assert_eq!(next.doc.child(0).kind().name, PARAGRAPH);
        assert_eq!(next.doc.child(0).text_content(), "ab");
    }
}
