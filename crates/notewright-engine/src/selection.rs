use crate::node::Node;
use crate::transform::StepMap;

/// Where the user's focus sits in a document. Text selections live inside
/// textblocks, node selections cover exactly one selectable node, and gap
/// cursors mark a block boundary where no text position exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Text { anchor: usize, head: usize },
    Node { pos: usize },
    Gap { pos: usize },
}

impl Selection {
    /// A collapsed text selection.
    pub fn cursor(pos: usize) -> Selection {
        Selection::Text { anchor: pos, head: pos }
    }

    /// The fixed end: where the selection started.
    pub fn anchor(&self) -> usize {
        match *self {
            Selection::Text { anchor, .. } => anchor,
            Selection::Node { pos } | Selection::Gap { pos } => pos,
        }
    }

    /// The mobile end: where the selection currently points.
    pub fn head(&self) -> usize {
        match *self {
            Selection::Text { head, .. } => head,
            Selection::Node { pos } | Selection::Gap { pos } => pos,
        }
    }

    pub fn from(&self) -> usize {
        match *self {
            Selection::Text { anchor, head } => anchor.min(head),
            Selection::Node { pos } | Selection::Gap { pos } => pos,
        }
    }

    /// The end position. Node selections need the document to know the size
    /// of the covered node.
    pub fn to(&self, doc: &Node) -> usize {
        match *self {
            Selection::Text { anchor, head } => anchor.max(head),
            Selection::Node { pos } => {
                pos + doc.node_at(pos).map_or(0, Node::size)
            }
            Selection::Gap { pos } => pos,
        }
    }

    pub fn is_empty(&self, doc: &Node) -> bool {
        self.from() == self.to(doc)
    }

    /// The collapsed text position, if this is a plain cursor.
    pub fn cursor_pos(&self) -> Option<usize> {
        match *self {
            Selection::Text { anchor, head } if anchor == head => Some(anchor),
            _ => None,
        }
    }

    /// The covered ranges, for commands that operate on selected content.
    pub fn ranges(&self, doc: &Node) -> Vec<(usize, usize)> {
        vec![(self.from(), self.to(doc))]
    }

    /// Carry this selection through a step, against the document that step
    /// produced. Selections whose home no longer exists degrade to the
    /// nearest valid selection.
    pub fn map(&self, doc_after: &Node, map: &StepMap) -> Selection {
        match *self {
            Selection::Text { anchor, head } => {
                let anchor = map.map(anchor, 1);
                let head = map.map(head, 1);
                let inside_textblock = doc_after
                    .resolve(head)
                    .map(|rp| rp.parent().is_textblock())
                    .unwrap_or(false);
                if inside_textblock {
                    Selection::Text { anchor, head }
                } else {
                    Selection::near(doc_after, head, 1)
                }
            }
            Selection::Node { pos } => {
                let (mapped, deleted) = map.map_result(pos, 1);
                let still_there = !deleted
                    && doc_after
                        .node_at(mapped)
                        .is_some_and(|node| node.kind().selectable && node.is_atom());
                if still_there {
                    Selection::Node { pos: mapped }
                } else {
                    Selection::near(doc_after, mapped, 1)
                }
            }
            Selection::Gap { pos } => {
                let mapped = map.map(pos, -1);
                if gap_valid(doc_after, mapped) {
                    Selection::Gap { pos: mapped }
                } else {
                    Selection::near(doc_after, mapped, 1)
                }
            }
        }
    }

    /// The nearest valid selection around `pos`, preferring a text cursor,
    /// then a selectable node, then a gap cursor, scanning in the direction
    /// of `bias` first.
    pub fn near(doc: &Node, pos: usize, bias: i8) -> Selection {
        let dir = if bias < 0 { -1 } else { 1 };
        if let Some(found) = Selection::find_from(doc, pos, dir) {
            return found;
        }
        if let Some(found) = Selection::find_from(doc, pos, -dir) {
            return found;
        }
        if gap_valid(doc, pos) {
            return Selection::Gap { pos };
        }
        Selection::cursor(pos.min(doc.content_size()))
    }

    /// Scan from `pos` in the given direction for the first valid text or
    /// node selection.
    pub fn find_from(doc: &Node, pos: usize, dir: i8) -> Option<Selection> {
        let rp = doc.resolve(pos).ok()?;
        if rp.parent().is_textblock() {
            return Some(Selection::cursor(pos));
        }
        let depth = rp.depth();
        if let Some(found) = find_selection_in(rp.parent(), pos, rp.index(depth), dir) {
            return Some(found);
        }
        for d in (0..depth).rev() {
            let found = if dir < 0 {
                find_selection_in(rp.node(d), rp.before(d + 1), rp.index(d), dir)
            } else {
                find_selection_in(rp.node(d), rp.after(d + 1), rp.index(d) + 1, dir)
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// Depth-first scan through `node`'s children starting at `index`, moving in
/// `dir`, for a cursor position or selectable atom. `pos` is the absolute
/// position at which the scan starts.
fn find_selection_in(node: &Node, pos: usize, index: usize, dir: i8) -> Option<Selection> {
    if node.is_textblock() {
        return Some(Selection::cursor(pos));
    }
    let count = node.child_count();
    let mut i = if dir > 0 {
        index as isize
    } else {
        index as isize - 1
    };
    let mut pos = pos as isize;
    while if dir > 0 { i < count as isize } else { i >= 0 } {
        let child = node.child(i as usize);
        if !child.is_atom() {
            let inner_pos = pos + dir as isize;
            let inner_index = if dir > 0 { 0 } else { child.child_count() };
            if let Some(found) =
                find_selection_in(child, inner_pos as usize, inner_index, dir)
            {
                return Some(found);
            }
        } else if child.kind().selectable {
            let at = if dir < 0 {
                pos - child.size() as isize
            } else {
                pos
            };
            return Some(Selection::Node { pos: at as usize });
        }
        pos += child.size() as isize * dir as isize;
        i += dir as isize;
    }
    None
}

/// A gap cursor is only valid at a block boundary whose neighbours offer no
/// text position: each side is either the parent's edge, an atom, or an
/// isolating node.
pub fn gap_valid(doc: &Node, pos: usize) -> bool {
    let Ok(rp) = doc.resolve(pos) else {
        return false;
    };
    if rp.parent().is_textblock() || rp.text_offset() != 0 {
        return false;
    }
    let closed = |node: Option<Node>| {
        node.is_none_or(|n| n.is_atom() || n.kind().isolating)
    };
    closed(rp.node_before()) && closed(rp.node_after())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attrs, DEMO_ASYNC_NODE, DOC, PARAGRAPH, Schema};
    use crate::transform::StepMap;
    use pretty_assertions::assert_eq;

    fn para(schema: &Schema, text: &str) -> Node {
        let children = if text.is_empty() {
            vec![]
        } else {
            vec![schema.text(text)]
        };
        schema.node(PARAGRAPH, Attrs::new(), children).unwrap()
    }

    fn atom(schema: &Schema) -> Node {
        schema.node(DEMO_ASYNC_NODE, Attrs::new(), vec![]).unwrap()
    }

    #[test]
    fn near_prefers_a_text_cursor() {
        let schema = Schema::notebook();
        let doc = schema
            .node(DOC, Attrs::new(), vec![para(&schema, "ab")])
            .unwrap();
        // At a block boundary the scan enters the following textblock.
        assert_eq!(Selection::near(&doc, 0, 1), Selection::cursor(1));
        // Inside the textblock the position itself is fine.
        assert_eq!(Selection::near(&doc, 2, 1), Selection::cursor(2));
    }

    #[test]
    fn near_selects_an_atom_when_no_textblock_follows() {
        let schema = Schema::notebook();
        let doc = schema
            .node(DOC, Attrs::new(), vec![para(&schema, "ab"), atom(&schema)])
            .unwrap();
        // Forward from the boundary before the atom: node selection.
        assert_eq!(Selection::near(&doc, 4, 1), Selection::Node { pos: 4 });
        // Backward bias walks into the paragraph instead, landing at its end.
        assert_eq!(Selection::near(&doc, 4, -1), Selection::cursor(3));
    }

    #[test]
    fn text_selection_follows_a_deletion_before_it() {
        let schema = Schema::notebook();
        let doc = schema
            .node(DOC, Attrs::new(), vec![para(&schema, "cd")])
            .unwrap();
        // A deletion of two tokens before the cursor shifts it left.
        let map = StepMap::new(vec![(0, 2, 0)]);
        let sel = Selection::cursor(3).map(&doc, &map);
        assert_eq!(sel, Selection::cursor(1));
    }

    #[test]
    fn node_selection_degrades_when_its_node_is_deleted() {
        let schema = Schema::notebook();
        // Document after the atom at position 4 was deleted.
        let doc = schema
            .node(DOC, Attrs::new(), vec![para(&schema, "ab")])
            .unwrap();
        let map = StepMap::new(vec![(4, 1, 0)]);
        let sel = Selection::Node { pos: 4 }.map(&doc, &map);
        assert_eq!(sel, Selection::cursor(3));
    }

    #[test]
    fn gap_cursor_sits_between_closed_blocks() {
        let schema = Schema::notebook();
        let doc = schema
            .node(DOC, Attrs::new(), vec![atom(&schema), atom(&schema)])
            .unwrap();
        assert!(gap_valid(&doc, 1));
        assert!(gap_valid(&doc, 0));
        let doc = schema
            .node(DOC, Attrs::new(), vec![para(&schema, "ab")])
            .unwrap();
        assert!(!gap_valid(&doc, 2));
    }
}
