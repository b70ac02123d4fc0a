use crate::node::{Fragment, Node};
use crate::resolve::{NodeRange, ResolvedPos};

/// Whether the node around `pos` can be split into two siblings there.
pub fn can_split(doc: &Node, pos: usize) -> bool {
    let Ok(rp) = doc.resolve(pos) else {
        return false;
    };
    let depth = rp.depth();
    if depth == 0 {
        return false;
    }
    let parent = rp.parent();
    if parent.kind().isolating {
        return false;
    }
    let offset = rp.parent_offset();
    let left = parent.content().cut(0, offset);
    let right = parent.content().cut(offset, parent.content_size());
    parent.kind().valid_content(&left) && parent.kind().valid_content(&right)
}

/// Whether the two nodes meeting at `pos` can be joined into one.
pub fn can_join(doc: &Node, pos: usize) -> bool {
    let Ok(rp) = doc.resolve(pos) else {
        return false;
    };
    if rp.text_offset() != 0 {
        return false;
    }
    let (Some(before), Some(after)) = (rp.node_before(), rp.node_after()) else {
        return false;
    };
    if before.is_leaf() || after.is_leaf() {
        return false;
    }
    if before.kind().isolating || after.kind().isolating {
        return false;
    }
    before.kind().compatible_content(after.kind())
}

/// The shallowest depth the given sibling range can be lifted to, scanning
/// outward from its direct parent. `None` when every candidate ancestor
/// either rejects the content or cannot be cut open around the range.
pub fn lift_target(range: &NodeRange) -> Option<usize> {
    let content = range
        .parent()
        .content()
        .cut_by_index(range.start_index(), range.end_index());
    let mut depth = range.depth;
    loop {
        let node = range.from.node(depth);
        let index = range.from.index(depth);
        let end_index = range.to.index_after(depth);
        if depth < range.depth && can_replace_range(node, index, end_index, &content) {
            return Some(depth);
        }
        if depth == 0 || node.kind().isolating || !can_cut(node, index, end_index) {
            return None;
        }
        depth -= 1;
    }
}

/// Whether replacing the children in `[index, end_index)` with `content`
/// keeps `node` valid.
fn can_replace_range(node: &Node, index: usize, end_index: usize, content: &Fragment) -> bool {
    let mut children = node.content().children()[..index].to_vec();
    children.extend(content.children().iter().cloned());
    children.extend(node.content().children()[end_index..].iter().cloned());
    node.kind().valid_content(&Fragment::from_vec(children))
}

/// Whether `node` stays valid when cut open around `[index, end_index)`,
/// keeping only the siblings on each side.
fn can_cut(node: &Node, index: usize, end_index: usize) -> bool {
    let before_ok = index == 0
        || node
            .kind()
            .valid_content(&node.content().cut_by_index(0, index));
    let after_ok = end_index == node.child_count()
        || node
            .kind()
            .valid_content(&node.content().cut_by_index(end_index, node.child_count()));
    before_ok && after_ok
}

/// The nearest position before `rp` where two nodes meet and could be cut
/// apart, scanning outward through non-isolating ancestors.
pub fn find_cut_before(doc: &Node, rp: &ResolvedPos) -> Option<ResolvedPos> {
    if rp.parent().kind().isolating {
        return None;
    }
    for depth in (0..rp.depth()).rev() {
        if rp.index(depth) > 0 {
            return doc.resolve(rp.before(depth + 1)).ok();
        }
        if rp.node(depth).kind().isolating {
            return None;
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Start,
    End,
}

/// Whether descending into `node` along the given side reaches a textblock.
pub fn textblock_at(node: &Node, side: Side) -> bool {
    let mut cur = Some(node);
    while let Some(node) = cur {
        if node.is_textblock() {
            return true;
        }
        cur = match side {
            Side::Start => node.first_child(),
            Side::End => node.last_child(),
        };
    }
    false
}
