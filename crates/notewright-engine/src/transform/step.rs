use std::sync::Arc;

use crate::error::EngineError;
use crate::node::{Fragment, Node};
use crate::resolve::NodeRange;
use crate::schema::{Attrs, NodeType};

/// The position translation of a single step: a sorted list of
/// `(start, old_size, new_size)` spans. Positions outside every span shift by
/// the accumulated size difference; positions inside a span collapse to one
/// of its boundaries, chosen by the caller-supplied bias.
#[derive(Debug, Clone, Default)]
pub struct StepMap {
    ranges: Vec<(usize, usize, usize)>,
}

impl StepMap {
    pub fn identity() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn new(ranges: Vec<(usize, usize, usize)>) -> Self {
        Self { ranges }
    }

    /// Map a position through this step. `assoc` (-1 or +1) picks the earlier
    /// or later boundary when the position falls inside a replaced span.
    pub fn map(&self, pos: usize, assoc: i8) -> usize {
        self.map_result(pos, assoc).0
    }

    /// Map a position, also reporting whether it sat strictly inside a
    /// replaced span (its exact location no longer exists).
    pub fn map_result(&self, pos: usize, assoc: i8) -> (usize, bool) {
        let mut diff: isize = 0;
        for &(start, old_size, new_size) in &self.ranges {
            if start > pos {
                break;
            }
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    -1
                } else if pos == end {
                    1
                } else {
                    assoc
                };
                let base = (start as isize + diff) as usize;
                let mapped = if side < 0 { base } else { base + new_size };
                let deleted = pos > start && pos < end;
                return (mapped, deleted);
            }
            diff += new_size as isize - old_size as isize;
        }
        ((pos as isize + diff) as usize, false)
    }
}

/// Composition of the step maps accumulated by a transaction. Positions from
/// the base document must be pushed through the whole mapping (or the suffix
/// starting at the step they were resolved against) before being used again.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    maps: Vec<StepMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, map: StepMap) {
        self.maps.push(map);
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn map(&self, pos: usize, assoc: i8) -> usize {
        self.map_from(0, pos, assoc)
    }

    /// Map through only the maps appended at or after index `start`.
    pub fn map_from(&self, start: usize, pos: usize, assoc: i8) -> usize {
        let mut pos = pos;
        for map in &self.maps[start..] {
            pos = map.map(pos, assoc);
        }
        pos
    }

    pub fn map_result(&self, pos: usize, assoc: i8) -> (usize, bool) {
        let mut pos = pos;
        let mut deleted = false;
        for map in &self.maps {
            let (p, d) = map.map_result(pos, assoc);
            pos = p;
            deleted = deleted || d;
        }
        (pos, deleted)
    }
}

/// An atomic, invertible document mutation. Each step applies to a specific
/// document version and carries enough information to compute how positions
/// in that version map into the result.
#[derive(Debug, Clone)]
pub enum Step {
    /// Replace `[from, to)` with new content. Both ends must sit in the same
    /// parent node.
    Replace {
        from: usize,
        to: usize,
        slice: Fragment,
    },
    /// Change the type and attributes of the node starting at `pos`, keeping
    /// its content.
    SetNodeMarkup {
        pos: usize,
        kind: Arc<NodeType>,
        attrs: Attrs,
    },
    /// Split the node around `pos` into two siblings at that point.
    Split {
        pos: usize,
        kind_after: Option<(Arc<NodeType>, Attrs)>,
    },
    /// Join the two nodes meeting at `pos` into one.
    Join { pos: usize },
    /// Remove `depth - target` levels of nesting around the sibling range
    /// `[from, to]`, re-parenting its content at `target`.
    Lift {
        from: usize,
        to: usize,
        depth: usize,
        target: usize,
    },
}

impl Step {
    /// Apply this step to a document, producing the next version. The input
    /// document is never mutated.
    pub fn apply(&self, doc: &Node) -> Result<Node, EngineError> {
        match self {
            Step::Replace { from, to, slice } => apply_replace(doc, *from, *to, slice),
            Step::SetNodeMarkup { pos, kind, attrs } => {
                apply_set_markup(doc, *pos, kind, attrs.clone())
            }
            Step::Split { pos, kind_after } => apply_split(doc, *pos, kind_after.as_ref()),
            Step::Join { pos } => apply_join(doc, *pos),
            Step::Lift {
                from,
                to,
                depth,
                target,
            } => apply_lift(doc, *from, *to, *depth, *target),
        }
    }

    /// The position mapping this step contributes once applied.
    pub fn map(&self, doc: &Node) -> Result<StepMap, EngineError> {
        match self {
            Step::Replace { from, to, slice } => {
                Ok(StepMap::new(vec![(*from, to - from, slice.size())]))
            }
            Step::SetNodeMarkup { .. } => Ok(StepMap::identity()),
            Step::Split { pos, .. } => Ok(StepMap::new(vec![(*pos, 0, 2)])),
            Step::Join { pos } => Ok(StepMap::new(vec![(pos - 1, 2, 0)])),
            Step::Lift {
                from,
                to,
                depth,
                target,
            } => {
                let shape = lift_shape(doc, *from, *to, *depth, *target)?;
                Ok(StepMap::new(vec![
                    (
                        shape.gap_start - shape.removed_before,
                        shape.removed_before,
                        shape.added_before,
                    ),
                    (shape.gap_end, shape.removed_after, shape.added_after),
                ]))
            }
        }
    }

    /// The step that undoes this one, given the document it was applied to.
    pub fn invert(&self, doc: &Node) -> Result<Step, EngineError> {
        match self {
            Step::Replace { from, to, slice } => {
                let old = cut_in_parent(doc, *from, *to)?;
                Ok(Step::Replace {
                    from: *from,
                    to: from + slice.size(),
                    slice: old,
                })
            }
            Step::SetNodeMarkup { pos, .. } => {
                let node = doc
                    .node_at(*pos)
                    .ok_or(EngineError::OutOfRange {
                        pos: *pos,
                        size: doc.content_size(),
                    })?;
                Ok(Step::SetNodeMarkup {
                    pos: *pos,
                    kind: Arc::clone(node.kind()),
                    attrs: node.attrs().clone(),
                })
            }
            Step::Split { pos, .. } => Ok(Step::Join { pos: pos + 1 }),
            Step::Join { pos } => {
                let rp = doc.resolve(*pos)?;
                let after = rp
                    .node_after()
                    .ok_or(EngineError::CannotJoin(*pos))?;
                Ok(Step::Split {
                    pos: pos - 1,
                    kind_after: Some((Arc::clone(after.kind()), after.attrs().clone())),
                })
            }
            Step::Lift {
                from,
                to,
                depth,
                target,
            } => {
                let shape = lift_shape(doc, *from, *to, *depth, *target)?;
                let old_from = shape.gap_start - shape.removed_before;
                let old_to = shape.gap_end + shape.removed_after;
                let new_size = (shape.gap_end - shape.gap_start)
                    + shape.added_before
                    + shape.added_after;
                let old = cut_in_parent_at(doc, old_from, old_to, *target)?;
                Ok(Step::Replace {
                    from: old_from,
                    to: old_from + new_size,
                    slice: old,
                })
            }
        }
    }
}

struct LiftShape {
    gap_start: usize,
    gap_end: usize,
    removed_before: usize,
    added_before: usize,
    removed_after: usize,
    added_after: usize,
}

/// Walk the ancestor levels between the lifted range and the target depth,
/// deciding for each side whether the level dissolves (its boundary tokens
/// vanish) or splits (a remainder wrapper keeps the outside siblings).
fn lift_shape(
    doc: &Node,
    from: usize,
    to: usize,
    depth: usize,
    target: usize,
) -> Result<LiftShape, EngineError> {
    if target >= depth {
        return Err(EngineError::InvalidLiftTarget { target, depth });
    }
    let range = resolve_range(doc, from, to, depth)?;
    let (rf, rt) = (&range.from, &range.to);
    let mut removed_before = 0;
    let mut added_before = 0;
    let mut removed_after = 0;
    let mut added_after = 0;
    let mut splitting_left = false;
    let mut splitting_right = false;
    for d in ((target + 1)..=depth).rev() {
        let node = rf.node(d);
        let li = if d == depth {
            range.start_index()
        } else {
            rf.index(d)
        };
        let ri = if d == depth {
            range.end_index()
        } else {
            rt.index_after(d)
        };
        if li > 0 || splitting_left {
            splitting_left = true;
            added_before += 1;
        } else {
            removed_before += 1;
        }
        if ri < node.child_count() || splitting_right {
            splitting_right = true;
            added_after += 1;
        } else {
            removed_after += 1;
        }
    }
    Ok(LiftShape {
        gap_start: range.start(),
        gap_end: range.end(),
        removed_before,
        added_before,
        removed_after,
        added_after,
    })
}

fn resolve_range(
    doc: &Node,
    from: usize,
    to: usize,
    depth: usize,
) -> Result<NodeRange, EngineError> {
    let rf = doc.resolve(from)?;
    let rt = doc.resolve(to)?;
    Ok(NodeRange {
        from: rf,
        to: rt,
        depth,
    })
}

/// Merge adjacent text children so that replace surgery never leaves two
/// text nodes touching.
fn merge_text(children: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(children.len());
    for child in children {
        match out.last_mut() {
            Some(prev) if prev.is_text() && child.is_text() => {
                let joined = format!("{}{}", prev.text_content(), child.text_content());
                *prev = Node::text(Arc::clone(prev.kind()), &joined);
            }
            _ => out.push(child),
        }
    }
    out
}

/// Rebuild the ancestor chain above `depth` after the node at that depth was
/// replaced, sharing all untouched siblings.
fn rebuild(
    rp: &crate::resolve::ResolvedPos,
    depth: usize,
    replacement: Node,
) -> Result<Node, EngineError> {
    let mut node = replacement;
    for d in (0..depth).rev() {
        let index = rp.index(d);
        node = rp.node(d).replace_child_range(index, index + 1, vec![node])?;
    }
    Ok(node)
}

fn apply_replace(
    doc: &Node,
    from: usize,
    to: usize,
    slice: &Fragment,
) -> Result<Node, EngineError> {
    if from > to {
        return Err(EngineError::InvalidReplacement { from, to });
    }
    let rf = doc.resolve(from)?;
    let rt = doc.resolve(to)?;
    let depth = rf.depth();
    if rt.depth() != depth || rf.start(depth) != rt.start(depth) {
        // Cross-parent replacement is not expressible as a single surgery.
        return Err(EngineError::InvalidReplacement { from, to });
    }
    let parent = rf.parent();
    let start = rf.start(depth);
    let mut children = parent.content().cut(0, from - start).children().to_vec();
    children.extend(slice.children().iter().cloned());
    children.extend(
        parent
            .content()
            .cut(to - start, parent.content_size())
            .children()
            .iter()
            .cloned(),
    );
    let content = Fragment::from_vec(merge_text(children));
    if !parent.kind().valid_content(&content) {
        return Err(EngineError::InvalidReplacement { from, to });
    }
    rebuild(&rf, depth, parent.copy(content))
}

fn apply_set_markup(
    doc: &Node,
    pos: usize,
    kind: &Arc<NodeType>,
    attrs: Attrs,
) -> Result<Node, EngineError> {
    let rp = doc.resolve(pos)?;
    let node = rp.node_after().ok_or(EngineError::OutOfRange {
        pos,
        size: doc.content_size(),
    })?;
    if node.is_text() || !kind.valid_content(node.content()) {
        return Err(EngineError::InvalidContent(kind.name.to_string()));
    }
    let mut merged = kind.default_attrs.clone();
    merged.extend(attrs);
    let replacement = Node::container(Arc::clone(kind), merged, node.content().clone());
    let depth = rp.depth();
    let index = rp.index(depth);
    let new_parent = rp
        .parent()
        .replace_child_range(index, index + 1, vec![replacement])?;
    rebuild(&rp, depth, new_parent)
}

fn apply_split(
    doc: &Node,
    pos: usize,
    kind_after: Option<&(Arc<NodeType>, Attrs)>,
) -> Result<Node, EngineError> {
    let rp = doc.resolve(pos)?;
    let depth = rp.depth();
    if depth == 0 {
        return Err(EngineError::CannotSplit(pos));
    }
    let parent = rp.parent();
    let offset = rp.parent_offset();
    let left = parent.content().cut(0, offset);
    let right = parent.content().cut(offset, parent.content_size());
    let node_a = parent.copy(left);
    let node_b = match kind_after {
        Some((kind, attrs)) => Node::container(Arc::clone(kind), attrs.clone(), right),
        None => parent.copy(right),
    };
    if !node_a.kind().valid_content(node_a.content())
        || !node_b.kind().valid_content(node_b.content())
    {
        return Err(EngineError::CannotSplit(pos));
    }
    let index = rp.index(depth - 1);
    let new_grandparent =
        rp.node(depth - 1)
            .replace_child_range(index, index + 1, vec![node_a, node_b])?;
    rebuild(&rp, depth - 1, new_grandparent)
}

fn apply_join(doc: &Node, pos: usize) -> Result<Node, EngineError> {
    let rp = doc.resolve(pos)?;
    if rp.text_offset() != 0 {
        return Err(EngineError::CannotJoin(pos));
    }
    let before = rp.node_before().ok_or(EngineError::CannotJoin(pos))?;
    let after = rp.node_after().ok_or(EngineError::CannotJoin(pos))?;
    if before.is_leaf() || after.is_leaf() || !before.kind().compatible_content(after.kind()) {
        return Err(EngineError::CannotJoin(pos));
    }
    let mut children = before.content().children().to_vec();
    children.extend(after.content().children().iter().cloned());
    let content = Fragment::from_vec(merge_text(children));
    if !before.kind().valid_content(&content) {
        return Err(EngineError::CannotJoin(pos));
    }
    let merged = before.copy(content);
    let depth = rp.depth();
    let index = rp.index(depth);
    let new_parent = rp
        .parent()
        .replace_child_range(index - 1, index + 1, vec![merged])?;
    rebuild(&rp, depth, new_parent)
}

fn apply_lift(
    doc: &Node,
    from: usize,
    to: usize,
    depth: usize,
    target: usize,
) -> Result<Node, EngineError> {
    if target >= depth {
        return Err(EngineError::InvalidLiftTarget { target, depth });
    }
    let range = resolve_range(doc, from, to, depth)?;
    let (rf, rt) = (range.from.clone(), range.to.clone());
    let lifted: Vec<Node> = range.parent().content().children()
        [range.start_index()..range.end_index()]
        .to_vec();

    let mut left_acc: Option<Node> = None;
    let mut right_acc: Option<Node> = None;
    for d in ((target + 1)..=depth).rev() {
        let node = rf.node(d);
        let li = if d == depth {
            range.start_index()
        } else {
            rf.index(d)
        };
        let ri = if d == depth {
            range.end_index()
        } else {
            rt.index_after(d)
        };
        let left = &node.content().children()[..li];
        let right = &node.content().children()[ri..];
        if !left.is_empty() || left_acc.is_some() {
            let mut kids = left.to_vec();
            if let Some(wrapper) = left_acc.take() {
                kids.push(wrapper);
            }
            left_acc = Some(node.copy(Fragment::from_vec(kids)));
        }
        if !right.is_empty() || right_acc.is_some() {
            let mut kids = Vec::new();
            if let Some(wrapper) = right_acc.take() {
                kids.push(wrapper);
            }
            kids.extend(right.iter().cloned());
            right_acc = Some(node.copy(Fragment::from_vec(kids)));
        }
    }

    let mut new_children = Vec::new();
    if let Some(wrapper) = left_acc {
        new_children.push(wrapper);
    }
    new_children.extend(lifted);
    if let Some(wrapper) = right_acc {
        new_children.push(wrapper);
    }
    let t_index = rf.index(target);
    let t_index_after = rt.index_after(target);
    let new_target = rf
        .node(target)
        .replace_child_range(t_index, t_index_after, new_children)?;
    rebuild(&rf, target, new_target)
}

/// Cut the fragment between two positions sharing a parent.
fn cut_in_parent(doc: &Node, from: usize, to: usize) -> Result<Fragment, EngineError> {
    let rf = doc.resolve(from)?;
    let depth = rf.depth();
    let start = rf.start(depth);
    Ok(rf.parent().content().cut(from - start, to - start))
}

/// Cut the children of the ancestor at `depth` between two positions.
fn cut_in_parent_at(
    doc: &Node,
    from: usize,
    to: usize,
    depth: usize,
) -> Result<Fragment, EngineError> {
    let rf = doc.resolve(from)?;
    let start = rf.start(depth);
    Ok(rf.node(depth).content().cut(from - start, to - start))
}
