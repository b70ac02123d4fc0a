use crate::error::EngineError;
use crate::node::Node;
use crate::schema::ContentExpr;

#[derive(Debug, Clone, PartialEq)]
struct PathStep {
    node: Node,
    index: usize,
    /// Absolute position before the child at `index`.
    before: usize,
}

/// A structural view of an integer position: the chain of ancestors from the
/// root, the child index at every depth, and the offset into the innermost
/// parent. Views are recomputed per document version and never survive an
/// edit; re-resolve through the transaction mapping instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPos {
    pub pos: usize,
    path: Vec<PathStep>,
    parent_offset: usize,
}

impl Node {
    /// Resolve an absolute position against this document.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, EngineError> {
        if pos > self.content_size() {
            return Err(EngineError::OutOfRange {
                pos,
                size: self.content_size(),
            });
        }
        let mut path = Vec::new();
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = self.clone();
        loop {
            let (index, offset) = node.content().find_index(parent_offset);
            let rem = parent_offset - offset;
            path.push(PathStep {
                node: node.clone(),
                index,
                before: start + offset,
            });
            if rem == 0 {
                break;
            }
            let child = node.child(index).clone();
            if child.is_text() {
                break;
            }
            parent_offset = rem - 1;
            start += offset + 1;
            node = child;
        }
        Ok(ResolvedPos {
            pos,
            path,
            parent_offset,
        })
    }
}

impl ResolvedPos {
    /// Depth of the innermost ancestor (root = 0).
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    /// Ancestor node at the given depth.
    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    /// The innermost ancestor.
    pub fn parent(&self) -> &Node {
        &self.path[self.depth()].node
    }

    /// Child index before the position within the ancestor at `depth`.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Index pointing after the position within the ancestor at `depth`.
    pub fn index_after(&self, depth: usize) -> usize {
        let index = self.index(depth);
        if depth == self.depth() && self.text_offset() == 0 {
            index
        } else {
            index + 1
        }
    }

    /// Offset of the position into its innermost parent's content.
    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    /// Distance into the text node the position points into, 0 when it sits
    /// on a node boundary.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.path.len() - 1].before
    }

    /// Position at the start of the content of the ancestor at `depth`.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].before + 1
        }
    }

    /// Position at the end of the content of the ancestor at `depth`.
    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content_size()
    }

    /// Position directly before the ancestor at `depth` (depth must be > 0).
    /// Asking one level past the innermost ancestor names the position
    /// itself, treated as the boundary before the next node.
    pub fn before(&self, depth: usize) -> usize {
        assert!(depth > 0, "there is no position before the root");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].before
        }
    }

    /// Position directly after the ancestor at `depth` (depth must be > 0),
    /// with the same one-past-the-depth boundary reading as `before`.
    pub fn after(&self, depth: usize) -> usize {
        assert!(depth > 0, "there is no position after the root");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].before + self.node(depth).size()
        }
    }

    /// The node directly after the position, cut open when the position sits
    /// inside a text node.
    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if index >= parent.child_count() {
            return None;
        }
        let d_off = self.text_offset();
        let child = parent.child(index);
        if d_off > 0 {
            Some(child.cut(d_off, child.text_len()))
        } else {
            Some(child.clone())
        }
    }

    /// The node directly before the position.
    pub fn node_before(&self) -> Option<Node> {
        let index = self.index(self.depth());
        let d_off = self.text_offset();
        if d_off > 0 {
            let child = self.parent().child(index);
            Some(child.cut(0, d_off))
        } else if index == 0 {
            None
        } else {
            Some(self.parent().child(index - 1).clone())
        }
    }

    /// The smallest range of sibling blocks around this position and
    /// `other`, or `None` when the two positions share no usable ancestor.
    pub fn block_range(&self, other: &ResolvedPos) -> Option<NodeRange> {
        if other.pos < self.pos {
            return other.block_range(self);
        }
        let inline_parent = matches!(
            self.parent().kind().content,
            ContentExpr::Inline | ContentExpr::Text
        );
        let adjust = if inline_parent || self.pos == other.pos {
            1
        } else {
            0
        };
        let mut d = self.depth() as isize - adjust as isize;
        while d >= 0 {
            let depth = d as usize;
            if other.pos <= self.end(depth) {
                return Some(NodeRange {
                    from: self.clone(),
                    to: other.clone(),
                    depth,
                });
            }
            d -= 1;
        }
        None
    }
}

/// A range of complete sibling nodes: the children of the ancestor at
/// `depth` between `start_index` and `end_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRange {
    pub from: ResolvedPos,
    pub to: ResolvedPos,
    pub depth: usize,
}

impl NodeRange {
    /// Position before the first covered child.
    pub fn start(&self) -> usize {
        self.from.before(self.depth + 1)
    }

    /// Position after the last covered child.
    pub fn end(&self) -> usize {
        self.to.after(self.depth + 1)
    }

    pub fn parent(&self) -> &Node {
        self.from.node(self.depth)
    }

    pub fn start_index(&self) -> usize {
        self.from.index(self.depth)
    }

    pub fn end_index(&self) -> usize {
        self.to.index_after(self.depth)
    }
}
