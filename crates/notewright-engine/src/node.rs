use std::sync::Arc;

use serde_json::Value;

use crate::error::EngineError;
use crate::schema::{ATTR_ID, Attrs, NodeType};

/// An ordered sequence of sibling nodes. The child vector is behind an `Arc`
/// so that untouched subtrees are shared between document versions.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    children: Arc<Vec<Node>>,
    size: usize,
}

impl Fragment {
    pub fn empty() -> Self {
        Self {
            children: Arc::new(Vec::new()),
            size: 0,
        }
    }

    pub fn from_vec(children: Vec<Node>) -> Self {
        let size = children.iter().map(Node::size).sum();
        Self {
            children: Arc::new(children),
            size,
        }
    }

    /// Total number of addressable positions the fragment occupies.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> &Node {
        &self.children[index]
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Children in `[from_index, to_index)`.
    pub fn cut_by_index(&self, from_index: usize, to_index: usize) -> Fragment {
        Fragment::from_vec(self.children[from_index..to_index].to_vec())
    }

    pub fn append(&self, other: &Fragment) -> Fragment {
        if other.child_count() == 0 {
            return self.clone();
        }
        let mut children = (*self.children).clone();
        children.extend(other.children.iter().cloned());
        Fragment::from_vec(children)
    }

    /// Cut the sub-fragment between two positions, slicing partially covered
    /// children open (text by character offset, containers by content cut).
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to == self.size {
            return self.clone();
        }
        let mut result = Vec::new();
        if to > from {
            let mut pos = 0;
            for child in self.children.iter() {
                if pos >= to {
                    break;
                }
                let end = pos + child.size();
                if end > from {
                    if pos < from || end > to {
                        let cut = if child.is_text() {
                            let len = child.text_len();
                            child.cut(from.saturating_sub(pos), (to - pos).min(len))
                        } else {
                            child.cut(
                                (from.saturating_sub(pos + 1)).min(child.content_size()),
                                (to.saturating_sub(pos + 1)).min(child.content_size()),
                            )
                        };
                        result.push(cut);
                    } else {
                        result.push(child.clone());
                    }
                }
                pos = end;
            }
        }
        Fragment::from_vec(result)
    }

    /// Index of the child at (or right after) `pos`, and the position at
    /// which the returned index starts. A `pos` on a child boundary resolves
    /// to the following index.
    pub(crate) fn find_index(&self, pos: usize) -> (usize, usize) {
        if pos == 0 {
            return (0, 0);
        }
        let mut cur = 0;
        for (i, child) in self.children.iter().enumerate() {
            let end = cur + child.size();
            if pos <= end {
                if pos == end {
                    return (i + 1, end);
                }
                return (i, cur);
            }
            cur = end;
        }
        (self.children.len(), cur)
    }

    fn nodes_between(
        &self,
        from: usize,
        to: usize,
        node_start: usize,
        f: &mut dyn FnMut(&Node, usize) -> bool,
    ) {
        let mut pos = 0;
        for child in self.children.iter() {
            if pos >= to {
                break;
            }
            let end = pos + child.size();
            if end > from && f(child, node_start + pos) && child.content_size() > 0 {
                let start = pos + 1;
                child.content.nodes_between(
                    from.saturating_sub(start),
                    (to - start).min(child.content_size()),
                    node_start + start,
                    f,
                );
            }
            pos = end;
        }
    }
}

/// A typed, immutable tree element of the document. Every edit produces a new
/// `Node` value; existing values are never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) kind: Arc<NodeType>,
    pub(crate) attrs: Attrs,
    pub(crate) content: Fragment,
    pub(crate) text: Option<String>,
}

impl Node {
    pub(crate) fn container(kind: Arc<NodeType>, attrs: Attrs, content: Fragment) -> Self {
        Self {
            kind,
            attrs,
            content,
            text: None,
        }
    }

    pub(crate) fn text(kind: Arc<NodeType>, text: &str) -> Self {
        Self {
            kind,
            attrs: Attrs::new(),
            content: Fragment::empty(),
            text: Some(text.to_string()),
        }
    }

    pub fn kind(&self) -> &Arc<NodeType> {
        &self.kind
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn content(&self) -> &Fragment {
        &self.content
    }

    pub fn child_count(&self) -> usize {
        self.content.child_count()
    }

    pub fn child(&self, index: usize) -> &Node {
        self.content.child(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.children().first()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.children().last()
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn is_block(&self) -> bool {
        self.kind.is_block()
    }

    pub fn is_textblock(&self) -> bool {
        self.kind.is_textblock()
    }

    pub fn is_atom(&self) -> bool {
        self.kind.is_atom()
    }

    pub fn is_leaf(&self) -> bool {
        self.is_text() || self.kind.is_leaf()
    }

    pub(crate) fn text_len(&self) -> usize {
        self.text.as_deref().map_or(0, |t| t.chars().count())
    }

    /// Count of addressable positions this node occupies: character count for
    /// text, 1 for leaf atoms, open + content + close otherwise.
    pub fn size(&self) -> usize {
        if self.is_text() {
            self.text_len()
        } else if self.kind.is_leaf() {
            1
        } else {
            self.content.size() + 2
        }
    }

    pub fn content_size(&self) -> usize {
        self.content.size()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        let mut out = String::new();
        for child in self.content.children() {
            out.push_str(&child.text_content());
        }
        out
    }

    /// A copy of this node with different content (type and attributes kept).
    pub fn copy(&self, content: Fragment) -> Node {
        Node::container(Arc::clone(&self.kind), self.attrs.clone(), content)
    }

    pub fn with_attrs(&self, attrs: Attrs) -> Node {
        Node {
            kind: Arc::clone(&self.kind),
            attrs,
            content: self.content.clone(),
            text: self.text.clone(),
        }
    }

    /// Cut a sub-node: a substring for text nodes (character offsets), a
    /// content cut for containers.
    pub fn cut(&self, from: usize, to: usize) -> Node {
        if let Some(text) = &self.text {
            let sub: String = text.chars().skip(from).take(to.saturating_sub(from)).collect();
            Node {
                kind: Arc::clone(&self.kind),
                attrs: self.attrs.clone(),
                content: Fragment::empty(),
                text: Some(sub),
            }
        } else {
            self.copy(self.content.cut(from, to))
        }
    }

    /// Replace the children in `[from_index, to_index)`, sharing untouched
    /// siblings. Fails when the result violates this node's content rule.
    pub fn replace_child_range(
        &self,
        from_index: usize,
        to_index: usize,
        new_children: Vec<Node>,
    ) -> Result<Node, EngineError> {
        let mut children = self.content.children()[..from_index].to_vec();
        children.extend(new_children);
        children.extend(self.content.children()[to_index..].iter().cloned());
        let content = Fragment::from_vec(children);
        if !self.kind.valid_content(&content) {
            return Err(EngineError::InvalidContent(self.kind.name.to_string()));
        }
        Ok(self.copy(content))
    }

    /// Visit every node intersecting `[from, to)` with its absolute position.
    /// The callback's return value decides whether to descend.
    pub fn nodes_between(
        &self,
        from: usize,
        to: usize,
        f: &mut dyn FnMut(&Node, usize) -> bool,
    ) {
        self.content.nodes_between(from, to, 0, f);
    }

    /// The node starting directly at `pos` (descending through openings), as
    /// in node-selection addressing.
    pub fn node_at(&self, pos: usize) -> Option<&Node> {
        let mut node = self;
        let mut pos = pos;
        loop {
            let (index, offset) = node.content.find_index(pos);
            if index >= node.child_count() {
                return None;
            }
            let child = node.content.child(index);
            if pos == offset {
                return Some(child);
            }
            if child.is_leaf() {
                return None;
            }
            node = child;
            pos = pos - offset - 1;
        }
    }

    /// Document-wide lookup by stable node identifier. Positions shift across
    /// edits; identifiers do not.
    pub fn find_node_by_id(&self, id: &str) -> Option<(Node, usize)> {
        let mut found = None;
        self.nodes_between(0, self.content_size(), &mut |node, pos| {
            if found.is_some() {
                return false;
            }
            if node.attrs.get(ATTR_ID) == Some(&Value::from(id)) {
                found = Some((node.clone(), pos));
                return false;
            }
            true
        });
        found
    }
}
