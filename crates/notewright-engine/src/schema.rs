use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::node::{Fragment, Node};

/// Attribute map carried by every node (name to JSON value).
pub type Attrs = std::collections::BTreeMap<String, Value>;

// Attribute names shared between the engine and its collaborators.
pub const ATTR_ID: &str = "id";
pub const ATTR_LEVEL: &str = "level";
pub const ATTR_LANGUAGE: &str = "language";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_TEXT: &str = "text";
pub const ATTR_SRC: &str = "src";
pub const ATTR_UPLOADED: &str = "uploaded";
pub const ATTR_MARKS: &str = "marks";

// Node type names. The set is closed: every document is built from these.
pub const DOC: &str = "doc";
pub const PARAGRAPH: &str = "paragraph";
pub const HEADING: &str = "heading";
pub const CODE_BLOCK: &str = "codeBlock";
pub const BLOCKQUOTE: &str = "blockquote";
pub const DEMO_ASYNC_NODE: &str = "demoAsyncNode";
pub const IMAGE: &str = "image";
pub const MARK_HOLDER: &str = "markHolder";
pub const TEXT: &str = "text";

/// Execution status carried by async nodes while remote work is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AsyncNodeStatus {
    NeverExecuted,
    Processing,
    Success,
    Error,
}

impl AsyncNodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncNodeStatus::NeverExecuted => "neverExecuted",
            AsyncNodeStatus::Processing => "processing",
            AsyncNodeStatus::Success => "success",
            AsyncNodeStatus::Error => "error",
        }
    }
}

/// What a node type allows as children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentExpr {
    /// No content at all (leaf / atom nodes).
    Empty,
    /// Zero or more inline nodes (textblocks such as paragraph or heading).
    Inline,
    /// Zero or more text nodes only (code blocks).
    Text,
    /// One or more block nodes (doc, blockquote).
    Blocks,
}

/// A node type from the closed registry. Carries the content-validation rule
/// and the structural flags the transform layer consults.
#[derive(Debug, PartialEq)]
pub struct NodeType {
    pub name: &'static str,
    pub content: ContentExpr,
    pub inline: bool,
    /// Atom nodes have fixed content and cannot be descended into.
    pub atom: bool,
    /// Whether a node selection may point at this node.
    pub selectable: bool,
    /// Isolating nodes act as barriers for joins and cut-point scans.
    pub isolating: bool,
    pub default_attrs: Attrs,
}

impl NodeType {
    pub fn is_block(&self) -> bool {
        !self.inline && self.name != TEXT
    }

    pub fn is_text(&self) -> bool {
        self.name == TEXT
    }

    pub fn is_textblock(&self) -> bool {
        self.is_block() && matches!(self.content, ContentExpr::Inline | ContentExpr::Text)
    }

    pub fn is_leaf(&self) -> bool {
        self.content == ContentExpr::Empty
    }

    pub fn is_atom(&self) -> bool {
        self.atom || self.is_leaf()
    }

    /// Whether a child of the given type is admissible under this type's
    /// content expression.
    pub fn allows_child(&self, child: &NodeType) -> bool {
        match self.content {
            ContentExpr::Empty => false,
            ContentExpr::Inline => child.inline || child.is_text(),
            ContentExpr::Text => child.is_text(),
            ContentExpr::Blocks => child.is_block(),
        }
    }

    /// Validate a full child fragment against the content expression.
    pub fn valid_content(&self, content: &Fragment) -> bool {
        match self.content {
            ContentExpr::Empty => content.child_count() == 0,
            ContentExpr::Blocks => {
                content.child_count() > 0
                    && content.children().iter().all(|c| c.kind().is_block())
            }
            _ => content
                .children()
                .iter()
                .all(|c| self.allows_child(c.kind())),
        }
    }

    /// Content types that can be merged into one node. Two textblocks are
    /// compatible when text is admissible in both; block containers are
    /// compatible with each other.
    pub fn compatible_content(&self, other: &NodeType) -> bool {
        match (self.content, other.content) {
            (ContentExpr::Inline | ContentExpr::Text, ContentExpr::Inline | ContentExpr::Text) => {
                true
            }
            (ContentExpr::Blocks, ContentExpr::Blocks) => true,
            _ => false,
        }
    }
}

/// The closed node-type registry. Types are registered once, in order, at
/// construction; lookup is by name.
#[derive(Debug)]
pub struct Schema {
    types: Vec<Arc<NodeType>>,
    by_name: HashMap<&'static str, usize>,
}

impl Schema {
    fn register(types: Vec<NodeType>) -> Self {
        let types: Vec<Arc<NodeType>> = types.into_iter().map(Arc::new).collect();
        let by_name = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();
        Self { types, by_name }
    }

    /// The standard notebook schema.
    pub fn notebook() -> Arc<Self> {
        let none = Attrs::new();
        Arc::new(Self::register(vec![
            NodeType {
                name: DOC,
                content: ContentExpr::Blocks,
                inline: false,
                atom: false,
                selectable: false,
                isolating: false,
                default_attrs: none.clone(),
            },
            NodeType {
                name: PARAGRAPH,
                content: ContentExpr::Inline,
                inline: false,
                atom: false,
                selectable: false,
                isolating: false,
                default_attrs: none.clone(),
            },
            NodeType {
                name: HEADING,
                content: ContentExpr::Inline,
                inline: false,
                atom: false,
                selectable: false,
                isolating: false,
                default_attrs: [(ATTR_LEVEL.to_string(), Value::from(1))]
                    .into_iter()
                    .collect(),
            },
            NodeType {
                name: CODE_BLOCK,
                content: ContentExpr::Text,
                inline: false,
                atom: false,
                selectable: false,
                isolating: false,
                default_attrs: [(ATTR_LANGUAGE.to_string(), Value::from("javascript"))]
                    .into_iter()
                    .collect(),
            },
            NodeType {
                name: BLOCKQUOTE,
                content: ContentExpr::Blocks,
                inline: false,
                atom: false,
                selectable: false,
                isolating: false,
                default_attrs: none.clone(),
            },
            NodeType {
                name: DEMO_ASYNC_NODE,
                content: ContentExpr::Empty,
                inline: false,
                atom: true,
                selectable: true,
                isolating: false,
                default_attrs: [
                    (ATTR_STATUS.to_string(), Value::from("neverExecuted")),
                    (ATTR_TEXT.to_string(), Value::from("")),
                ]
                .into_iter()
                .collect(),
            },
            NodeType {
                name: IMAGE,
                content: ContentExpr::Empty,
                inline: true,
                atom: true,
                selectable: true,
                isolating: false,
                default_attrs: [
                    (ATTR_SRC.to_string(), Value::from("")),
                    (ATTR_UPLOADED.to_string(), Value::from(false)),
                ]
                .into_iter()
                .collect(),
            },
            NodeType {
                name: MARK_HOLDER,
                content: ContentExpr::Empty,
                inline: true,
                atom: true,
                selectable: false,
                isolating: false,
                default_attrs: [(ATTR_MARKS.to_string(), Value::Array(Vec::new()))]
                    .into_iter()
                    .collect(),
            },
            NodeType {
                name: TEXT,
                content: ContentExpr::Empty,
                inline: true,
                atom: false,
                selectable: false,
                isolating: false,
                default_attrs: none,
            },
        ]))
    }

    /// A fresh identifier for nodes addressed by id rather than by position.
    pub fn generate_node_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn get(&self, name: &str) -> Result<&Arc<NodeType>, EngineError> {
        self.by_name
            .get(name)
            .map(|&i| &self.types[i])
            .ok_or_else(|| EngineError::UnknownType(name.to_string()))
    }

    /// The default type a block container falls back to when a node is
    /// cleared. Always the paragraph type in the notebook schema.
    pub fn default_block_type(&self) -> &Arc<NodeType> {
        self.get(PARAGRAPH).expect("paragraph is always registered")
    }

    /// Construct a node, checking the children against the type's content
    /// expression. Hard failure at this boundary.
    pub fn node(
        &self,
        name: &str,
        attrs: Attrs,
        children: Vec<Node>,
    ) -> Result<Node, EngineError> {
        let type_ = self.get(name)?;
        if type_.is_text() {
            return Err(EngineError::InvalidContent(TEXT.to_string()));
        }
        let content = Fragment::from_vec(children);
        if !type_.valid_content(&content) {
            return Err(EngineError::InvalidContent(name.to_string()));
        }
        let mut merged = type_.default_attrs.clone();
        merged.extend(attrs);
        Ok(Node::container(Arc::clone(type_), merged, content))
    }

    /// Construct a text node.
    pub fn text(&self, text: &str) -> Node {
        let type_ = self.get(TEXT).expect("text is always registered");
        Node::text(Arc::clone(type_), text)
    }

    /// Create a node of the given type with the minimal content that
    /// satisfies it, or `None` if no filling exists.
    pub fn create_and_fill(&self, type_: &Arc<NodeType>, attrs: Attrs) -> Option<Node> {
        let mut merged = type_.default_attrs.clone();
        merged.extend(attrs);
        let content = match type_.content {
            ContentExpr::Empty | ContentExpr::Inline | ContentExpr::Text => Fragment::empty(),
            ContentExpr::Blocks => {
                let para = Node::container(
                    Arc::clone(self.default_block_type()),
                    Attrs::new(),
                    Fragment::empty(),
                );
                Fragment::from_vec(vec![para])
            }
        };
        Some(Node::container(Arc::clone(type_), merged, content))
    }

    /// The document every new notebook starts from: a doc holding one empty
    /// paragraph.
    pub fn empty_document(&self) -> Node {
        let doc = self.get(DOC).expect("doc is always registered");
        self.create_and_fill(doc, Attrs::new())
            .expect("doc is fillable")
    }
}
