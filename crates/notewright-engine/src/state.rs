use std::sync::Arc;

use tracing::debug;

use crate::error::EngineError;
use crate::node::Node;
use crate::schema::Schema;
use crate::selection::Selection;
use crate::transform::Transaction;

/// One version of an open document: the tree, the selection, and a counter
/// incremented on every committed transaction. States are cheap to clone;
/// all tree data is shared.
#[derive(Debug, Clone)]
pub struct EditorState {
    pub schema: Arc<Schema>,
    pub doc: Node,
    pub selection: Selection,
    pub version: u64,
}

impl EditorState {
    /// A fresh state holding an empty document.
    pub fn new(schema: Arc<Schema>) -> Self {
        let doc = schema.empty_document();
        let selection = Selection::near(&doc, 0, 1);
        Self {
            schema,
            doc,
            selection,
            version: 0,
        }
    }

    /// A state over an existing document, with the selection at its start.
    pub fn with_doc(schema: Arc<Schema>, doc: Node) -> Result<Self, EngineError> {
        if doc.kind().name != crate::schema::DOC {
            return Err(EngineError::UnknownType(doc.kind().name.to_string()));
        }
        let selection = Selection::near(&doc, 0, 1);
        Ok(Self {
            schema,
            doc,
            selection,
            version: 0,
        })
    }

    /// Start a transaction against this state.
    pub fn tr(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.schema), self.doc.clone(), self.selection)
    }

    /// Commit a transaction, producing the next state. A selection pinned by
    /// the transaction is validated here and degraded to the nearest valid
    /// one when its positions no longer resolve.
    pub fn apply(&self, tr: Transaction) -> EditorState {
        let doc = tr.doc().clone();
        let selection = validate_selection(&doc, *tr.selection());
        debug!(
            steps = tr.step_count(),
            version = self.version + 1,
            "committed transaction"
        );
        EditorState {
            schema: Arc::clone(&self.schema),
            doc,
            selection,
            version: self.version + 1,
        }
    }
}

fn validate_selection(doc: &Node, selection: Selection) -> Selection {
    let size = doc.content_size();
    match selection {
        Selection::Text { anchor, head } => {
            if anchor <= size && head <= size {
                let ok = doc
                    .resolve(head)
                    .map(|rp| rp.parent().is_textblock())
                    .unwrap_or(false);
                if ok {
                    return selection;
                }
            }
            Selection::near(doc, head.min(size), 1)
        }
        Selection::Node { pos } => {
            let ok = doc
                .node_at(pos)
                .is_some_and(|node| node.kind().selectable && node.is_atom());
            if ok {
                selection
            } else {
                Selection::near(doc, pos.min(size), 1)
            }
        }
        Selection::Gap { pos } => {
            if crate::selection::gap_valid(doc, pos) {
                selection
            } else {
                Selection::near(doc, pos.min(size), 1)
            }
        }
    }
}
