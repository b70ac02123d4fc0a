//! Attribute writes addressed by stable node identifier, for results that
//! arrive after the positions they were computed against have shifted.

use tracing::debug;

use crate::error::EngineError;
use crate::schema::{
    ATTR_SRC, ATTR_STATUS, ATTR_TEXT, ATTR_UPLOADED, AsyncNodeStatus, Attrs, DEMO_ASYNC_NODE,
    IMAGE,
};
use crate::state::EditorState;
use crate::transform::Transaction;

/// Write the outcome of an async evaluation into the addressed node. The
/// node is looked up by identifier in the current document, so the write
/// lands correctly no matter how many edits ran since the evaluation
/// started. On failure the node's text is replaced by an error marker.
pub fn replace_async_node_attrs(
    state: &EditorState,
    node_id: &str,
    status: AsyncNodeStatus,
    text: &str,
) -> Result<Transaction, EngineError> {
    let (node, pos) = state
        .doc
        .find_node_by_id(node_id)
        .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
    if node.kind().name != DEMO_ASYNC_NODE {
        return Err(EngineError::UnexpectedNodeType {
            id: node_id.to_string(),
            actual: node.kind().name.to_string(),
            expected: DEMO_ASYNC_NODE.to_string(),
        });
    }
    let mut attrs = node.attrs().clone();
    attrs.insert(ATTR_STATUS.to_string(), serde_json::json!(status));
    let text = if status == AsyncNodeStatus::Success {
        text
    } else {
        "Error"
    };
    attrs.insert(ATTR_TEXT.to_string(), serde_json::json!(text));
    debug!(id = node_id, pos, ?status, "async node result written");
    let mut tr = state.tr();
    tr.set_node_markup(pos, node.kind(), attrs)?;
    Ok(tr)
}

/// Mark an image node's upload as finished, swapping its placeholder source
/// for the stored location.
pub fn complete_image_upload(
    state: &EditorState,
    node_id: &str,
    src: &str,
) -> Result<Transaction, EngineError> {
    let (node, pos) = state
        .doc
        .find_node_by_id(node_id)
        .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))?;
    if node.kind().name != IMAGE {
        return Err(EngineError::UnexpectedNodeType {
            id: node_id.to_string(),
            actual: node.kind().name.to_string(),
            expected: IMAGE.to_string(),
        });
    }
    let mut attrs = node.attrs().clone();
    attrs.insert(ATTR_SRC.to_string(), serde_json::json!(src));
    attrs.insert(ATTR_UPLOADED.to_string(), serde_json::json!(true));
    let mut tr = state.tr();
    tr.set_node_markup(pos, node.kind(), attrs)?;
    Ok(tr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ATTR_ID, DOC, PARAGRAPH, Schema};
    use crate::node::Node;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn async_node(schema: &Schema, id: &str) -> Node {
        let mut attrs = Attrs::new();
        attrs.insert(ATTR_ID.to_string(), json!(id));
        attrs.insert(ATTR_STATUS.to_string(), json!(AsyncNodeStatus::NeverExecuted));
        schema.node(DEMO_ASYNC_NODE, attrs, vec![]).unwrap()
    }

    fn state_with(schema: &Arc<Schema>, children: Vec<Node>) -> EditorState {
        let doc = schema.node(DOC, Attrs::new(), children).unwrap();
        EditorState::with_doc(Arc::clone(schema), doc).unwrap()
    }

    #[test]
    fn a_successful_result_lands_by_identifier_after_edits() {
        let schema = Schema::notebook();
        let para = schema
            .node(PARAGRAPH, Attrs::new(), vec![schema.text("ab")])
            .unwrap();
        let state = state_with(&schema, vec![para, async_node(&schema, "n1")]);
        // Edit in front of the node before the result arrives.
        let mut tr = state.tr();
        tr.delete(1, 3).unwrap();
        let state = state.apply(tr);

        let tr =
            replace_async_node_attrs(&state, "n1", AsyncNodeStatus::Success, "42").unwrap();
        let next = state.apply(tr);
        let (node, _) = next.doc.find_node_by_id("n1").unwrap();
        assert_eq!(node.attrs().get(ATTR_STATUS), Some(&json!("success")));
        assert_eq!(node.attrs().get(ATTR_TEXT), Some(&json!("42")));
    }

    #[test]
    fn a_failed_result_records_an_error_marker() {
        let schema = Schema::notebook();
        let state = state_with(&schema, vec![async_node(&schema, "n1")]);
        let tr =
            replace_async_node_attrs(&state, "n1", AsyncNodeStatus::Error, "ignored").unwrap();
        let next = state.apply(tr);
        let (node, _) = next.doc.find_node_by_id("n1").unwrap();
        assert_eq!(node.attrs().get(ATTR_TEXT), Some(&json!("Error")));
    }

    #[test]
    fn a_vanished_node_reports_not_found() {
        let schema = Schema::notebook();
        let para = schema
            .node(PARAGRAPH, Attrs::new(), vec![schema.text("ab")])
            .unwrap();
        let state = state_with(&schema, vec![para]);
        let err = replace_async_node_attrs(&state, "gone", AsyncNodeStatus::Success, "x")
            .unwrap_err();
        assert!(matches!(err, EngineError::NodeNotFound(id) if id == "gone"));
    }
}
