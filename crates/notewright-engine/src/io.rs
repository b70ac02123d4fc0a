//! Reading and writing documents as JSON trees of
//! `{type, attrs, content, text}` objects. Loading validates every node
//! against the schema, so a malformed file fails here rather than corrupting
//! an editing session later.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::node::Node;
use crate::schema::{Attrs, Schema, TEXT};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to access document: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("document violates the schema: {0}")]
    Engine(#[from] EngineError),
}

/// The serialized form of one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonNode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<JsonNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

pub fn doc_to_json(doc: &Node) -> JsonNode {
    JsonNode {
        kind: doc.kind().name.to_string(),
        attrs: doc.attrs().clone(),
        content: doc.content().children().iter().map(doc_to_json).collect(),
        text: if doc.is_text() {
            Some(doc.text_content())
        } else {
            None
        },
    }
}

pub fn doc_from_json(schema: &Arc<Schema>, json: &JsonNode) -> Result<Node, EngineError> {
    if json.kind == TEXT {
        return Ok(schema.text(json.text.as_deref().unwrap_or_default()));
    }
    let children = json
        .content
        .iter()
        .map(|child| doc_from_json(schema, child))
        .collect::<Result<Vec<_>, _>>()?;
    schema.node(&json.kind, json.attrs.clone(), children)
}

pub fn doc_to_string(doc: &Node) -> Result<String, IoError> {
    Ok(serde_json::to_string_pretty(&doc_to_json(doc))?)
}

pub fn doc_from_str(schema: &Arc<Schema>, input: &str) -> Result<Node, IoError> {
    let json: JsonNode = serde_json::from_str(input)?;
    Ok(doc_from_json(schema, &json)?)
}

pub fn read_document(schema: &Arc<Schema>, path: &Path) -> Result<Node, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    doc_from_str(schema, &raw)
}

pub fn write_document(doc: &Node, path: &Path) -> Result<(), IoError> {
    let raw = doc_to_string(doc)?;
    fs::write(path, raw)?;
    Ok(())
}
