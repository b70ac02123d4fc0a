pub mod async_node;
pub mod commands;
pub mod error;
pub mod io;
pub mod node;
pub mod resolve;
pub mod schema;
pub mod selection;
pub mod state;
pub mod transform;

// Re-export key types for easier usage
pub use async_node::{complete_image_upload, replace_async_node_attrs};
pub use commands::*;
pub use error::EngineError;
pub use node::{Fragment, Node};
pub use resolve::{NodeRange, ResolvedPos};
pub use schema::{AsyncNodeStatus, Attrs, ContentExpr, NodeType, Schema};
pub use selection::Selection;
pub use state::EditorState;
pub use transform::{Mapping, Step, StepMap, Transaction};
