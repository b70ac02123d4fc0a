use thiserror::Error;

/// Errors produced by the document engine.
///
/// `OutOfRange` indicates a caller bug (positions are always derived from the
/// current document version, so a stale or invented offset is a programming
/// error). Content violations are expected during editing and are converted to
/// a "not applicable" result inside update policies; they only escape as hard
/// errors at tree-construction boundaries. `NodeNotFound` propagates, since an
/// async result addressed at a vanished node has nowhere valid to land.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("position {pos} is outside the document (size {size})")]
    OutOfRange { pos: usize, size: usize },

    #[error("content not valid for node type '{0}'")]
    InvalidContent(String),

    #[error("invalid replacement for range {from}..{to}")]
    InvalidReplacement { from: usize, to: usize },

    #[error("lift target depth {target} is not above range depth {depth}")]
    InvalidLiftTarget { target: usize, depth: usize },

    #[error("cannot split at position {0}")]
    CannotSplit(usize),

    #[error("cannot join at position {0}")]
    CannotJoin(usize),

    #[error("no node with id '{0}' in the document")]
    NodeNotFound(String),

    #[error("node '{id}' is a '{actual}', expected '{expected}'")]
    UnexpectedNodeType {
        id: String,
        actual: String,
        expected: String,
    },

    #[error("unknown node type '{0}'")]
    UnknownType(String),
}
