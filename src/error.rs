use thiserror::Error;

use crate::ir::{EdgeId, VertexId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrangeError {
    /// Invalid parameters or algorithm wiring supplied by the caller.
    #[error("configuration error: {0}")]
    Config(String),
    #[error("duplicate vertex id {0}")]
    DuplicateVertex(VertexId),
    #[error("vertex id 0 is reserved; assign a unique positive id to every vertex")]
    UnassignedVertexId,
    #[error("duplicate edge id {0}")]
    DuplicateEdge(EdgeId),
    #[error("vertex {0} is referenced but not present")]
    MissingVertex(VertexId),
    #[error("edge {0} is referenced but not present")]
    MissingEdge(EdgeId),
    #[error("computation cancelled")]
    Cancelled,
}

impl ArrangeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ArrangeError>;
