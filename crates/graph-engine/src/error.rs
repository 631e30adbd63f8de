//! Error types for the graph engine

use thiserror::Error;

use crate::types::{LinkId, NodeId};

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur in the graph engine
#[derive(Debug, Error)]
pub enum GraphError {
    /// Node type not present in the registry
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Node id does not resolve in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Slot reference does not resolve on a node
    #[error("Slot '{slot}' not found on node {node}")]
    SlotNotFound { node: NodeId, slot: String },

    /// Link id does not resolve in the link table
    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),

    /// Operation needs the node to belong to a graph
    #[error("Node is not attached to a graph")]
    Detached,

    /// A node cannot be linked to itself
    #[error("Cannot connect node {0} to itself")]
    SelfLink(NodeId),

    /// Slot types cannot be connected
    #[error("Incompatible slot types: {output} -> {input}")]
    IncompatibleTypes { output: String, input: String },

    /// A hook refused the operation
    #[error("Vetoed by {0}")]
    Vetoed(String),

    /// Too many nodes in one graph
    #[error("Node limit reached ({0})")]
    TooManyNodes(usize),

    /// Node execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Node type registration rejected
    #[error("Registration failed: {0}")]
    Registration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a slot lookup error
    pub fn slot(node: &NodeId, slot: impl std::fmt::Display) -> Self {
        Self::SlotNotFound {
            node: node.clone(),
            slot: slot.to_string(),
        }
    }
}
