//! Error types for hypotree

use crate::types::NodeStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("tree not found: {0}")]
    TreeNotFound(String),

    #[error("node not found: {node} (tree {tree})")]
    NodeNotFound { tree: String, node: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transition: cannot {action} node {node} while {status}")]
    InvalidTransition {
        node: String,
        status: NodeStatus,
        action: String,
    },

    #[error("confidence out of range: {0} (expected 0.0..=1.0)")]
    ConfidenceOutOfRange(f64),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(format!("document encoding: {}", e))
    }
}

impl Error {
    pub fn node_not_found(tree: impl Into<String>, node: impl Into<String>) -> Self {
        Self::NodeNotFound {
            tree: tree.into(),
            node: node.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_transition(
        node: impl Into<String>,
        status: NodeStatus,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            node: node.into(),
            status,
            action: action.into(),
        }
    }

    /// Stable machine-readable code, used in the dispatch error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TreeNotFound(_) => "TREE_NOT_FOUND",
            Self::NodeNotFound { .. } => "NODE_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ConfidenceOutOfRange(_) => "CONFIDENCE_OUT_OF_RANGE",
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}
