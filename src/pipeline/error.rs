//! Pipeline-specific error types.

use crate::pipeline::id::NodeId;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A caller supplied an out-of-range or otherwise unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed extent: {0}")]
    MalformedExtent(String),

    /// A producer declared metadata that cannot be honored (empty whole extent, unsorted timesteps).
    #[error("Node {node_id:?} declared inconsistent information: {message}")]
    Information { node_id: NodeId, message: String },

    /// A node's execute hook failed.
    #[error("Node {node_id:?} failed to execute: {message}")]
    Execution { node_id: NodeId, message: String },

    /// A node was skipped because something upstream of it failed.
    #[error("Node {node_id:?} skipped: upstream node {failed:?} failed")]
    UpstreamFailed { node_id: NodeId, failed: NodeId },

    /// Passes were run out of order (e.g. executing without a fresh information pass).
    #[error("Pass order violation: {0}")]
    PassOrder(String),

    #[error("Consumers requested conflicting timesteps {first} and {second}")]
    ConflictingTimeRequests { first: f64, second: f64 },

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Port mismatch: {0}")]
    PortMismatch(String),

    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Unknown parameter '{key}' for node '{node}'")]
    UnknownParameter { node: String, key: String },

    #[error("Invalid value for parameter '{key}': {message}")]
    InvalidParameter { key: String, message: String },

    /// Hooks report this when they cannot handle the data kind they were handed.
    #[error("Unsupported data: {0}")]
    UnsupportedData(String),

    /// Fragment or manifest I/O failure. Stored as text so errors stay cloneable.
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// Node the error is attributed to, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            PipelineError::Information { node_id, .. }
            | PipelineError::Execution { node_id, .. }
            | PipelineError::UpstreamFailed { node_id, .. } => Some(*node_id),
            PipelineError::UnknownNode(id) => Some(*id),
            _ => None,
        }
    }

    /// True for errors rejected at the call that introduced them.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidArgument(_)
                | PipelineError::MalformedExtent(_)
                | PipelineError::ConflictingTimeRequests { .. }
                | PipelineError::InvalidEdge(_)
                | PipelineError::CycleDetected
                | PipelineError::PortMismatch(_)
                | PipelineError::UnknownNode(_)
                | PipelineError::UnknownParameter { .. }
                | PipelineError::InvalidParameter { .. }
        )
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
