//! Pipeline-specific error types.
//!
//! Four families surface from an update: configuration errors (missing
//! inputs, bad parameters), region errors, execution errors raised by a
//! filter or a worker, and the distinguished abort condition.

use crate::pipeline::id::NodeId;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Node {node_id:?} ({name}) requires {required} input(s) but input {missing} is not connected")]
    MissingInput {
        node_id: NodeId,
        name: String,
        required: usize,
        missing: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Requested region {requested} lies outside {largest}")]
    RegionOutOfBounds { requested: String, largest: String },

    #[error("Buffer holds {actual} pixels but the region needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Processing aborted in node {node_id:?}")]
    ProcessAborted { node_id: NodeId },

    #[error("Work item cancelled after a sibling failed")]
    Cancelled,

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    #[error("Filter panicked outside the worker pool: {message}")]
    FilterPanicked { message: String },

    #[error("Node {node_id:?} ({name}) failed: {source}")]
    Node {
        node_id: NodeId,
        name: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Invalid node: {0:?}")]
    InvalidNode(NodeId),

    #[error("Node {0:?} is not a process object")]
    NotAProcessObject(NodeId),

    #[error("Node {0:?} does not hold a filter of the requested type")]
    FilterTypeMismatch(NodeId),
}

impl PipelineError {
    /// Whether this is (or wraps) a cooperative abort rather than a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self.root(), PipelineError::ProcessAborted { .. })
    }

    /// Whether this is (or wraps) a configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::MissingInput { .. }
                | PipelineError::InvalidParameter(_)
                | PipelineError::CycleDetected
        )
    }

    /// The innermost error beneath any [`PipelineError::Node`] wrappers.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Node { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach the failing node, leaving aborts and already-attributed errors alone.
    pub(crate) fn in_node(self, node_id: NodeId, name: &str) -> Self {
        match self {
            e @ (PipelineError::ProcessAborted { .. } | PipelineError::Node { .. }) => e,
            e => PipelineError::Node {
                node_id,
                name: name.to_string(),
                source: Box::new(e),
            },
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_distinguished() {
        let abort = PipelineError::ProcessAborted { node_id: NodeId(1) };
        assert!(abort.is_abort());
        assert!(!PipelineError::Filter("bad".into()).is_abort());
        assert!(!PipelineError::Cancelled.is_abort());
    }

    #[test]
    fn test_in_node_wraps_once() {
        let err = PipelineError::Filter("negative radius".into()).in_node(NodeId(2), "mean");
        assert!(err.to_string().contains("mean"));
        assert!(err.to_string().contains("negative radius"));
        let again = err.in_node(NodeId(5), "outer");
        match again {
            PipelineError::Node { node_id, .. } => assert_eq!(node_id, NodeId(2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_abort_is_not_wrapped() {
        let err = PipelineError::ProcessAborted { node_id: NodeId(4) }.in_node(NodeId(4), "copy");
        assert!(matches!(err, PipelineError::ProcessAborted { .. }));
        assert!(err.is_abort());
    }

    #[test]
    fn test_configuration_through_wrapper() {
        let err = PipelineError::InvalidParameter("factor 0".into()).in_node(NodeId(0), "shrink");
        assert!(err.is_configuration());
        assert!(matches!(err.root(), PipelineError::InvalidParameter(_)));
    }
}
