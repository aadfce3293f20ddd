use calcsheet_model::{ModelError, NodeId, PortSide};
use thiserror::Error;

/// A structural edit could not be applied to the graph.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("node {node} has no {side:?} port {key:?}")]
    UnknownPort {
        node: NodeId,
        side: PortSide,
        key: String,
    },
    #[error("node {node} already has a {side:?} port {key:?}")]
    PortExists {
        node: NodeId,
        side: PortSide,
        key: String,
    },
    #[error("input {key:?} of node {node} is already connected")]
    InputOccupied { node: NodeId, key: String },
    #[error("connection {0} does not exist")]
    UnknownConnection(String),
    #[error("node {0} still has connections attached")]
    NodeStillConnected(NodeId),
    #[error("port change on node {node} would orphan the connection on {key:?}")]
    DanglingConnection { node: NodeId, key: String },
    #[error("node {0} is not a nested-sheet reference")]
    NotASheetNode(NodeId),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("no undo history")]
    NoUndoHistory,
    #[error("no redo history")]
    NoRedoHistory,
    /// An inverse could not be applied. This is an invariant violation; the history
    /// is discarded when it happens.
    #[error("history no longer matches the document: {0}")]
    Corrupted(GraphError),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("document is read-only")]
    ReadOnly,
    #[error("no drag gesture in progress")]
    NoDragInProgress,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl From<ModelError> for DocumentError {
    fn from(err: ModelError) -> Self {
        DocumentError::Graph(GraphError::Model(err))
    }
}
