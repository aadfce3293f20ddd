use serde::{Deserialize, Serialize};

use crate::{NodeId, PortSide};

/// A wire from one node's output port to another node's input port.
///
/// Each input port accepts at most one connection; outputs may fan out. The graph
/// document enforces that invariant, this type is plain data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_node_id: NodeId,
    pub source_output_key: String,
    pub target_node_id: NodeId,
    pub target_input_key: String,
}

impl Connection {
    pub fn new(
        source_node_id: impl Into<NodeId>,
        source_output_key: impl Into<String>,
        target_node_id: impl Into<NodeId>,
        target_input_key: impl Into<String>,
    ) -> Self {
        Self {
            source_node_id: source_node_id.into(),
            source_output_key: source_output_key.into(),
            target_node_id: target_node_id.into(),
            target_input_key: target_input_key.into(),
        }
    }

    /// Whether either end of the connection touches `node`.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source_node_id == node || &self.target_node_id == node
    }

    /// Whether the connection is attached to `node`'s port `key` on `side`.
    pub fn attached_to(&self, node: &NodeId, side: PortSide, key: &str) -> bool {
        match side {
            PortSide::Input => &self.target_node_id == node && self.target_input_key == key,
            PortSide::Output => &self.source_node_id == node && self.source_output_key == key,
        }
    }
}
