use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Node, NodeBody, Port, PortSide};

/// The full visible port list of a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
}

impl PortSet {
    pub fn of(node: &Node) -> Self {
        Self {
            inputs: node.inputs.clone(),
            outputs: node.outputs.clone(),
        }
    }

    pub fn side(&self, side: PortSide) -> &[Port] {
        match side {
            PortSide::Input => &self.inputs,
            PortSide::Output => &self.outputs,
        }
    }

    pub fn contains(&self, side: PortSide, key: &str) -> bool {
        self.side(side).iter().any(|p| p.key == key)
    }
}

/// Derive the ports a nested-sheet reference exposes for the given sheet body.
///
/// Every `input` node becomes an input port and every `output` node an output port,
/// keyed by the node's label, in node-list order. Blank labels are skipped and a
/// repeated label keeps only its first occurrence, so the result is a pure function
/// of the node list.
pub fn derive_ports(nodes: &[Node]) -> PortSet {
    let mut set = PortSet::default();
    let mut seen_inputs = HashSet::new();
    let mut seen_outputs = HashSet::new();

    for node in nodes {
        let label = node.label.trim();
        if label.is_empty() {
            continue;
        }
        match &node.body {
            NodeBody::Input { socket, .. } => {
                if seen_inputs.insert(label.to_string()) {
                    set.inputs.push(Port::new(label, *socket));
                }
            }
            NodeBody::Output { socket } => {
                if seen_outputs.insert(label.to_string()) {
                    set.outputs.push(Port::new(label, *socket));
                }
            }
            _ => {}
        }
    }

    set
}
