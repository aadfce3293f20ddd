use calcsheet_document::EditOp;
use calcsheet_model::{derive_ports, Connection, Node, NodeId, PortSet, PortSide};

/// Reconciliation of a nested-sheet node's ports against an authoritative node list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortPlan {
    pub node: NodeId,
    pub current: PortSet,
    pub target: PortSet,
    pub removed_inputs: Vec<String>,
    pub removed_outputs: Vec<String>,
    pub added_inputs: Vec<String>,
    pub added_outputs: Vec<String>,
    /// Connections attached to removed ports, with their index in the graph's
    /// connection list, highest index first.
    pub pruned: Vec<(usize, Connection)>,
}

impl PortPlan {
    pub fn is_noop(&self) -> bool {
        self.current == self.target && self.pruned.is_empty()
    }

    /// Ops that carry the plan out: prune connections, then replace the port list.
    pub fn ops(&self) -> Vec<EditOp> {
        if self.is_noop() {
            return Vec::new();
        }
        let mut ops: Vec<EditOp> = self
            .pruned
            .iter()
            .map(|(index, connection)| EditOp::RemoveConnection {
                connection: connection.clone(),
                index: *index,
            })
            .collect();
        ops.push(EditOp::SetPorts {
            node: self.node.clone(),
            before: self.current.clone(),
            after: self.target.clone(),
        });
        ops
    }
}

fn missing_keys(from: &PortSet, to: &PortSet, side: PortSide) -> Vec<String> {
    from.side(side)
        .iter()
        .filter(|port| !to.contains(side, &port.key))
        .map(|port| port.key.clone())
        .collect()
}

/// Compute the port changes for `node` given the node list it references.
///
/// Pure: the target port set depends only on `authoritative`, and only connections
/// attached to ports that disappear are pruned.
pub fn plan_ports(node: &Node, authoritative: &[Node], connections: &[Connection]) -> PortPlan {
    let current = PortSet::of(node);
    let target = derive_ports(authoritative);

    let removed_inputs = missing_keys(&current, &target, PortSide::Input);
    let removed_outputs = missing_keys(&current, &target, PortSide::Output);
    let added_inputs = missing_keys(&target, &current, PortSide::Input);
    let added_outputs = missing_keys(&target, &current, PortSide::Output);

    let pruned = connections
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, c)| {
            (c.target_node_id == node.id && removed_inputs.contains(&c.target_input_key))
                || (c.source_node_id == node.id && removed_outputs.contains(&c.source_output_key))
        })
        .map(|(index, c)| (index, c.clone()))
        .collect();

    PortPlan {
        node: node.id.clone(),
        current,
        target,
        removed_inputs,
        removed_outputs,
        added_inputs,
        added_outputs,
        pruned,
    }
}
