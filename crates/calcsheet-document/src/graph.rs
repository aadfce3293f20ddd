use calcsheet_model::{Connection, Node, NodeBody, NodeId, PortSet, PortSide};

use crate::error::GraphError;
use crate::ops::{EditOp, SheetTarget};

/// Ordered node and connection lists plus the structural invariants between them.
///
/// All mutation goes through [`Graph::apply`], which is atomic: a failing op (including
/// a failing member of a batch) leaves the graph unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
}

fn connection_label(c: &Connection) -> String {
    format!(
        "{}.{} -> {}.{}",
        c.source_node_id, c.source_output_key, c.target_node_id, c.target_input_key
    )
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from stored parts, validating every node and connection.
    pub fn from_parts(nodes: Vec<Node>, connections: Vec<Connection>) -> Result<Self, GraphError> {
        let mut graph = Graph::new();
        for node in nodes {
            let index = graph.nodes.len();
            graph.apply(&EditOp::AddNode { node, index })?;
        }
        for connection in connections {
            let index = graph.connections.len();
            graph.apply(&EditOp::AddConnection { connection, index })?;
        }
        Ok(graph)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    pub fn connection_index(&self, connection: &Connection) -> Option<usize> {
        self.connections.iter().position(|c| c == connection)
    }

    /// The connection feeding `node`'s input `key`, if any.
    pub fn incoming(&self, node: &NodeId, key: &str) -> Option<(usize, &Connection)> {
        self.connections
            .iter()
            .enumerate()
            .find(|(_, c)| c.attached_to(node, PortSide::Input, key))
    }

    /// Indices of all connections touching `node`, ascending.
    pub fn connections_touching(&self, node: &NodeId) -> Vec<usize> {
        self.connections
            .iter()
            .enumerate()
            .filter(|(_, c)| c.touches(node))
            .map(|(i, _)| i)
            .collect()
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))
    }

    fn require_port(&self, node: &NodeId, side: PortSide, key: &str) -> Result<(), GraphError> {
        let n = self
            .node(node)
            .ok_or_else(|| GraphError::UnknownNode(node.clone()))?;
        if n.has_port(side, key) {
            Ok(())
        } else {
            Err(GraphError::UnknownPort {
                node: node.clone(),
                side,
                key: key.to_string(),
            })
        }
    }

    pub fn apply(&mut self, op: &EditOp) -> Result<(), GraphError> {
        match op {
            EditOp::Batch { ops } => {
                for (applied, member) in ops.iter().enumerate() {
                    if let Err(err) = self.apply(member) {
                        for done in ops[..applied].iter().rev() {
                            // Each prefix member applied cleanly, so its inverse does too.
                            let _ = self.apply(&done.inverse());
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
            EditOp::AddNode { node, index } => {
                if self.node(&node.id).is_some() {
                    return Err(GraphError::DuplicateNode(node.id.clone()));
                }
                let index = (*index).min(self.nodes.len());
                self.nodes.insert(index, node.clone());
                Ok(())
            }
            EditOp::RemoveNode { node, .. } => {
                let index = self
                    .node_index(&node.id)
                    .ok_or_else(|| GraphError::UnknownNode(node.id.clone()))?;
                if self.connections.iter().any(|c| c.touches(&node.id)) {
                    return Err(GraphError::NodeStillConnected(node.id.clone()));
                }
                self.nodes.remove(index);
                Ok(())
            }
            EditOp::AddConnection { connection, index } => {
                self.require_port(
                    &connection.source_node_id,
                    PortSide::Output,
                    &connection.source_output_key,
                )?;
                self.require_port(
                    &connection.target_node_id,
                    PortSide::Input,
                    &connection.target_input_key,
                )?;
                if self
                    .incoming(&connection.target_node_id, &connection.target_input_key)
                    .is_some()
                {
                    return Err(GraphError::InputOccupied {
                        node: connection.target_node_id.clone(),
                        key: connection.target_input_key.clone(),
                    });
                }
                let index = (*index).min(self.connections.len());
                self.connections.insert(index, connection.clone());
                Ok(())
            }
            EditOp::RemoveConnection { connection, .. } => {
                let index = self
                    .connection_index(connection)
                    .ok_or_else(|| GraphError::UnknownConnection(connection_label(connection)))?;
                self.connections.remove(index);
                Ok(())
            }
            EditOp::Move { moves } => {
                for m in moves {
                    if self.node(&m.node).is_none() {
                        return Err(GraphError::UnknownNode(m.node.clone()));
                    }
                }
                for m in moves {
                    self.node_mut(&m.node)?.position = m.to;
                }
                Ok(())
            }
            EditOp::SetValue {
                node, field, after, ..
            } => {
                self.node_mut(node)?.set_field(*field, after.clone())?;
                Ok(())
            }
            EditOp::SetLabel { node, after, .. } => {
                self.node_mut(node)?.label = after.clone();
                Ok(())
            }
            EditOp::RenamePort {
                node,
                side,
                before,
                after,
            } => self.rename_port(node, *side, before, after),
            EditOp::SetPorts { node, after, .. } => self.set_ports(node, after),
            EditOp::SetSheetTarget { node, after, .. } => self.set_sheet_target(node, after),
        }
    }

    fn rename_port(
        &mut self,
        node: &NodeId,
        side: PortSide,
        before: &str,
        after: &str,
    ) -> Result<(), GraphError> {
        self.require_port(node, side, before)?;
        if before == after {
            return Ok(());
        }
        if self.node(node).is_some_and(|n| n.has_port(side, after)) {
            return Err(GraphError::PortExists {
                node: node.clone(),
                side,
                key: after.to_string(),
            });
        }

        let target = self.node_mut(node)?;
        if let Some(port) = target.ports_mut(side).iter_mut().find(|p| p.key == before) {
            port.key = after.to_string();
        }
        for c in self
            .connections
            .iter_mut()
            .filter(|c| c.attached_to(node, side, before))
        {
            match side {
                PortSide::Input => c.target_input_key = after.to_string(),
                PortSide::Output => c.source_output_key = after.to_string(),
            }
        }
        Ok(())
    }

    fn set_ports(&mut self, node: &NodeId, ports: &PortSet) -> Result<(), GraphError> {
        if self.node(node).is_none() {
            return Err(GraphError::UnknownNode(node.clone()));
        }
        for c in &self.connections {
            let orphaned = if &c.target_node_id == node
                && !ports.contains(PortSide::Input, &c.target_input_key)
            {
                Some(&c.target_input_key)
            } else if &c.source_node_id == node
                && !ports.contains(PortSide::Output, &c.source_output_key)
            {
                Some(&c.source_output_key)
            } else {
                None
            };
            if let Some(key) = orphaned {
                return Err(GraphError::DanglingConnection {
                    node: node.clone(),
                    key: key.clone(),
                });
            }
        }
        let target = self.node_mut(node)?;
        target.inputs = ports.inputs.clone();
        target.outputs = ports.outputs.clone();
        Ok(())
    }

    fn set_sheet_target(&mut self, node: &NodeId, target: &SheetTarget) -> Result<(), GraphError> {
        let n = self.node_mut(node)?;
        match &mut n.body {
            NodeBody::Sheet {
                sheet_id,
                version_id,
            } => {
                *sheet_id = target.sheet_id.clone();
                *version_id = target.version_id.clone();
                Ok(())
            }
            _ => Err(GraphError::NotASheetNode(node.clone())),
        }
    }

    /// Replace the node list wholesale, keeping only connections whose endpoints and
    /// ports survive. Used for version restore.
    pub(crate) fn replace_nodes(&mut self, nodes: Vec<Node>) {
        self.nodes = nodes;
        let nodes = &self.nodes;
        self.connections.retain(|c| {
            let source_ok = nodes
                .iter()
                .any(|n| n.id == c.source_node_id && n.has_port(PortSide::Output, &c.source_output_key));
            let target_ok = nodes
                .iter()
                .any(|n| n.id == c.target_node_id && n.has_port(PortSide::Input, &c.target_input_key));
            source_ok && target_ok
        });
        // Keep the one-connection-per-input invariant even if the stored data broke it.
        let mut seen = std::collections::HashSet::new();
        self.connections
            .retain(|c| seen.insert((c.target_node_id.clone(), c.target_input_key.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcsheet_model::{Position, SocketKind};

    fn constant(id: &str) -> Node {
        Node::with_id(
            id,
            id,
            Position::default(),
            NodeBody::Constant { value: "1".into() },
        )
    }

    fn output(id: &str) -> Node {
        Node::with_id(
            id,
            id,
            Position::default(),
            NodeBody::Output {
                socket: SocketKind::Any,
            },
        )
    }

    #[test]
    fn inputs_accept_a_single_connection() {
        let mut graph = Graph::from_parts(vec![constant("a"), constant("b"), output("o")], vec![])
            .unwrap();
        graph
            .apply(&EditOp::AddConnection {
                connection: Connection::new("a", "value", "o", "value"),
                index: 0,
            })
            .unwrap();
        let err = graph
            .apply(&EditOp::AddConnection {
                connection: Connection::new("b", "value", "o", "value"),
                index: 1,
            })
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::InputOccupied {
                node: NodeId::new("o"),
                key: "value".into()
            }
        );
    }

    #[test]
    fn outputs_fan_out() {
        let graph = Graph::from_parts(
            vec![constant("a"), output("o1"), output("o2")],
            vec![
                Connection::new("a", "value", "o1", "value"),
                Connection::new("a", "value", "o2", "value"),
            ],
        )
        .unwrap();
        assert_eq!(graph.connections().len(), 2);
    }

    #[test]
    fn connected_nodes_cannot_be_removed_directly() {
        let mut graph = Graph::from_parts(
            vec![constant("a"), output("o")],
            vec![Connection::new("a", "value", "o", "value")],
        )
        .unwrap();
        let node = graph.node(&NodeId::new("a")).cloned().unwrap();
        assert_eq!(
            graph.apply(&EditOp::RemoveNode { node, index: 0 }),
            Err(GraphError::NodeStillConnected(NodeId::new("a")))
        );
    }

    #[test]
    fn failing_batch_rolls_back() {
        let mut graph = Graph::from_parts(vec![constant("a")], vec![]).unwrap();
        let before = graph.clone();
        let op = EditOp::Batch {
            ops: vec![
                EditOp::SetLabel {
                    node: NodeId::new("a"),
                    before: "a".into(),
                    after: "renamed".into(),
                },
                EditOp::SetLabel {
                    node: NodeId::new("missing"),
                    before: String::new(),
                    after: "x".into(),
                },
            ],
        };
        assert!(graph.apply(&op).is_err());
        assert_eq!(graph, before);
    }

    #[test]
    fn rename_port_rewrites_attached_connections() {
        let mut graph = Graph::from_parts(
            vec![constant("a"), output("o")],
            vec![Connection::new("a", "value", "o", "value")],
        )
        .unwrap();
        graph
            .apply(&EditOp::RenamePort {
                node: NodeId::new("a"),
                side: PortSide::Output,
                before: "value".into(),
                after: "result".into(),
            })
            .unwrap();
        assert_eq!(
            graph.connections(),
            &[Connection::new("a", "result", "o", "value")]
        );
    }

    #[test]
    fn set_ports_refuses_to_orphan_connections() {
        let mut graph = Graph::from_parts(
            vec![constant("a"), output("o")],
            vec![Connection::new("a", "value", "o", "value")],
        )
        .unwrap();
        let err = graph
            .apply(&EditOp::SetPorts {
                node: NodeId::new("o"),
                before: PortSet::default(),
                after: PortSet::default(),
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::DanglingConnection { .. }));
    }
}
