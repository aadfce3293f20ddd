use calcsheet_model::{Connection, Field, Node, NodeId, PortSet, PortSide, Position, SheetId, VersionId};
use serde::{Deserialize, Serialize};

/// Position change of one node within a [`EditOp::Move`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeMove {
    pub node: NodeId,
    pub from: Position,
    pub to: Position,
}

/// What a nested-sheet node points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetTarget {
    pub sheet_id: SheetId,
    pub version_id: Option<VersionId>,
}

/// A single invertible document mutation.
///
/// Every variant carries stable ids plus the before/after data needed to compute its
/// own inverse, so undo never depends on live references into the graph. Indices
/// record where a removed element lived so the inverse restores the original order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditOp {
    AddNode {
        node: Node,
        index: usize,
    },
    RemoveNode {
        node: Node,
        index: usize,
    },
    AddConnection {
        connection: Connection,
        index: usize,
    },
    RemoveConnection {
        connection: Connection,
        index: usize,
    },
    Move {
        moves: Vec<NodeMove>,
    },
    SetValue {
        node: NodeId,
        field: Field,
        before: String,
        after: String,
    },
    SetLabel {
        node: NodeId,
        before: String,
        after: String,
    },
    /// Renames a port and rewrites the keys of connections attached to it.
    RenamePort {
        node: NodeId,
        side: PortSide,
        before: String,
        after: String,
    },
    SetPorts {
        node: NodeId,
        before: PortSet,
        after: PortSet,
    },
    SetSheetTarget {
        node: NodeId,
        before: SheetTarget,
        after: SheetTarget,
    },
    /// Applied in order; inverted as the reversed list of inverses.
    Batch {
        ops: Vec<EditOp>,
    },
}

impl EditOp {
    pub fn inverse(&self) -> EditOp {
        match self {
            EditOp::AddNode { node, index } => EditOp::RemoveNode {
                node: node.clone(),
                index: *index,
            },
            EditOp::RemoveNode { node, index } => EditOp::AddNode {
                node: node.clone(),
                index: *index,
            },
            EditOp::AddConnection { connection, index } => EditOp::RemoveConnection {
                connection: connection.clone(),
                index: *index,
            },
            EditOp::RemoveConnection { connection, index } => EditOp::AddConnection {
                connection: connection.clone(),
                index: *index,
            },
            EditOp::Move { moves } => EditOp::Move {
                moves: moves
                    .iter()
                    .map(|m| NodeMove {
                        node: m.node.clone(),
                        from: m.to,
                        to: m.from,
                    })
                    .collect(),
            },
            EditOp::SetValue {
                node,
                field,
                before,
                after,
            } => EditOp::SetValue {
                node: node.clone(),
                field: *field,
                before: after.clone(),
                after: before.clone(),
            },
            EditOp::SetLabel {
                node,
                before,
                after,
            } => EditOp::SetLabel {
                node: node.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            EditOp::RenamePort {
                node,
                side,
                before,
                after,
            } => EditOp::RenamePort {
                node: node.clone(),
                side: *side,
                before: after.clone(),
                after: before.clone(),
            },
            EditOp::SetPorts {
                node,
                before,
                after,
            } => EditOp::SetPorts {
                node: node.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            EditOp::SetSheetTarget {
                node,
                before,
                after,
            } => EditOp::SetSheetTarget {
                node: node.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            EditOp::Batch { ops } => EditOp::Batch {
                ops: ops.iter().rev().map(EditOp::inverse).collect(),
            },
        }
    }

    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::AddNode { .. } => "add_node",
            EditOp::RemoveNode { .. } => "remove_node",
            EditOp::AddConnection { .. } => "add_connection",
            EditOp::RemoveConnection { .. } => "remove_connection",
            EditOp::Move { .. } => "move",
            EditOp::SetValue { .. } => "set_value",
            EditOp::SetLabel { .. } => "set_label",
            EditOp::RenamePort { .. } => "rename_port",
            EditOp::SetPorts { .. } => "set_ports",
            EditOp::SetSheetTarget { .. } => "set_sheet_target",
            EditOp::Batch { .. } => "batch",
        }
    }

    /// Wrap several ops into one history entry, flattening trivial batches.
    pub fn batch(mut ops: Vec<EditOp>) -> EditOp {
        if ops.len() == 1 {
            ops.remove(0)
        } else {
            EditOp::Batch { ops }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_inverse_reverses_order() {
        let a = EditOp::SetLabel {
            node: NodeId::new("n"),
            before: "a".into(),
            after: "b".into(),
        };
        let b = EditOp::SetLabel {
            node: NodeId::new("n"),
            before: "b".into(),
            after: "c".into(),
        };
        let inverse = EditOp::Batch {
            ops: vec![a.clone(), b.clone()],
        }
        .inverse();
        assert_eq!(
            inverse,
            EditOp::Batch {
                ops: vec![b.inverse(), a.inverse()]
            }
        );
    }

    #[test]
    fn inverse_is_an_involution_for_moves() {
        let op = EditOp::Move {
            moves: vec![NodeMove {
                node: NodeId::new("n"),
                from: Position::new(0.0, 0.0),
                to: Position::new(5.0, 5.0),
            }],
        };
        assert_eq!(op.inverse().inverse(), op);
    }
}
