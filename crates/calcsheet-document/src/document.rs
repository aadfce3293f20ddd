use std::collections::HashMap;
use std::time::Duration;

use calcsheet_model::{
    Connection, Field, Node, NodeBody, NodeId, PortSide, Position, Rect, SheetId,
    VersionSnapshot,
};

use crate::error::{DocumentError, GraphError, HistoryError};
use crate::graph::Graph;
use crate::history::{History, DEFAULT_HISTORY_LIMIT};
use crate::notifier::{ChangeNotifier, ChangeStream};
use crate::ops::{EditOp, NodeMove};
use crate::selection::Selection;

/// An in-progress drag gesture. Intermediate frames move nodes directly; the whole
/// gesture becomes one history entry when it ends.
#[derive(Clone, Debug, PartialEq)]
struct DragGesture {
    origins: Vec<(NodeId, Position)>,
}

/// Uncommitted text of a value edit. Keystrokes only touch the draft; the document
/// changes when the draft is committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueDraft {
    node: NodeId,
    field: Field,
    text: String,
}

impl ValueDraft {
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

/// The in-memory sheet being edited: graph, selection, history and change signal.
///
/// Every user-visible mutation is applied immediately, recorded as one invertible
/// [`EditOp`] and followed by a change signal, unless it runs while the document is
/// suppressed (bulk load, version restore).
#[derive(Debug)]
pub struct GraphDocument {
    sheet_id: Option<SheetId>,
    graph: Graph,
    selection: Selection,
    history: History,
    notifier: ChangeNotifier,
    read_only: bool,
    suppressed: bool,
    dirty: bool,
    drag: Option<DragGesture>,
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphDocument {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            sheet_id: None,
            graph: Graph::new(),
            selection: Selection::new(),
            history: History::with_limit(limit),
            notifier: ChangeNotifier::new(),
            read_only: false,
            suppressed: false,
            dirty: false,
            drag: None,
        }
    }

    pub fn sheet_id(&self) -> Option<&SheetId> {
        self.sheet_id.as_ref()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn nodes(&self) -> &[Node] {
        self.graph.nodes()
    }

    pub fn connections(&self) -> &[Connection] {
        self.graph.connections()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.graph.node(id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn subscribe(&self, debounce: Duration) -> ChangeStream {
        self.notifier.subscribe(debounce)
    }

    pub fn change_generation(&self) -> u64 {
        self.notifier.generation()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called once persistence has stored the current state.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Toggle the read-only gate. Entering read-only cancels any drag in progress.
    pub fn set_read_only(&mut self, read_only: bool) {
        if read_only && !self.read_only {
            self.cancel_drag();
        }
        self.read_only = read_only;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Run `f` with history recording and change notification switched off.
    ///
    /// Suppressed mutations bypass the read-only gate: they are how a read-only view
    /// gets its content in the first place.
    pub fn suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.suppressed;
        self.suppressed = true;
        let out = f(self);
        self.suppressed = previous;
        out
    }

    /// Replace the document with a freshly loaded sheet. Clears history and selection.
    pub fn load(
        &mut self,
        sheet_id: SheetId,
        nodes: Vec<Node>,
        connections: Vec<Connection>,
    ) -> Result<(), DocumentError> {
        let graph = Graph::from_parts(nodes, connections)?;
        self.load_graph(sheet_id, graph);
        Ok(())
    }

    /// Like [`load`](Self::load), for a graph that was already validated.
    pub fn load_graph(&mut self, sheet_id: SheetId, graph: Graph) {
        tracing::debug!(
            sheet_id = %sheet_id,
            nodes = graph.nodes().len(),
            connections = graph.connections().len(),
            "loaded sheet"
        );
        self.sheet_id = Some(sheet_id);
        self.graph = graph;
        self.reset_session_state();
    }

    /// Replace the node list with a version snapshot's. Connections whose endpoints
    /// no longer exist are dropped. Neither dirties the document nor records history.
    pub fn restore_version(&mut self, snapshot: &VersionSnapshot) {
        tracing::info!(
            sheet_id = %snapshot.sheet_id,
            version_id = %snapshot.id,
            tag = %snapshot.tag,
            "restoring version"
        );
        self.graph.replace_nodes(snapshot.nodes.clone());
        self.reset_session_state();
    }

    fn reset_session_state(&mut self) {
        self.history.clear();
        self.selection.clear();
        self.drag = None;
        self.dirty = false;
    }

    fn ensure_writable(&self) -> Result<(), DocumentError> {
        if self.read_only && !self.suppressed {
            Err(DocumentError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Apply `op` and, unless suppressed, record it and signal the change.
    fn commit(&mut self, op: EditOp) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        self.graph.apply(&op)?;
        self.record_applied(op);
        Ok(())
    }

    /// Bookkeeping for an op whose effect is already present in the graph.
    fn record_applied(&mut self, op: EditOp) {
        if self.suppressed {
            return;
        }
        tracing::debug!(op = op.name(), "recorded edit");
        self.history.push(op);
        self.dirty = true;
        self.notifier.signal();
    }

    fn after_history_step(&mut self) {
        let graph = &self.graph;
        self.selection.retain(|id| graph.node(id).is_some());
        self.dirty = true;
        self.notifier.signal();
    }

    fn history_failure(&self, err: HistoryError) -> DocumentError {
        if let HistoryError::Corrupted(cause) = &err {
            tracing::error!(error = %cause, "history discarded: inverse no longer applies");
        }
        DocumentError::History(err)
    }

    /// Apply an op built by a collaborator (e.g. the version port resolver) as one
    /// history entry.
    pub fn apply_recorded(&mut self, op: EditOp) -> Result<(), DocumentError> {
        self.commit(op)
    }

    pub fn undo(&mut self) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        self.cancel_drag();
        match self.history.undo(&mut self.graph) {
            Ok(()) => {
                self.after_history_step();
                Ok(())
            }
            Err(err) => Err(self.history_failure(err)),
        }
    }

    pub fn redo(&mut self) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        self.cancel_drag();
        match self.history.redo(&mut self.graph) {
            Ok(()) => {
                self.after_history_step();
                Ok(())
            }
            Err(err) => Err(self.history_failure(err)),
        }
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeId, DocumentError> {
        let id = node.id.clone();
        let index = self.graph.nodes().len();
        self.commit(EditOp::AddNode { node, index })?;
        Ok(id)
    }

    /// Ops removing the given nodes together with every connection touching them.
    fn removal_ops(&self, ids: &[NodeId]) -> Result<Vec<EditOp>, DocumentError> {
        let mut node_indices = Vec::with_capacity(ids.len());
        for id in ids {
            let index = self
                .graph
                .node_index(id)
                .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
            node_indices.push(index);
        }
        node_indices.sort_unstable();
        node_indices.dedup();

        let mut ops = Vec::new();
        // Highest index first, so every recorded index is valid at the moment it is
        // applied and the reversed inverse restores the original order.
        for (index, connection) in self.graph.connections().iter().enumerate().rev() {
            if ids.iter().any(|id| connection.touches(id)) {
                ops.push(EditOp::RemoveConnection {
                    connection: connection.clone(),
                    index,
                });
            }
        }
        for &index in node_indices.iter().rev() {
            ops.push(EditOp::RemoveNode {
                node: self.graph.nodes()[index].clone(),
                index,
            });
        }
        Ok(ops)
    }

    /// Remove a node and its connections as one history entry.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        self.cancel_drag();
        let ops = self.removal_ops(std::slice::from_ref(id))?;
        self.commit(EditOp::batch(ops))?;
        self.selection.deselect(id);
        Ok(())
    }

    /// Remove every selected node as one history entry. Returns how many were removed.
    pub fn remove_selected(&mut self) -> Result<usize, DocumentError> {
        self.ensure_writable()?;
        self.cancel_drag();
        let ids: Vec<NodeId> = self.selection.iter().cloned().collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let ops = self.removal_ops(&ids)?;
        self.commit(EditOp::batch(ops))?;
        self.selection.clear();
        Ok(ids.len())
    }

    /// Connect an output to an input. An existing connection on the target input is
    /// replaced within the same history entry. Returns `false` if the exact
    /// connection already existed.
    pub fn connect(&mut self, connection: Connection) -> Result<bool, DocumentError> {
        self.ensure_writable()?;
        if self.graph.connection_index(&connection).is_some() {
            return Ok(false);
        }
        let mut ops = Vec::new();
        let mut index = self.graph.connections().len();
        if let Some((existing_index, existing)) = self
            .graph
            .incoming(&connection.target_node_id, &connection.target_input_key)
        {
            ops.push(EditOp::RemoveConnection {
                connection: existing.clone(),
                index: existing_index,
            });
            index = existing_index;
        }
        ops.push(EditOp::AddConnection { connection, index });
        self.commit(EditOp::batch(ops))?;
        Ok(true)
    }

    pub fn disconnect(&mut self, connection: &Connection) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        let index = self.graph.connection_index(connection).ok_or_else(|| {
            GraphError::UnknownConnection(format!(
                "{}.{} -> {}.{}",
                connection.source_node_id,
                connection.source_output_key,
                connection.target_node_id,
                connection.target_input_key
            ))
        })?;
        self.commit(EditOp::RemoveConnection {
            connection: connection.clone(),
            index,
        })
    }

    /// Returns `false` (and records nothing) when the label is unchanged.
    pub fn set_label(&mut self, id: &NodeId, label: impl Into<String>) -> Result<bool, DocumentError> {
        self.ensure_writable()?;
        let label = label.into();
        let before = self
            .graph
            .node(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?
            .label
            .clone();
        if before == label {
            return Ok(false);
        }
        self.commit(EditOp::SetLabel {
            node: id.clone(),
            before,
            after: label,
        })?;
        Ok(true)
    }

    pub fn rename_port(
        &mut self,
        id: &NodeId,
        side: PortSide,
        before: &str,
        after: &str,
    ) -> Result<bool, DocumentError> {
        self.ensure_writable()?;
        if before == after {
            return Ok(false);
        }
        self.commit(EditOp::RenamePort {
            node: id.clone(),
            side,
            before: before.to_string(),
            after: after.to_string(),
        })?;
        Ok(true)
    }

    /// Set a value directly, as a committed edit. Equal values record nothing and do
    /// not signal a change.
    pub fn set_value(
        &mut self,
        id: &NodeId,
        field: Field,
        value: impl Into<String>,
    ) -> Result<bool, DocumentError> {
        self.ensure_writable()?;
        let value = value.into();
        let before = self
            .graph
            .node(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?
            .field(field)?;
        if before == value {
            return Ok(false);
        }
        self.commit(EditOp::SetValue {
            node: id.clone(),
            field,
            before,
            after: value,
        })?;
        Ok(true)
    }

    /// Start editing a value. The draft starts with the current value.
    pub fn begin_value_edit(&self, id: &NodeId, field: Field) -> Result<ValueDraft, DocumentError> {
        self.ensure_writable()?;
        let text = self
            .graph
            .node(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?
            .field(field)?;
        Ok(ValueDraft {
            node: id.clone(),
            field,
            text,
        })
    }

    /// Commit a draft on a discrete commit event (confirmation key or focus loss).
    /// Returns whether a history entry was recorded.
    pub fn commit_value_edit(&mut self, draft: ValueDraft) -> Result<bool, DocumentError> {
        self.set_value(&draft.node, draft.field, draft.text)
    }

    /// Translate every selected node by the same delta, as one history entry.
    pub fn translate_selection(&mut self, dx: f64, dy: f64) -> Result<bool, DocumentError> {
        self.ensure_writable()?;
        if self.selection.is_empty() || (dx == 0.0 && dy == 0.0) {
            return Ok(false);
        }
        let mut moves = Vec::with_capacity(self.selection.len());
        for id in self.selection.iter() {
            let node = self
                .graph
                .node(id)
                .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
            moves.push(NodeMove {
                node: id.clone(),
                from: node.position,
                to: node.position.translated(dx, dy),
            });
        }
        self.commit(EditOp::Move { moves })?;
        Ok(true)
    }

    /// Begin dragging `grabbed`. If it is part of the selection the whole selection
    /// moves; otherwise only the grabbed node.
    pub fn begin_drag(&mut self, grabbed: &NodeId) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        self.cancel_drag();
        let ids: Vec<NodeId> = if self.selection.contains(grabbed) {
            self.selection.iter().cloned().collect()
        } else {
            vec![grabbed.clone()]
        };
        let mut origins = Vec::with_capacity(ids.len());
        for id in ids {
            let node = self
                .graph
                .node(&id)
                .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
            origins.push((id, node.position));
        }
        self.drag = Some(DragGesture { origins });
        Ok(())
    }

    /// Intermediate drag frame: `dx`/`dy` are relative to where the gesture started.
    /// Records no history and signals nothing.
    pub fn drag_to(&mut self, dx: f64, dy: f64) -> Result<(), DocumentError> {
        self.ensure_writable()?;
        let drag = self.drag.as_ref().ok_or(DocumentError::NoDragInProgress)?;
        let moves = drag
            .origins
            .iter()
            .map(|(id, origin)| NodeMove {
                node: id.clone(),
                from: *origin,
                to: origin.translated(dx, dy),
            })
            .collect();
        self.graph.apply(&EditOp::Move { moves })?;
        Ok(())
    }

    /// Finish the gesture: one `Move` entry from the original to the final positions,
    /// or nothing if the nodes ended where they started.
    pub fn end_drag(&mut self) -> Result<bool, DocumentError> {
        let drag = self.drag.take().ok_or(DocumentError::NoDragInProgress)?;
        let mut moves = Vec::with_capacity(drag.origins.len());
        for (id, origin) in drag.origins {
            let Some(node) = self.graph.node(&id) else {
                continue;
            };
            if node.position != origin {
                moves.push(NodeMove {
                    to: node.position,
                    from: origin,
                    node: id,
                });
            }
        }
        if moves.is_empty() {
            return Ok(false);
        }
        self.record_applied(EditOp::Move { moves });
        Ok(true)
    }

    /// Abort the gesture and put the nodes back.
    pub fn cancel_drag(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        let moves = drag
            .origins
            .into_iter()
            .filter_map(|(id, origin)| {
                let current = self.graph.node(&id)?.position;
                Some(NodeMove {
                    node: id,
                    from: current,
                    to: origin,
                })
            })
            .collect();
        // Only nodes that still exist are moved back, so this cannot fail.
        let _ = self.graph.apply(&EditOp::Move { moves });
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn select(&mut self, id: NodeId, accumulate: bool) {
        self.selection.select(id, accumulate);
    }

    pub fn select_in_rect(&mut self, rect: Rect, accumulate: bool, bounds: impl Fn(&Node) -> Rect) {
        self.selection
            .select_in_rect(self.graph.nodes(), rect, accumulate, bounds);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Current override values of input nodes, keyed by label.
    pub fn input_overrides(&self) -> HashMap<String, String> {
        self.graph
            .nodes()
            .iter()
            .filter_map(|node| match &node.body {
                NodeBody::Input {
                    override_value: Some(value),
                    ..
                } => Some((node.label.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}
