use crate::error::HistoryError;
use crate::graph::Graph;
use crate::ops::EditOp;

/// Default maximum number of undoable entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Linear undo/redo log of [`EditOp`]s.
///
/// Pushing a new entry clears the redo stack; there is no branching.
#[derive(Clone, Debug)]
pub struct History {
    done: Vec<EditOp>,
    undone: Vec<EditOp>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    /// A `limit` of zero is treated as one.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            done: Vec::new(),
            undone: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record an op that has already been applied to the graph.
    pub fn push(&mut self, op: EditOp) {
        self.undone.clear();
        self.done.push(op);
        if self.done.len() > self.limit {
            let overflow = self.done.len() - self.limit;
            self.done.drain(..overflow);
        }
    }

    pub fn undo(&mut self, graph: &mut Graph) -> Result<(), HistoryError> {
        let op = self.done.pop().ok_or(HistoryError::NoUndoHistory)?;
        if let Err(err) = graph.apply(&op.inverse()) {
            self.clear();
            return Err(HistoryError::Corrupted(err));
        }
        tracing::trace!(op = op.name(), "undo");
        self.undone.push(op);
        Ok(())
    }

    pub fn redo(&mut self, graph: &mut Graph) -> Result<(), HistoryError> {
        let op = self.undone.pop().ok_or(HistoryError::NoRedoHistory)?;
        if let Err(err) = graph.apply(&op) {
            self.clear();
            return Err(HistoryError::Corrupted(err));
        }
        tracing::trace!(op = op.name(), "redo");
        self.done.push(op);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.done.clear();
        self.undone.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.done.len()
    }

    pub fn redo_len(&self) -> usize {
        self.undone.len()
    }

    /// Most recent undoable entry.
    pub fn last(&self) -> Option<&EditOp> {
        self.done.last()
    }
}
