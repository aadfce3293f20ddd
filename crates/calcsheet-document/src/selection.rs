use std::collections::BTreeSet;

use calcsheet_model::{Node, NodeId, Rect};

/// Set of selected node ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<NodeId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the selection.
    ///
    /// Without `accumulate` the previous selection is replaced. With `accumulate`,
    /// re-selecting an already-selected id toggles it off.
    pub fn select(&mut self, id: NodeId, accumulate: bool) {
        if !accumulate {
            self.ids.clear();
            self.ids.insert(id);
        } else if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    /// Marquee selection: every node whose bounds intersect `rect` goes through the
    /// same add logic as [`Selection::select`]. A non-accumulating marquee that hits
    /// nothing clears the selection.
    pub fn select_in_rect<'a, I, F>(&mut self, nodes: I, rect: Rect, accumulate: bool, bounds: F)
    where
        I: IntoIterator<Item = &'a Node>,
        F: Fn(&Node) -> Rect,
    {
        if !accumulate {
            self.ids.clear();
        }
        for node in nodes {
            if bounds(node).intersects(&rect) {
                self.select(node.id.clone(), true);
            }
        }
    }

    pub fn deselect(&mut self, id: &NodeId) -> bool {
        self.ids.remove(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.ids.iter()
    }

    /// Drop ids for which `keep` is false (e.g. nodes removed by undo).
    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.ids.retain(|id| keep(id));
    }
}
