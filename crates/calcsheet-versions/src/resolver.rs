use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use calcsheet_document::{DocumentError, EditOp, GraphDocument, SheetTarget};
use calcsheet_model::{Node, NodeBody, NodeId, SheetId, VersionId, VersionSnapshot, VersionSummary};
use lru::LruCache;
use thiserror::Error;

use crate::plan::plan_ports;
use crate::source::{SheetSource, SourceError};

/// Default number of version snapshots kept in memory.
pub const DEFAULT_SNAPSHOT_CACHE_SIZE: usize = 64;

/// Whether a resolution becomes an undoable history entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recording {
    Recorded,
    /// Load-time resolution: no history, no change signal.
    Suppressed,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("node {0} is not a nested-sheet reference")]
    NotASheetNode(NodeId),
    /// The referenced sheet or snapshot could not be fetched. The node keeps its
    /// last-known ports.
    #[error("could not resolve ports of node {node}: {source}")]
    PortResolution {
        node: NodeId,
        #[source]
        source: SourceError,
    },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Keeps nested-sheet nodes' ports in line with the sheet or version they point at.
///
/// Snapshots are immutable, so they are cached by `(sheet, version)`. Live drafts
/// are fetched every time.
pub struct VersionPortResolver<S> {
    source: S,
    snapshots: LruCache<(SheetId, VersionId), Arc<VersionSnapshot>>,
    errors: HashMap<NodeId, SourceError>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for VersionPortResolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionPortResolver")
            .field("source", &self.source)
            .field("cached_snapshots", &self.snapshots.len())
            .field("errors", &self.errors)
            .finish()
    }
}

fn sheet_target(node: &Node) -> Option<SheetTarget> {
    match &node.body {
        NodeBody::Sheet {
            sheet_id,
            version_id,
        } => Some(SheetTarget {
            sheet_id: sheet_id.clone(),
            version_id: version_id.clone(),
        }),
        _ => None,
    }
}

impl<S: SheetSource> VersionPortResolver<S> {
    pub fn new(source: S, cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            snapshots: LruCache::new(cap),
            errors: HashMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The last resolution error of `node`, shown inline on the node.
    pub fn inline_error(&self, node: &NodeId) -> Option<&SourceError> {
        self.errors.get(node)
    }

    pub fn cached_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Fetch a snapshot, served from the cache when possible.
    pub async fn snapshot(
        &mut self,
        sheet: &SheetId,
        version: &VersionId,
    ) -> Result<Arc<VersionSnapshot>, SourceError> {
        let key = (sheet.clone(), version.clone());
        if let Some(hit) = self.snapshots.get(&key) {
            return Ok(Arc::clone(hit));
        }
        let snapshot = Arc::new(self.source.fetch_version(sheet, version).await?);
        tracing::debug!(sheet_id = %sheet, version_id = %version, "cached version snapshot");
        self.snapshots.put(key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn authoritative_nodes(&mut self, target: &SheetTarget) -> Result<Vec<Node>, SourceError> {
        match &target.version_id {
            Some(version) => Ok(self.snapshot(&target.sheet_id, version).await?.nodes.clone()),
            None => Ok(self.source.fetch_sheet(&target.sheet_id).await?.nodes),
        }
    }

    fn target_of(doc: &GraphDocument, node: &NodeId) -> Result<SheetTarget, ResolveError> {
        let found = doc
            .node(node)
            .ok_or_else(|| ResolveError::UnknownNode(node.clone()))?;
        sheet_target(found).ok_or_else(|| ResolveError::NotASheetNode(node.clone()))
    }

    async fn fetch_for(
        &mut self,
        node: &NodeId,
        target: &SheetTarget,
    ) -> Result<Vec<Node>, ResolveError> {
        match self.authoritative_nodes(target).await {
            Ok(nodes) => {
                self.errors.remove(node);
                Ok(nodes)
            }
            Err(source) => {
                tracing::warn!(
                    node = %node,
                    sheet_id = %target.sheet_id,
                    version_id = ?target.version_id,
                    error = %source,
                    "port resolution failed; keeping last known ports"
                );
                self.errors.insert(node.clone(), source.clone());
                Err(ResolveError::PortResolution {
                    node: node.clone(),
                    source,
                })
            }
        }
    }

    fn apply(doc: &mut GraphDocument, ops: Vec<EditOp>, recording: Recording) -> Result<(), DocumentError> {
        let op = EditOp::batch(ops);
        match recording {
            Recording::Recorded => doc.apply_recorded(op),
            Recording::Suppressed => doc.suppressed(|d| d.apply_recorded(op)),
        }
    }

    /// Reconcile `node`'s ports with its current target. Returns whether anything
    /// changed; resolving again without a version change is a no-op.
    pub async fn resolve(
        &mut self,
        doc: &mut GraphDocument,
        node: &NodeId,
        recording: Recording,
    ) -> Result<bool, ResolveError> {
        let target = Self::target_of(doc, node)?;
        let nodes = self.fetch_for(node, &target).await?;
        let Some(current) = doc.node(node) else {
            return Err(ResolveError::UnknownNode(node.clone()));
        };
        let plan = plan_ports(current, &nodes, doc.connections());
        if plan.is_noop() {
            return Ok(false);
        }
        tracing::debug!(
            node = %node,
            removed_inputs = ?plan.removed_inputs,
            removed_outputs = ?plan.removed_outputs,
            added_inputs = ?plan.added_inputs,
            added_outputs = ?plan.added_outputs,
            pruned = plan.pruned.len(),
            "reconciling nested-sheet ports"
        );
        Self::apply(doc, plan.ops(), recording)?;
        Ok(true)
    }

    /// Point `node` at `version` (`None` = live draft). The target is fetched first;
    /// on success the switch and the full port reconciliation become one history
    /// entry. On failure nothing changes.
    pub async fn set_target(
        &mut self,
        doc: &mut GraphDocument,
        node: &NodeId,
        version: Option<VersionId>,
    ) -> Result<bool, ResolveError> {
        if doc.is_read_only() {
            return Err(DocumentError::ReadOnly.into());
        }
        let before = Self::target_of(doc, node)?;
        let after = SheetTarget {
            sheet_id: before.sheet_id.clone(),
            version_id: version,
        };
        if before == after {
            return self.resolve(doc, node, Recording::Recorded).await;
        }

        let nodes = self.fetch_for(node, &after).await?;
        let Some(current) = doc.node(node) else {
            return Err(ResolveError::UnknownNode(node.clone()));
        };
        let plan = plan_ports(current, &nodes, doc.connections());
        tracing::info!(
            node = %node,
            sheet_id = %after.sheet_id,
            from = ?before.version_id,
            to = ?after.version_id,
            "switching nested-sheet version"
        );
        let mut ops = vec![EditOp::SetSheetTarget {
            node: node.clone(),
            before,
            after,
        }];
        ops.extend(plan.ops());
        Self::apply(doc, ops, Recording::Recorded)?;
        Ok(true)
    }

    /// Resolve every nested-sheet node after a load, suppressed. Failures are kept
    /// per node and returned; the remaining nodes are still resolved.
    pub async fn resolve_all(&mut self, doc: &mut GraphDocument) -> Vec<ResolveError> {
        let ids: Vec<NodeId> = doc
            .nodes()
            .iter()
            .filter(|n| sheet_target(n).is_some())
            .map(|n| n.id.clone())
            .collect();
        self.errors.retain(|id, _| ids.contains(id));

        let mut failures = Vec::new();
        for id in ids {
            if let Err(err) = self.resolve(doc, &id, Recording::Suppressed).await {
                failures.push(err);
            }
        }
        failures
    }

    /// The sheet's advisory default version. Reported only; never applied.
    pub async fn default_version(&self, sheet: &SheetId) -> Result<Option<VersionSummary>, SourceError> {
        Ok(self
            .source
            .list_versions(sheet)
            .await?
            .into_iter()
            .find(|v| v.is_default))
    }

    pub async fn list_versions(&self, sheet: &SheetId) -> Result<Vec<VersionSummary>, SourceError> {
        self.source.list_versions(sheet).await
    }

    /// Freeze the sheet's current draft. The new snapshot goes straight into the cache.
    pub async fn create_version(
        &mut self,
        sheet: &SheetId,
        tag: &str,
        description: Option<&str>,
    ) -> Result<Arc<VersionSnapshot>, SourceError> {
        let snapshot = Arc::new(self.source.create_version(sheet, tag, description).await?);
        tracing::info!(sheet_id = %sheet, version_id = %snapshot.id, tag, "created version");
        self.snapshots
            .put((sheet.clone(), snapshot.id.clone()), Arc::clone(&snapshot));
        Ok(snapshot)
    }
}
