//! One open editor tab: the edit lock, the document and the nested-sheet resolver,
//! kept consistent with each other.
//!
//! The document's read-only gate follows the lock: it is writable only while this
//! session owns the lease and is not viewing a pinned version.

use std::time::Duration;

use calcsheet_document::{
    apply_query_overrides, ChangeStream, DocumentError, Graph, GraphDocument, LocationBar,
    OverrideSync,
};
use calcsheet_lock::{
    EditLockManager, LockNotice, LockService, LockState, TakeoverConfirmation, TakeoverPrompt,
};
use calcsheet_model::{Connection, Node, NodeId, Session, SheetId, VersionId};
use calcsheet_versions::{ResolveError, SheetSource, SourceError, VersionPortResolver};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::EditorConfig;

/// Evaluates the graph after it settles.
pub trait Recompute {
    fn recompute(&mut self, sheet: &SheetId, nodes: &[Node], connections: &[Connection]);
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to persist sheet {sheet}: {message}")]
pub struct PersistError {
    pub sheet: SheetId,
    pub message: String,
}

/// Stores the draft after it settles.
pub trait PersistenceSink {
    fn persist(
        &mut self,
        sheet: &SheetId,
        nodes: &[Node],
        connections: &[Connection],
    ) -> Result<(), PersistError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("no sheet is open")]
    NotOpen,
}

/// What `open_sheet` / `open_version` found.
#[derive(Debug)]
pub struct OpenReport {
    pub lock: LockState,
    /// Input nodes whose value came from the URL.
    pub overridden: Vec<NodeId>,
    /// Nested-sheet nodes whose ports could not be refreshed.
    pub unresolved: Vec<ResolveError>,
}

/// What is on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
enum View {
    Closed,
    Draft(SheetId),
    Version(SheetId, VersionId),
}

pub struct EditorSession<S, V, R, P, L> {
    locks: EditLockManager<S>,
    document: GraphDocument,
    resolver: VersionPortResolver<V>,
    recompute: R,
    sink: P,
    url_sync: OverrideSync<L>,
    view: View,
    change_debounce: Duration,
}

impl<S, V, R, P, L> EditorSession<S, V, R, P, L>
where
    S: LockService,
    V: SheetSource,
    R: Recompute,
    P: PersistenceSink,
    L: LocationBar,
{
    pub fn new(
        config: &EditorConfig,
        session: Session,
        locks: S,
        source: V,
        recompute: R,
        sink: P,
        location: L,
    ) -> Self {
        Self {
            locks: EditLockManager::new(locks, session).with_renew_interval(config.renew_interval()),
            document: GraphDocument::with_history_limit(config.history_limit),
            resolver: VersionPortResolver::new(source, config.snapshot_cache_size),
            recompute,
            sink,
            url_sync: OverrideSync::new(location, config.url_sync_debounce(), ""),
            view: View::Closed,
            change_debounce: config.change_debounce(),
        }
    }

    pub fn document(&self) -> &GraphDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut GraphDocument {
        &mut self.document
    }

    pub fn resolver(&self) -> &VersionPortResolver<V> {
        &self.resolver
    }

    pub fn locks(&self) -> &EditLockManager<S> {
        &self.locks
    }

    pub fn lock_state(&self) -> &LockState {
        self.locks.state()
    }

    /// The pinned version being viewed, if any.
    pub fn viewing_version(&self) -> Option<&VersionId> {
        match &self.view {
            View::Version(_, version) => Some(version),
            _ => None,
        }
    }

    pub fn subscribe_changes(&self) -> ChangeStream {
        self.document.subscribe(self.change_debounce)
    }

    pub fn drain_notices(&mut self) -> Vec<LockNotice> {
        self.locks.drain_notices()
    }

    pub fn takeover_prompt(&self) -> Option<TakeoverPrompt> {
        self.locks.takeover_prompt()
    }

    pub fn location_bar(&self) -> &L {
        self.url_sync.location_bar()
    }

    /// When the next override write-back is due, if one is pending.
    pub fn next_location_deadline(&self) -> Option<Instant> {
        self.url_sync.next_deadline()
    }

    /// Write the current overrides to the location once the debounce window has
    /// elapsed. Returns whether the query was replaced.
    pub fn poll_location(&mut self) -> bool {
        self.url_sync.poll(Instant::now())
    }

    fn sync_read_only(&mut self) {
        let read_only = self.locks.is_read_only() || matches!(self.view, View::Version(..));
        self.document.set_read_only(read_only);
    }

    fn recompute_now(&mut self) {
        if let Some(sheet) = self.document.sheet_id() {
            self.recompute
                .recompute(sheet, self.document.nodes(), self.document.connections());
        }
    }

    /// Open the live draft of `sheet` for editing. `query` is the URL query string;
    /// its pairs become input overrides.
    pub async fn open_sheet(&mut self, sheet: SheetId, query: &str) -> Result<OpenReport, SessionError> {
        let definition = self.resolver.source().fetch_sheet(&sheet).await?;
        // Validated before the lock moves: a broken draft leaves the current sheet
        // and its lease as they were.
        let graph = Graph::from_parts(definition.nodes, definition.connections)
            .map_err(DocumentError::from)?;
        let lock = self.locks.open(sheet.clone(), true).await;

        self.document.load_graph(sheet.clone(), graph);
        self.url_sync.reset(query);
        let overridden = apply_query_overrides(&mut self.document, query);
        let unresolved = self.resolver.resolve_all(&mut self.document).await;
        self.view = View::Draft(sheet.clone());
        self.sync_read_only();
        self.recompute_now();

        tracing::info!(
            sheet_id = %sheet,
            lock = ?lock,
            overrides = overridden.len(),
            unresolved = unresolved.len(),
            "opened sheet"
        );
        Ok(OpenReport {
            lock,
            overridden,
            unresolved,
        })
    }

    /// Open a pinned version of `sheet` for viewing. The lock is never requested.
    pub async fn open_version(
        &mut self,
        sheet: SheetId,
        version: VersionId,
    ) -> Result<OpenReport, SessionError> {
        let definition = self.resolver.source().fetch_sheet(&sheet).await?;
        let snapshot = self.resolver.snapshot(&sheet, &version).await?;
        let graph = Graph::from_parts(definition.nodes, definition.connections)
            .map_err(DocumentError::from)?;
        let lock = self.locks.open(sheet.clone(), false).await;

        self.document.load_graph(sheet.clone(), graph);
        self.document.restore_version(&snapshot);
        self.url_sync.reset("");
        let unresolved = self.resolver.resolve_all(&mut self.document).await;
        self.view = View::Version(sheet.clone(), version.clone());
        self.sync_read_only();
        self.recompute_now();

        tracing::info!(sheet_id = %sheet, version_id = %version, "opened version");
        Ok(OpenReport {
            lock,
            overridden: Vec::new(),
            unresolved,
        })
    }

    /// Navigate to another sheet. Re-opening the draft that is already shown is a
    /// no-op.
    pub async fn switch_sheet(
        &mut self,
        sheet: SheetId,
        query: &str,
    ) -> Result<Option<OpenReport>, SessionError> {
        if self.view == View::Draft(sheet.clone()) {
            return Ok(None);
        }
        self.open_sheet(sheet, query).await.map(Some)
    }

    /// One heartbeat. Returns the lock state after it.
    pub async fn tick(&mut self) -> LockState {
        let state = self.locks.tick().await;
        self.sync_read_only();
        state
    }

    pub async fn acquire(&mut self) -> LockState {
        let state = self.locks.acquire().await;
        self.sync_read_only();
        state
    }

    pub async fn take_over(&mut self, confirmation: TakeoverConfirmation) -> LockState {
        let state = self.locks.take_over(confirmation).await;
        self.sync_read_only();
        state
    }

    /// Point a nested-sheet node at `version` (`None` = live draft) as one undoable edit.
    pub async fn set_version_target(
        &mut self,
        node: &NodeId,
        version: Option<VersionId>,
    ) -> Result<bool, SessionError> {
        Ok(self
            .resolver
            .set_target(&mut self.document, node, version)
            .await?)
    }

    /// Called when a burst of edits has settled: recompute, schedule the override
    /// write-back, then persist the draft if this session is allowed to write it.
    pub fn on_settled_change(&mut self) -> Result<(), SessionError> {
        let Some(sheet) = self.document.sheet_id().cloned() else {
            return Err(SessionError::NotOpen);
        };
        self.recompute_now();
        if matches!(self.view, View::Draft(_)) {
            self.url_sync.note_change(&self.document, Instant::now());
        }
        if !self.document.is_dirty() || self.document.is_read_only() {
            return Ok(());
        }
        self.sink
            .persist(&sheet, self.document.nodes(), self.document.connections())?;
        self.document.mark_clean();
        tracing::debug!(sheet_id = %sheet, "persisted draft");
        Ok(())
    }

    /// Controlled navigation away: awaited release.
    pub async fn leave(&mut self) {
        self.locks.release().await;
        self.view = View::Closed;
        self.sync_read_only();
    }

    /// Tab close: fire-and-forget release.
    pub fn close(&mut self) {
        self.locks.close();
        self.view = View::Closed;
        self.sync_read_only();
    }
}
