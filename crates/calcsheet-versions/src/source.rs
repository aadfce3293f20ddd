use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use calcsheet_model::{SheetDefinition, SheetId, VersionId, VersionSnapshot, VersionSummary};
use chrono::Utc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("sheet {0} not found")]
    SheetNotFound(SheetId),
    #[error("version {version} of sheet {sheet} not found")]
    VersionNotFound { sheet: SheetId, version: VersionId },
    #[error("sheet service unreachable: {0}")]
    Network(String),
    #[error("unexpected sheet service response (status {status})")]
    Unexpected { status: u16 },
    #[error("malformed sheet service response: {0}")]
    Decode(String),
}

/// Where sheet drafts and version snapshots come from.
pub trait SheetSource {
    /// The live draft.
    fn fetch_sheet(
        &self,
        sheet: &SheetId,
    ) -> impl Future<Output = Result<SheetDefinition, SourceError>>;

    fn fetch_version(
        &self,
        sheet: &SheetId,
        version: &VersionId,
    ) -> impl Future<Output = Result<VersionSnapshot, SourceError>>;

    fn list_versions(
        &self,
        sheet: &SheetId,
    ) -> impl Future<Output = Result<Vec<VersionSummary>, SourceError>>;

    /// Freeze the current draft's node list under `tag`.
    fn create_version(
        &self,
        sheet: &SheetId,
        tag: &str,
        description: Option<&str>,
    ) -> impl Future<Output = Result<VersionSnapshot, SourceError>>;
}

#[derive(Debug, Default)]
struct Store {
    sheets: HashMap<SheetId, SheetDefinition>,
    versions: HashMap<SheetId, Vec<VersionSnapshot>>,
    defaults: HashMap<SheetId, VersionId>,
    reachable: bool,
    fetches: usize,
}

/// [`SheetSource`] over in-process maps. Clones share the store.
#[derive(Clone, Debug)]
pub struct InMemorySheetSource {
    store: Arc<Mutex<Store>>,
}

impl Default for InMemorySheetSource {
    fn default() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                reachable: true,
                ..Store::default()
            })),
        }
    }
}

impl InMemorySheetSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable_store(&self) -> Result<MutexGuard<'_, Store>, SourceError> {
        let mut store = self.store();
        if !store.reachable {
            return Err(SourceError::Network("sheet service unreachable".into()));
        }
        store.fetches += 1;
        Ok(store)
    }

    pub fn put_sheet(&self, sheet: SheetDefinition) {
        self.store().sheets.insert(sheet.id.clone(), sheet);
    }

    pub fn put_version(&self, snapshot: VersionSnapshot) {
        self.store()
            .versions
            .entry(snapshot.sheet_id.clone())
            .or_default()
            .push(snapshot);
    }

    pub fn set_default_version(&self, sheet: &SheetId, version: &VersionId) {
        self.store().defaults.insert(sheet.clone(), version.clone());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.store().reachable = reachable;
    }

    /// Number of requests that reached the store.
    pub fn fetch_count(&self) -> usize {
        self.store().fetches
    }
}

impl SheetSource for InMemorySheetSource {
    async fn fetch_sheet(&self, sheet: &SheetId) -> Result<SheetDefinition, SourceError> {
        self.reachable_store()?
            .sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| SourceError::SheetNotFound(sheet.clone()))
    }

    async fn fetch_version(
        &self,
        sheet: &SheetId,
        version: &VersionId,
    ) -> Result<VersionSnapshot, SourceError> {
        self.reachable_store()?
            .versions
            .get(sheet)
            .and_then(|list| list.iter().find(|v| &v.id == version))
            .cloned()
            .ok_or_else(|| SourceError::VersionNotFound {
                sheet: sheet.clone(),
                version: version.clone(),
            })
    }

    async fn list_versions(&self, sheet: &SheetId) -> Result<Vec<VersionSummary>, SourceError> {
        let store = self.reachable_store()?;
        let default = store.defaults.get(sheet);
        Ok(store
            .versions
            .get(sheet)
            .map(|list| {
                list.iter()
                    .map(|v| v.summary(default == Some(&v.id)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_version(
        &self,
        sheet: &SheetId,
        tag: &str,
        description: Option<&str>,
    ) -> Result<VersionSnapshot, SourceError> {
        let mut store = self.reachable_store()?;
        let nodes = store
            .sheets
            .get(sheet)
            .ok_or_else(|| SourceError::SheetNotFound(sheet.clone()))?
            .nodes
            .clone();
        let snapshot = VersionSnapshot {
            id: VersionId::generate(),
            sheet_id: sheet.clone(),
            tag: tag.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
            nodes,
        };
        store
            .versions
            .entry(sheet.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(snapshot)
    }
}
