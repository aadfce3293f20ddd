use std::collections::HashMap;

use calcsheet_model::Session;

/// Storage key holding the tab id.
pub const TAB_ID_KEY: &str = "calcsheet.tabId";
/// Storage key written while the page unloads; its presence on the next load means
/// "this is a reload", not a duplicated tab.
pub const UNLOADED_KEY: &str = "calcsheet.tabUnloaded";

/// Per-tab storage: survives a reload and is copied when the tab is duplicated.
pub trait TabStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-process [`TabStorage`]. Cloning it models duplicating the tab.
#[derive(Clone, Debug, Default)]
pub struct MemoryTabStorage {
    entries: HashMap<String, String>,
}

impl TabStorage for MemoryTabStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// The session a tab runs as, and whether its tab id survived from a previous load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    session: Session,
    reused: bool,
}

impl SessionIdentity {
    /// Derive the session for a freshly loaded page.
    ///
    /// The stored tab id is reused only when the previous page left the unloaded
    /// marker behind (a reload). A duplicated tab inherits the id without the marker,
    /// because the original tab is still open, and gets a fresh id.
    pub fn derive(user_id: impl Into<String>, storage: &mut impl TabStorage) -> Self {
        let reloaded = storage.get(UNLOADED_KEY).is_some();
        storage.remove(UNLOADED_KEY);

        let (tab_id, reused) = match storage.get(TAB_ID_KEY) {
            Some(existing) if reloaded && !existing.is_empty() => (existing, true),
            _ => {
                let fresh = uuid::Uuid::new_v4().to_string();
                storage.set(TAB_ID_KEY, &fresh);
                (fresh, false)
            }
        };
        let session = Session::new(user_id, tab_id);
        tracing::debug!(user_id = %session.user_id, tab_id = %session.tab_id, reused, "derived session");
        Self { session, reused }
    }

    /// Called from the page's unload handler.
    pub fn mark_unloading(storage: &mut impl TabStorage) {
        storage.set(UNLOADED_KEY, "1");
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}
