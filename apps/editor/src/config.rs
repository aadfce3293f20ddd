use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

pub const SERVER_ENV: &str = "CALCSHEET_SERVER";
pub const USER_ENV: &str = "CALCSHEET_USER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
    #[error("unknown log level {0:?} (expected off|error|warn|info|debug|trace)")]
    LogLevel(String),
    #[error("no server url configured (set CALCSHEET_SERVER or pass --server)")]
    MissingServer,
}

/// Editor tuning knobs. Every field has a default, so a config file only needs to
/// name what it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Base URL of the calcsheet server (default: unset).
    pub server_url: Option<String>,
    /// User id sent with lock requests (default: unset).
    pub user_id: Option<String>,
    /// Lease heartbeat period (default: 10 000 ms).
    pub renew_interval_ms: u64,
    /// Quiet period before a burst of edits triggers recompute/persist (default: 250 ms).
    pub change_debounce_ms: u64,
    /// Quiet period before overrides are written back to the URL (default: 400 ms).
    pub url_sync_debounce_ms: u64,
    /// Undo depth (default: 500).
    pub history_limit: usize,
    /// Version snapshots kept in memory (default: 64).
    pub snapshot_cache_size: usize,
    /// Default tracing level when `RUST_LOG` is unset (default: "info").
    pub log_level: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            user_id: None,
            renew_interval_ms: 10_000,
            change_debounce_ms: 250,
            url_sync_debounce_ms: 400,
            history_limit: calcsheet_document::DEFAULT_HISTORY_LIMIT,
            snapshot_cache_size: calcsheet_versions::DEFAULT_SNAPSHOT_CACHE_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl EditorConfig {
    /// Read a JSON config file. A missing file is an error; callers that treat the
    /// file as optional should not call this.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer `CALCSHEET_SERVER` / `CALCSHEET_USER` on top. Blank values are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(server) = non_blank(SERVER_ENV) {
            self.server_url = Some(server);
        }
        if let Some(user) = non_blank(USER_ENV) {
            self.user_id = Some(user);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("renewIntervalMs", self.renew_interval_ms),
            ("changeDebounceMs", self.change_debounce_ms),
            ("urlSyncDebounceMs", self.url_sync_debounce_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .trim()
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    pub fn server_url(&self) -> Result<&str, ConfigError> {
        self.server_url.as_deref().ok_or(ConfigError::MissingServer)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_millis(self.renew_interval_ms)
    }

    pub fn change_debounce(&self) -> Duration {
        Duration::from_millis(self.change_debounce_ms)
    }

    pub fn url_sync_debounce(&self) -> Duration {
        Duration::from_millis(self.url_sync_debounce_ms)
    }
}
