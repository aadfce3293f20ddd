//! Editor wiring for calcsheet: configuration and the per-tab [`EditorSession`].

pub mod config;
pub mod session;

pub use config::{ConfigError, EditorConfig};
pub use session::{
    EditorSession, OpenReport, PersistError, PersistenceSink, Recompute, SessionError,
};
