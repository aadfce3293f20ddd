//! `calcsheet-document` holds the sheet being edited and its undo/redo history.
//!
//! - [`Graph`]: nodes and connections with validated, atomic [`EditOp`] application
//! - [`History`]: linear undo/redo of invertible ops
//! - [`GraphDocument`]: the editing surface (read-only gate, selection, drag
//!   coalescing, value drafts) that records every user-visible change as one entry
//! - [`ChangeNotifier`]/[`ChangeStream`]: debounced "graph changed" signal that
//!   drives recompute and persistence
//! - [`overrides`]: URL-encoded input overrides

mod document;
mod error;
mod graph;
mod history;
mod notifier;
mod ops;
pub mod overrides;
mod selection;

pub use document::{GraphDocument, ValueDraft};
pub use error::{DocumentError, GraphError, HistoryError};
pub use graph::Graph;
pub use history::{History, DEFAULT_HISTORY_LIMIT};
pub use notifier::{ChangeNotifier, ChangeStream, DEFAULT_CHANGE_DEBOUNCE};
pub use ops::{EditOp, NodeMove, SheetTarget};
pub use overrides::{apply_query_overrides, drill_down_url, overrides_query, LocationBar, OverrideSync};
pub use selection::Selection;
