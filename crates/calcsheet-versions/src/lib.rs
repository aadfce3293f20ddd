//! Version-pinned nested sheets.
//!
//! A nested-sheet node exposes one port per `input`/`output` node of the sheet it
//! references, either the live draft or an immutable version snapshot. This crate
//! computes those ports ([`plan_ports`]) and keeps the document in line with them
//! ([`VersionPortResolver`]), pruning exactly the connections whose ports vanished.

mod plan;
mod resolver;
mod source;

pub use plan::{plan_ports, PortPlan};
pub use resolver::{Recording, ResolveError, VersionPortResolver, DEFAULT_SNAPSHOT_CACHE_SIZE};
pub use source::{InMemorySheetSource, SheetSource, SourceError};
