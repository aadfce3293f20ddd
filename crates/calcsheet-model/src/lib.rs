//! `calcsheet-model` defines the core in-memory data structures shared by every
//! calcsheet crate.
//!
//! The crate is intentionally self-contained so it can be reused by:
//! - the graph document / history engine
//! - the lock client and the in-memory lock table
//! - the version port resolver and the HTTP transport (JSON-safe via `serde`)

mod connection;
mod error;
mod geometry;
mod ids;
mod lock;
mod node;
mod ports;
mod version;

pub use connection::Connection;
pub use error::ModelError;
pub use geometry::{Position, Rect};
pub use ids::{NodeId, SheetId, VersionId};
pub use lock::{Holder, Lock, Session};
pub use node::{Field, Node, NodeBody, NodeKind, Port, PortSide, SocketKind};
pub use ports::{derive_ports, PortSet};
pub use version::{SheetDefinition, VersionSnapshot, VersionSummary};

fn new_uuid() -> uuid::Uuid {
    #[cfg(not(target_arch = "wasm32"))]
    {
        uuid::Uuid::new_v4()
    }

    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(1);
        uuid::Uuid::from_u128(COUNTER.fetch_add(1, Ordering::Relaxed) as u128)
    }
}
