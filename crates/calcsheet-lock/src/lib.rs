//! Exclusive, lease-based edit lock per sheet.
//!
//! Reading is always allowed; writing requires owning the lease. The
//! [`EditLockManager`] drives the sans-IO [`LockMachine`] against a
//! [`LockService`], renewing every ten seconds while owned and only ever peeking
//! otherwise. A freed lock is reported, never grabbed automatically.

mod manager;
mod memory;
mod service;
pub mod session;
mod state;

pub use manager::{EditLockManager, TakeoverConfirmation, TakeoverPrompt, DEFAULT_RENEW_INTERVAL};
pub use memory::{InMemoryLockService, LockTable, DEFAULT_LEASE_SECS};
pub use service::{parse_conflict_owner, LockError, LockService};
pub use session::{MemoryTabStorage, SessionIdentity, TabStorage};
pub use state::{Applied, LockMachine, LockNotice, LockState, Outcome, RequestKind, Ticket};
