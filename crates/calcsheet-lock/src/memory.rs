use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use calcsheet_model::{Lock, Session, SheetId};
use chrono::{DateTime, Duration, Utc};

use crate::service::{LockError, LockService};

/// Default lease length granted by [`LockTable`], in seconds.
pub const DEFAULT_LEASE_SECS: i64 = 30;

/// Authoritative lease table: at most one unexpired lock per sheet.
#[derive(Clone, Debug)]
pub struct LockTable {
    leases: HashMap<SheetId, Lock>,
    lease: Duration,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_LEASE_SECS))
    }
}

impl LockTable {
    pub fn new(lease: Duration) -> Self {
        Self {
            leases: HashMap::new(),
            lease,
        }
    }

    fn live(&mut self, sheet: &SheetId, now: DateTime<Utc>) -> Option<&Lock> {
        if self.leases.get(sheet).is_some_and(|l| l.is_expired_at(now)) {
            tracing::debug!(sheet_id = %sheet, "lease expired");
            self.leases.remove(sheet);
        }
        self.leases.get(sheet)
    }

    pub fn peek(&mut self, sheet: &SheetId, now: DateTime<Utc>) -> Option<Lock> {
        self.live(sheet, now).cloned()
    }

    /// Grant or extend the lease. Fails if another session (including another tab of
    /// the same user) holds it.
    pub fn acquire(
        &mut self,
        sheet: &SheetId,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<Lock, LockError> {
        let acquired_at = match self.live(sheet, now) {
            Some(existing) if !existing.is_held_by(session) => {
                return Err(LockError::Conflict {
                    owner: existing.user_id.clone(),
                })
            }
            Some(existing) => existing.acquired_at,
            None => now,
        };
        Ok(self.grant(sheet, session, acquired_at, now))
    }

    pub fn take_over(&mut self, sheet: &SheetId, session: &Session, now: DateTime<Utc>) -> Lock {
        if let Some(previous) = self.live(sheet, now) {
            if !previous.is_held_by(session) {
                tracing::info!(
                    sheet_id = %sheet,
                    from = %previous.user_id,
                    to = %session.user_id,
                    "lock taken over"
                );
            }
        }
        self.grant(sheet, session, now, now)
    }

    /// Remove the lock if `session` holds it. Returns whether anything was removed.
    pub fn release(&mut self, sheet: &SheetId, session: &Session, now: DateTime<Utc>) -> bool {
        if self.live(sheet, now).is_some_and(|l| l.is_held_by(session)) {
            self.leases.remove(sheet);
            true
        } else {
            false
        }
    }

    fn grant(
        &mut self,
        sheet: &SheetId,
        session: &Session,
        acquired_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Lock {
        let lock = Lock {
            sheet_id: sheet.clone(),
            user_id: session.user_id.clone(),
            tab_id: session.tab_id.clone(),
            acquired_at,
            expires_at: now + self.lease,
        };
        self.leases.insert(sheet.clone(), lock.clone());
        lock
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// [`LockService`] backed by a shared [`LockTable`]. Clones share the table, so
/// several managers can contend for the same locks in one process.
#[derive(Clone)]
pub struct InMemoryLockService {
    table: Arc<Mutex<LockTable>>,
    clock: Clock,
    reachable: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for InMemoryLockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLockService")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new(LockTable::default())
    }
}

impl InMemoryLockService {
    pub fn new(table: LockTable) -> Self {
        Self {
            table: Arc::new(Mutex::new(table)),
            clock: Arc::new(Utc::now),
            reachable: Arc::new(Mutex::new(true)),
        }
    }

    /// Replace the time source (tests drive expiry with a manual clock).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Simulate a network partition: while unreachable every call fails with
    /// [`LockError::Network`] and beacons are lost.
    pub fn set_reachable(&self, reachable: bool) {
        *self
            .reachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reachable;
    }

    fn table(&self) -> Result<MutexGuard<'_, LockTable>, LockError> {
        let reachable = *self
            .reachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !reachable {
            return Err(LockError::Network("lock service unreachable".into()));
        }
        Ok(self.table.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

impl LockService for InMemoryLockService {
    async fn peek(&self, sheet: &SheetId) -> Result<Option<Lock>, LockError> {
        let now = self.now();
        Ok(self.table()?.peek(sheet, now))
    }

    async fn acquire(&self, sheet: &SheetId, session: &Session) -> Result<Lock, LockError> {
        let now = self.now();
        self.table()?.acquire(sheet, session, now)
    }

    async fn take_over(&self, sheet: &SheetId, session: &Session) -> Result<Lock, LockError> {
        let now = self.now();
        Ok(self.table()?.take_over(sheet, session, now))
    }

    async fn release(&self, sheet: &SheetId, session: &Session) -> Result<(), LockError> {
        let now = self.now();
        self.table()?.release(sheet, session, now);
        Ok(())
    }

    fn release_beacon(&self, sheet: &SheetId, session: &Session) {
        let now = self.now();
        if let Ok(mut table) = self.table() {
            table.release(sheet, session, now);
        }
    }
}
