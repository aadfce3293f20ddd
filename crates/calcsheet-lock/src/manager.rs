use std::future::Future;
use std::time::Duration;

use calcsheet_model::{Session, SheetId};
use tokio::time::MissedTickBehavior;

use crate::service::LockService;
use crate::state::{Applied, LockMachine, LockNotice, LockState, Outcome, RequestKind};

/// Default lease renewal cadence.
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(10);

/// A pending conflict the user may resolve by taking the lock over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TakeoverPrompt {
    sheet: SheetId,
    owner: String,
}

impl TakeoverPrompt {
    pub fn sheet(&self) -> &SheetId {
        &self.sheet
    }

    /// User id of the current holder.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The user confirmed the takeover.
    pub fn confirm(self) -> TakeoverConfirmation {
        TakeoverConfirmation { sheet: self.sheet }
    }
}

/// Proof of an explicit confirmation step. Only [`TakeoverPrompt::confirm`] creates
/// one, so a takeover can never happen silently.
#[derive(Debug, PartialEq, Eq)]
pub struct TakeoverConfirmation {
    sheet: SheetId,
}

/// Client side of the edit lease for one tab.
///
/// All failures end up as a [`LockState`] plus queued [`LockNotice`]s; no method
/// returns an error.
#[derive(Debug)]
pub struct EditLockManager<S> {
    service: S,
    machine: LockMachine,
    renew_interval: Duration,
}

impl<S: LockService> EditLockManager<S> {
    pub fn new(service: S, session: Session) -> Self {
        Self {
            service,
            machine: LockMachine::new(session),
            renew_interval: DEFAULT_RENEW_INTERVAL,
        }
    }

    pub fn with_renew_interval(mut self, renew_interval: Duration) -> Self {
        self.renew_interval = renew_interval;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn session(&self) -> &Session {
        self.machine.session()
    }

    pub fn sheet(&self) -> Option<&SheetId> {
        self.machine.sheet()
    }

    pub fn state(&self) -> &LockState {
        self.machine.state()
    }

    pub fn renew_interval(&self) -> Duration {
        self.renew_interval
    }

    pub fn is_read_only(&self) -> bool {
        self.machine.state().is_read_only()
    }

    pub fn drain_notices(&mut self) -> Vec<LockNotice> {
        self.machine.drain_notices()
    }

    pub fn takeover_prompt(&self) -> Option<TakeoverPrompt> {
        if !self.machine.should_lock() {
            return None;
        }
        let sheet = self.machine.sheet()?.clone();
        let owner = self.machine.conflict_owner()?.to_string();
        Some(TakeoverPrompt { sheet, owner })
    }

    /// Start working on `sheet`. With `should_lock = false` the sheet is only
    /// observed and the lock is never requested.
    pub async fn open(&mut self, sheet: SheetId, should_lock: bool) -> LockState {
        if self.machine.state().is_owned() {
            self.release().await;
        }
        tracing::debug!(sheet_id = %sheet, should_lock, "opening sheet");
        self.machine.reset(sheet, should_lock);
        if should_lock {
            if self.run(RequestKind::Probe).await == Applied::Acquire {
                self.run(RequestKind::Acquire).await;
            }
        } else {
            self.run(RequestKind::Poll).await;
        }
        self.state().clone()
    }

    /// Explicit user request to start editing (e.g. after the lock became free).
    pub async fn acquire(&mut self) -> LockState {
        if self.machine.should_lock() && !self.machine.state().is_owned() {
            self.run(RequestKind::Acquire).await;
        }
        self.state().clone()
    }

    /// One heartbeat: renew while owned, otherwise peek.
    pub async fn tick(&mut self) -> LockState {
        if let Some(kind) = self.machine.tick_request() {
            if self.run(kind).await == Applied::Reconcile {
                self.run(RequestKind::Reconcile).await;
            }
        }
        self.state().clone()
    }

    pub async fn take_over(&mut self, confirmation: TakeoverConfirmation) -> LockState {
        if self.machine.sheet() != Some(&confirmation.sheet) || !self.machine.should_lock() {
            tracing::warn!(sheet_id = %confirmation.sheet, "ignoring takeover for a sheet that is not open");
            return self.state().clone();
        }
        self.run(RequestKind::TakeOver).await;
        self.state().clone()
    }

    /// Best-effort release on controlled navigation.
    pub async fn release(&mut self) {
        if self.machine.state().is_owned() {
            self.run(RequestKind::Release).await;
        }
    }

    /// Tab close: fire-and-forget release.
    pub fn close(&mut self) {
        if !self.machine.state().is_owned() {
            return;
        }
        let Some(sheet) = self.machine.sheet().cloned() else {
            return;
        };
        tracing::debug!(sheet_id = %sheet, "sending release beacon");
        self.service.release_beacon(&sheet, self.machine.session());
        let ticket = self.machine.begin(RequestKind::Release);
        self.machine.complete(ticket, Outcome::Released);
    }

    /// Tick every `renew_interval` until `shutdown` resolves.
    pub async fn run_heartbeat<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.renew_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn run(&mut self, kind: RequestKind) -> Applied {
        let Some(sheet) = self.machine.sheet().cloned() else {
            return Applied::Settled;
        };
        let ticket = self.machine.begin(kind);
        let session = self.machine.session().clone();
        let outcome: Outcome = match kind {
            RequestKind::Probe | RequestKind::Poll | RequestKind::Reconcile => {
                self.service.peek(&sheet).await.into()
            }
            RequestKind::Acquire => self.service.acquire(&sheet, &session).await.into(),
            RequestKind::Renew => self.service.renew(&sheet, &session).await.into(),
            RequestKind::TakeOver => self.service.take_over(&sheet, &session).await.into(),
            RequestKind::Release => self.service.release(&sheet, &session).await.into(),
        };
        tracing::trace!(seq = ticket.seq(), kind = ?kind, "lock request completed");
        self.machine.complete(ticket, outcome)
    }
}
