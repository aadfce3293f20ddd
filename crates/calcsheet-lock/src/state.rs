//! Sans-IO lock state machine.
//!
//! Every request is started with [`LockMachine::begin`], which hands out a
//! [`Ticket`] with a fresh sequence number, and finished with
//! [`LockMachine::complete`]. Only the outcome of the newest ticket is applied;
//! anything older is reported as [`Applied::Stale`] and dropped, so a slow response
//! can never overwrite the result of a newer action.

use std::collections::VecDeque;

use calcsheet_model::{Holder, Lock, Session, SheetId};

use crate::service::LockError;

/// What this session knows about the lock on the open sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    OwnedByMe,
    OwnedByOtherSession { owner: String },
    OwnedByMeOtherTab,
    /// Locking disabled for this view (pinned version). `holder` is whoever the last
    /// peek reported.
    ObservingReadonly { holder: Option<String> },
}

impl LockState {
    pub fn is_owned(&self) -> bool {
        matches!(self, LockState::OwnedByMe)
    }

    /// Every state except [`LockState::OwnedByMe`] is read-only.
    pub fn is_read_only(&self) -> bool {
        !self.is_owned()
    }
}

/// User-facing notifications produced by state changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockNotice {
    Acquired,
    Conflict { owner: String },
    TakenOver,
    Lost,
    BecameFree,
    NetworkTrouble,
    Released,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// Status read made by `open` before deciding whether to acquire.
    Probe,
    /// Periodic status read while not owning the lock.
    Poll,
    Acquire,
    Renew,
    /// Status read after a failed renew.
    Reconcile,
    TakeOver,
    Release,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    seq: u64,
    kind: RequestKind,
}

impl Ticket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

/// Result of a lock service call, as fed back into the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Status(Option<Lock>),
    Granted(Lock),
    Released,
    Failed(LockError),
}

impl From<Result<Option<Lock>, LockError>> for Outcome {
    fn from(result: Result<Option<Lock>, LockError>) -> Self {
        result.map_or_else(Outcome::Failed, Outcome::Status)
    }
}

impl From<Result<Lock, LockError>> for Outcome {
    fn from(result: Result<Lock, LockError>) -> Self {
        result.map_or_else(Outcome::Failed, Outcome::Granted)
    }
}

impl From<Result<(), LockError>> for Outcome {
    fn from(result: Result<(), LockError>) -> Self {
        result.map_or_else(Outcome::Failed, |()| Outcome::Released)
    }
}

/// What the driver has to do after [`LockMachine::complete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// A newer request was issued; the outcome was discarded.
    Stale,
    Settled,
    /// The probe found the lock free (or already ours): acquire it.
    Acquire,
    /// Renewal failed: find out with a peek whether the lease is really gone.
    Reconcile,
}

#[derive(Debug)]
pub struct LockMachine {
    session: Session,
    sheet: Option<SheetId>,
    should_lock: bool,
    state: LockState,
    next_seq: u64,
    latest: u64,
    network_trouble: bool,
    notices: VecDeque<LockNotice>,
}

impl LockMachine {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            sheet: None,
            should_lock: true,
            state: LockState::Unlocked,
            next_seq: 1,
            latest: 0,
            network_trouble: false,
            notices: VecDeque::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sheet(&self) -> Option<&SheetId> {
        self.sheet.as_ref()
    }

    pub fn state(&self) -> &LockState {
        &self.state
    }

    pub fn should_lock(&self) -> bool {
        self.should_lock
    }

    /// Switch to a new sheet. Outcomes of requests issued for the previous sheet
    /// become stale.
    pub fn reset(&mut self, sheet: SheetId, should_lock: bool) {
        self.latest = self.next_seq;
        self.next_seq += 1;
        self.sheet = Some(sheet);
        self.should_lock = should_lock;
        self.network_trouble = false;
        self.state = if should_lock {
            LockState::Unlocked
        } else {
            LockState::ObservingReadonly { holder: None }
        };
    }

    pub fn begin(&mut self, kind: RequestKind) -> Ticket {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest = seq;
        Ticket { seq, kind }
    }

    /// The request a heartbeat tick should make: renew while owned, otherwise peek.
    pub fn tick_request(&self) -> Option<RequestKind> {
        self.sheet.as_ref()?;
        Some(if self.state.is_owned() {
            RequestKind::Renew
        } else {
            RequestKind::Poll
        })
    }

    /// Owner to show in a takeover prompt, if a conflict is pending.
    pub fn conflict_owner(&self) -> Option<&str> {
        match &self.state {
            LockState::OwnedByOtherSession { owner } => Some(owner),
            LockState::OwnedByMeOtherTab => Some(&self.session.user_id),
            _ => None,
        }
    }

    pub fn pop_notice(&mut self) -> Option<LockNotice> {
        self.notices.pop_front()
    }

    pub fn drain_notices(&mut self) -> Vec<LockNotice> {
        self.notices.drain(..).collect()
    }

    pub fn complete(&mut self, ticket: Ticket, outcome: Outcome) -> Applied {
        if ticket.seq != self.latest {
            tracing::debug!(
                seq = ticket.seq,
                latest = self.latest,
                kind = ?ticket.kind,
                "discarding superseded lock outcome"
            );
            return Applied::Stale;
        }
        if !matches!(outcome, Outcome::Failed(_)) {
            self.network_trouble = false;
        }

        match (ticket.kind, outcome) {
            (RequestKind::Probe, Outcome::Status(lock)) => match self.relation(lock.as_ref()) {
                None | Some(Holder::Me) => Applied::Acquire,
                Some(Holder::MeOtherTab) => {
                    self.enter_conflict(self.session.user_id.clone());
                    Applied::Settled
                }
                Some(Holder::Other) => {
                    let owner = lock.map(|l| l.user_id).unwrap_or_default();
                    self.enter_conflict(owner);
                    Applied::Settled
                }
            },
            (RequestKind::Poll, Outcome::Status(lock)) => {
                self.observe(lock);
                Applied::Settled
            }
            (RequestKind::Acquire, Outcome::Granted(_)) => {
                self.transition(LockState::OwnedByMe, Some(LockNotice::Acquired));
                Applied::Settled
            }
            (RequestKind::Acquire, Outcome::Failed(LockError::Conflict { owner })) => {
                self.enter_conflict(owner);
                Applied::Settled
            }
            (RequestKind::Renew, Outcome::Granted(lock)) => {
                tracing::trace!(sheet_id = %lock.sheet_id, expires_at = %lock.expires_at, "lease renewed");
                Applied::Settled
            }
            (RequestKind::Renew, Outcome::Failed(err)) => {
                tracing::warn!(error = %err, "lease renewal failed; reconciling");
                Applied::Reconcile
            }
            (RequestKind::Reconcile, Outcome::Status(lock)) => {
                match self.relation(lock.as_ref()) {
                    Some(Holder::Me) => {
                        tracing::debug!("renewal failure was transient; still owned");
                    }
                    None => self.transition(LockState::Unlocked, Some(LockNotice::Lost)),
                    Some(Holder::MeOtherTab) => {
                        self.transition(LockState::OwnedByMeOtherTab, Some(LockNotice::Lost))
                    }
                    Some(Holder::Other) => {
                        let owner = lock.map(|l| l.user_id).unwrap_or_default();
                        self.transition(
                            LockState::OwnedByOtherSession { owner },
                            Some(LockNotice::Lost),
                        )
                    }
                }
                Applied::Settled
            }
            (RequestKind::TakeOver, outcome) => {
                if let Outcome::Failed(err) = &outcome {
                    // The server is authoritative and takeover is idempotent; the next
                    // renew reconciles if the request never landed.
                    tracing::warn!(error = %err, "takeover request failed; assuming ownership");
                    self.flag_network_trouble();
                }
                self.transition(LockState::OwnedByMe, Some(LockNotice::TakenOver));
                Applied::Settled
            }
            (RequestKind::Release, outcome) => {
                if let Outcome::Failed(err) = &outcome {
                    tracing::warn!(error = %err, "release failed; lease will expire server-side");
                }
                let next = if self.should_lock {
                    LockState::Unlocked
                } else {
                    LockState::ObservingReadonly { holder: None }
                };
                self.transition(next, Some(LockNotice::Released));
                Applied::Settled
            }
            (kind, Outcome::Failed(err)) => {
                tracing::warn!(kind = ?kind, error = %err, "lock request failed");
                if kind == RequestKind::Acquire {
                    self.transition(LockState::Unlocked, None);
                }
                self.flag_network_trouble();
                Applied::Settled
            }
            (kind, outcome) => {
                tracing::warn!(kind = ?kind, outcome = ?outcome, "lock outcome does not match request");
                Applied::Settled
            }
        }
    }

    fn relation(&self, lock: Option<&Lock>) -> Option<Holder> {
        lock.map(|l| l.holder_relation(&self.session))
    }

    /// Apply a periodic peek while not owning the lock. Never acquires.
    fn observe(&mut self, lock: Option<Lock>) {
        if !self.should_lock {
            self.state = LockState::ObservingReadonly {
                holder: lock.map(|l| l.user_id),
            };
            return;
        }
        match (self.relation(lock.as_ref()), lock) {
            (None, _) => {
                if matches!(
                    self.state,
                    LockState::OwnedByOtherSession { .. } | LockState::OwnedByMeOtherTab
                ) {
                    self.transition(LockState::Unlocked, Some(LockNotice::BecameFree));
                }
            }
            (Some(Holder::Me), _) => self.transition(LockState::OwnedByMe, Some(LockNotice::Acquired)),
            (Some(Holder::MeOtherTab), _) => self.transition(LockState::OwnedByMeOtherTab, None),
            (Some(Holder::Other), Some(lock)) => self.transition(
                LockState::OwnedByOtherSession {
                    owner: lock.user_id,
                },
                None,
            ),
            (Some(Holder::Other), None) => {}
        }
    }

    fn enter_conflict(&mut self, owner: String) {
        let next = if owner == self.session.user_id {
            LockState::OwnedByMeOtherTab
        } else {
            LockState::OwnedByOtherSession {
                owner: owner.clone(),
            }
        };
        self.transition(next, Some(LockNotice::Conflict { owner }));
    }

    fn flag_network_trouble(&mut self) {
        if !self.network_trouble {
            self.network_trouble = true;
            self.notices.push_back(LockNotice::NetworkTrouble);
        }
    }

    fn transition(&mut self, next: LockState, notice: Option<LockNotice>) {
        if self.state == next {
            return;
        }
        let sheet_id = self.sheet.as_ref().map(SheetId::as_str).unwrap_or_default();
        if self.state.is_owned() != next.is_owned() {
            tracing::info!(sheet_id, from = ?self.state, to = ?next, "lock ownership changed");
        } else {
            tracing::debug!(sheet_id, from = ?self.state, to = ?next, "lock state changed");
        }
        self.state = next;
        if let Some(notice) = notice {
            self.notices.push_back(notice);
        }
    }
}
