use std::future::Future;

use calcsheet_model::{Lock, Session, SheetId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock is held by another session. `owner` is the holder's user id.
    #[error("sheet is locked by {owner}")]
    Conflict { owner: String },
    #[error("lock service unreachable: {0}")]
    Network(String),
    #[error("unexpected lock service response (status {status})")]
    Unexpected { status: u16 },
}

/// The server-side lock protocol.
///
/// The server is the only authority on expiry: a client learns it lost the lease
/// from a failed renew followed by a [`LockService::peek`].
pub trait LockService {
    /// Non-mutating status read.
    fn peek(&self, sheet: &SheetId) -> impl Future<Output = Result<Option<Lock>, LockError>>;

    /// Succeeds if nobody holds the lock or `session` already does.
    fn acquire(
        &self,
        sheet: &SheetId,
        session: &Session,
    ) -> impl Future<Output = Result<Lock, LockError>>;

    /// Extend the lease. Same semantics as [`LockService::acquire`].
    fn renew(
        &self,
        sheet: &SheetId,
        session: &Session,
    ) -> impl Future<Output = Result<Lock, LockError>> {
        self.acquire(sheet, session)
    }

    /// Unconditionally reassign the lock to `session`.
    fn take_over(
        &self,
        sheet: &SheetId,
        session: &Session,
    ) -> impl Future<Output = Result<Lock, LockError>>;

    fn release(
        &self,
        sheet: &SheetId,
        session: &Session,
    ) -> impl Future<Output = Result<(), LockError>>;

    /// Fire-and-forget release for tab close. Must not block and reports nothing.
    fn release_beacon(&self, sheet: &SheetId, session: &Session);
}

/// Extract the owner from a free-text conflict message such as `"Locked by alice"`.
pub fn parse_conflict_owner(message: &str) -> Option<String> {
    const PREFIX: &str = "locked by ";
    let lower = message.to_ascii_lowercase();
    let start = lower.find(PREFIX)? + PREFIX.len();
    let owner = message[start..]
        .trim()
        .trim_end_matches(['.', '!'])
        .trim_matches(['"', '\''])
        .trim();
    (!owner.is_empty()).then(|| owner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_parsed_from_conflict_messages() {
        assert_eq!(parse_conflict_owner("Locked by alice"), Some("alice".into()));
        assert_eq!(
            parse_conflict_owner("Sheet is locked by \"bob@example.com\"."),
            Some("bob@example.com".into())
        );
        assert_eq!(parse_conflict_owner("Locked by "), None);
        assert_eq!(parse_conflict_owner("conflict"), None);
    }
}
