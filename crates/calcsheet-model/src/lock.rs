use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SheetId;

/// One open editor: a user in a specific browser tab.
///
/// `tab_id` is what distinguishes "the same user in another tab" from "this tab
/// after a reload".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub tab_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, tab_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tab_id: tab_id.into(),
        }
    }
}

/// Server-held edit lease on a sheet. Absence of a lock means the sheet is free.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub sheet_id: SheetId,
    pub user_id: String,
    pub tab_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// How a lock relates to the local session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Holder {
    Me,
    MeOtherTab,
    Other,
}

impl Lock {
    pub fn holder_relation(&self, session: &Session) -> Holder {
        if self.user_id != session.user_id {
            Holder::Other
        } else if self.tab_id != session.tab_id {
            Holder::MeOtherTab
        } else {
            Holder::Me
        }
    }

    pub fn is_held_by(&self, session: &Session) -> bool {
        self.holder_relation(session) == Holder::Me
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
