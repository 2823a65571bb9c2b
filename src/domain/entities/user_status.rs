use chrono::NaiveDateTime;
use serde::Serialize;

/// Deferred enable (1) / disable (0) directive applied at the next renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStatusForNextCycle {
    pub id: i64,
    pub school_id: i64,
    pub user_id: i64,
    pub status: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub school_id: Option<i64>,
    pub status: i16,
    pub deleted_at: Option<NaiveDateTime>,
}

/// User ids split by the directive they received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserToggles {
    pub enable: Vec<i64>,
    pub disable: Vec<i64>,
}

impl UserToggles {
    /// Status 1 enables, anything else disables.
    pub fn partition(rows: &[UserStatusForNextCycle]) -> Self {
        let (enable, disable): (Vec<_>, Vec<_>) = rows.iter().partition(|r| r.status == 1);
        let mut toggles = Self {
            enable: enable.into_iter().map(|r| r.user_id).collect(),
            disable: disable.into_iter().map(|r| r.user_id).collect(),
        };
        toggles.enable.sort_unstable();
        toggles.enable.dedup();
        toggles.disable.sort_unstable();
        toggles.disable.dedup();
        toggles
    }

    pub fn is_empty(&self) -> bool {
        self.enable.is_empty() && self.disable.is_empty()
    }
}
