use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

pub const ADDON_STATUS_ACTIVE: i16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonSubscription {
    pub id: i64,
    pub school_id: i64,
    pub subscription_id: Option<i64>,
    pub feature_id: i64,
    pub price_cents: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: i16,
    pub created_at: Option<NaiveDateTime>,
}

impl AddonSubscription {
    pub fn is_active(&self) -> bool {
        self.status == ADDON_STATUS_ACTIVE
    }

    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.start_date <= today && today <= self.end_date
    }

    pub fn is_future(&self, today: NaiveDate) -> bool {
        self.start_date > today
    }

    pub fn key(&self) -> AddonKey {
        AddonKey {
            school_id: self.school_id,
            feature_id: self.feature_id,
            end_date: self.end_date,
        }
    }
}

/// Active add-on of a subscription joined with the catalog price of its feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAddon {
    pub addon_subscription_id: i64,
    pub feature_id: i64,
    pub current_price_cents: i64,
}

/// Identity of an add-on row for upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddonKey {
    pub school_id: i64,
    pub feature_id: i64,
    pub end_date: NaiveDate,
}

/// Desired state of one add-on row after migration into a new cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonUpsert {
    pub school_id: i64,
    pub feature_id: i64,
    pub price_cents: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: i16,
    pub subscription_id: i64,
}

impl AddonUpsert {
    pub fn key(&self) -> AddonKey {
        AddonKey {
            school_id: self.school_id,
            feature_id: self.feature_id,
            end_date: self.end_date,
        }
    }

    /// Carry an active add-on into the cycle `[start_date, end_date]` of `subscription_id`.
    pub fn migrate(
        school_id: i64,
        addon: &ActiveAddon,
        subscription_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            school_id,
            feature_id: addon.feature_id,
            price_cents: addon.current_price_cents,
            start_date,
            end_date,
            status: ADDON_STATUS_ACTIVE,
            subscription_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonWrite {
    Insert(AddonUpsert),
    /// Overwrites price, start_date, status and subscription_id of row `id`.
    Update { id: i64, row: AddonUpsert },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddonMergeError {
    #[error("add-on feature {feature_id} for school {school_id} ending {end_date} appears twice in one migration")]
    DuplicateIncoming {
        school_id: i64,
        feature_id: i64,
        end_date: NaiveDate,
    },
    #[error("add-on rows {first} and {second} share the key (school {school_id}, feature {feature_id}, end {end_date})")]
    DuplicateStored {
        first: i64,
        second: i64,
        school_id: i64,
        feature_id: i64,
        end_date: NaiveDate,
    },
}

/// Resolve `incoming` against the stored rows by (school_id, feature_id, end_date).
///
/// A stored row with the same key is updated, anything else is inserted.
/// Writes come back ordered by key so repeated runs produce identical statements.
pub fn merge_addon_upserts(
    existing: &[AddonSubscription],
    incoming: Vec<AddonUpsert>,
) -> Result<Vec<AddonWrite>, AddonMergeError> {
    let mut stored: HashMap<AddonKey, i64> = HashMap::with_capacity(existing.len());
    for row in existing {
        if let Some(first) = stored.insert(row.key(), row.id) {
            return Err(AddonMergeError::DuplicateStored {
                first: first.min(row.id),
                second: first.max(row.id),
                school_id: row.school_id,
                feature_id: row.feature_id,
                end_date: row.end_date,
            });
        }
    }

    let mut wanted: BTreeMap<AddonKey, AddonUpsert> = BTreeMap::new();
    for row in incoming {
        let key = row.key();
        if wanted.insert(key, row).is_some() {
            return Err(AddonMergeError::DuplicateIncoming {
                school_id: key.school_id,
                feature_id: key.feature_id,
                end_date: key.end_date,
            });
        }
    }

    Ok(wanted
        .into_iter()
        .map(|(key, row)| match stored.get(&key) {
            Some(&id) => AddonWrite::Update { id, row },
            None => AddonWrite::Insert(row),
        })
        .collect())
}
