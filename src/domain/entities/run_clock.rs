use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// The single "as of" date a billing run is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    today: NaiveDate,
    yesterday: NaiveDate,
}

impl RunClock {
    /// Returns `None` only for `NaiveDate::MIN`.
    pub fn new(today: NaiveDate) -> Option<Self> {
        let yesterday = today.pred_opt()?;
        Some(Self { today, yesterday })
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn yesterday(&self) -> NaiveDate {
        self.yesterday
    }

    /// Soft-delete timestamp stamped on users disabled by this run.
    pub fn disable_cutoff(&self) -> NaiveDateTime {
        self.yesterday.and_time(NaiveTime::MIN)
    }
}
