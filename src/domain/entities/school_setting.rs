use serde::Serialize;

/// School setting that gates automatic regeneration of the next cycle.
pub const AUTO_RENEWAL_PLAN: &str = "auto_renewal_plan";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolSetting {
    pub id: i64,
    pub school_id: i64,
    pub name: String,
    pub data: String,
}

impl SchoolSetting {
    /// Settings store flags as the strings "1" / "0".
    pub fn is_enabled(&self) -> bool {
        self.data.trim() == "1"
    }
}

/// Global billing knobs read once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemSettings {
    /// Grace days added to a bill's due date before it counts as unclear.
    pub additional_billing_days: i64,
    pub billing_cycle_in_days: i64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            additional_billing_days: 0,
            billing_cycle_in_days: 30,
        }
    }
}

impl SystemSettings {
    pub const ADDITIONAL_BILLING_DAYS: &'static str = "additional_billing_days";
    pub const BILLING_CYCLE_IN_DAYS: &'static str = "billing_cycle_in_days";

    /// Build from raw `(name, data)` rows; unparsable or negative values keep the default.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut settings = Self::default();
        for (name, data) in rows {
            let Ok(value) = data.trim().parse::<i64>() else {
                tracing::warn!(setting = name, value = data, "Ignoring non-numeric system setting");
                continue;
            };
            match name {
                Self::ADDITIONAL_BILLING_DAYS if value >= 0 => {
                    settings.additional_billing_days = value
                }
                Self::BILLING_CYCLE_IN_DAYS if value > 0 => settings.billing_cycle_in_days = value,
                _ => {}
            }
        }
        settings
    }
}
