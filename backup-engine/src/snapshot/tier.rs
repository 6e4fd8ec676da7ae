//! Backup tiers and their naming and timing rules.

use crate::EngineError;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hourly,
    Daily,
    Weekly,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hourly, Tier::Daily, Tier::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hourly => "hourly",
            Tier::Daily => "daily",
            Tier::Weekly => "weekly",
        }
    }

    /// Directory name of a snapshot started at `at`
    pub fn snapshot_name<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        match self {
            Tier::Hourly => at.format("%Y-%m-%d_%H.%M.%S").to_string(),
            Tier::Daily | Tier::Weekly => at.format("%Y-%m-%d").to_string(),
        }
    }

    /// Whether a trigger firing at local time `at` should actually back up
    pub fn is_due<Tz: TimeZone>(&self, at: &DateTime<Tz>, window: &DueWindow) -> bool {
        match self {
            Tier::Hourly => (window.hourly_start_hour..=window.hourly_end_hour).contains(&at.hour()),
            Tier::Daily => true,
            Tier::Weekly => at.weekday() == window.weekly_day,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" => Ok(Tier::Hourly),
            "daily" => Ok(Tier::Daily),
            "weekly" => Ok(Tier::Weekly),
            other => Err(EngineError::Config(format!("unknown tier: {other}"))),
        }
    }
}

/// When scheduled triggers are honoured, in local time.
#[derive(Debug, Clone)]
pub struct DueWindow {
    /// First hour (inclusive) hourly backups run
    pub hourly_start_hour: u32,
    /// Last hour (inclusive) hourly backups run
    pub hourly_end_hour: u32,
    pub weekly_day: Weekday,
}

impl Default for DueWindow {
    fn default() -> Self {
        Self {
            hourly_start_hour: 14,
            hourly_end_hour: 21,
            weekly_day: Weekday::Sun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn msk(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
    }

    #[test]
    fn test_snapshot_names() {
        let at = msk(2024, 3, 9, 15, 4, 5);
        assert_eq!(Tier::Hourly.snapshot_name(&at), "2024-03-09_15.04.05");
        assert_eq!(Tier::Daily.snapshot_name(&at), "2024-03-09");
        assert_eq!(Tier::Weekly.snapshot_name(&at), "2024-03-09");
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("hourly".parse::<Tier>().unwrap(), Tier::Hourly);
        assert_eq!("Weekly".parse::<Tier>().unwrap(), Tier::Weekly);
        assert!("monthly".parse::<Tier>().is_err());
        assert_eq!(Tier::Daily.to_string(), "daily");
        assert_eq!(serde_json::to_string(&Tier::Hourly).unwrap(), "\"hourly\"");
    }

    #[test]
    fn test_is_due() {
        let window = DueWindow::default();
        // 2024-03-10 is a Sunday
        assert!(Tier::Hourly.is_due(&msk(2024, 3, 9, 14, 0, 0), &window));
        assert!(Tier::Hourly.is_due(&msk(2024, 3, 9, 21, 59, 0), &window));
        assert!(!Tier::Hourly.is_due(&msk(2024, 3, 9, 13, 59, 0), &window));
        assert!(!Tier::Hourly.is_due(&msk(2024, 3, 9, 22, 0, 0), &window));
        assert!(Tier::Daily.is_due(&msk(2024, 3, 9, 2, 0, 0), &window));
        assert!(Tier::Weekly.is_due(&msk(2024, 3, 10, 2, 0, 0), &window));
        assert!(!Tier::Weekly.is_due(&msk(2024, 3, 9, 2, 0, 0), &window));
    }
}
