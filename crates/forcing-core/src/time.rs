//! Valid-time arithmetic for model runs.

use std::fmt;

use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Compact date format used throughout the forcing tree.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// The real-world date and hour a forecast field describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidTime {
    pub date: NaiveDate,
    /// Hour of day, always in `0..24`
    pub hour: u32,
}

impl ValidTime {
    /// `YYYYMMDDHH`
    pub fn compact(&self) -> String {
        format!("{}{:02}", self.date.format(DATE_FORMAT), self.hour)
    }
}

impl fmt::Display for ValidTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{:02}Z", self.date.format("%Y-%m-%d"), self.hour)
    }
}

/// Combine a model run and a forecast offset into a valid time.
///
/// `init_hour + forecast_hour` is reduced modulo 24 and the date advances by
/// the number of whole days crossed, rolling over month and year ends.
/// Returns `None` only when the resulting date leaves chrono's range.
pub fn compute_valid_time(date: NaiveDate, init_hour: u32, forecast_hour: u32) -> Option<ValidTime> {
    let raw = u64::from(init_hour) + u64::from(forecast_hour);
    let days_ahead = raw / 24;
    let hour = (raw % 24) as u32;
    let date = date.checked_add_days(Days::new(days_ahead))?;
    Some(ValidTime { date, hour })
}

/// One model run: the date and UTC hour a forecast was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelRun {
    pub date: NaiveDate,
    pub init_hour: u32,
}

impl ModelRun {
    pub fn new(date: NaiveDate, init_hour: u32) -> Self {
        Self { date, init_hour }
    }

    /// Model-run partition name: `YYYYMMDDHH`.
    pub fn subdirectory(&self) -> String {
        format!("{}{:02}", self.date.format(DATE_FORMAT), self.init_hour)
    }

    /// Parse a `YYYYMMDDHH` partition name.
    pub fn from_subdirectory(name: &str) -> Option<Self> {
        if name.len() != 10 || !name.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(&name[..8], DATE_FORMAT).ok()?;
        let init_hour: u32 = name[8..].parse().ok()?;
        (init_hour < 24).then_some(Self { date, init_hour })
    }

    /// The run `interval_hours` earlier, crossing back over midnight when needed.
    pub fn previous(&self, interval_hours: u32) -> Option<Self> {
        let time = NaiveTime::from_hms_opt(self.init_hour, 0, 0)?;
        let start = NaiveDateTime::new(self.date, time);
        let earlier = start.checked_sub_signed(Duration::hours(i64::from(interval_hours)))?;
        Some(Self {
            date: earlier.date(),
            init_hour: earlier.hour(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_valid_time_same_day() {
        let vt = compute_valid_time(ymd(2023, 6, 15), 12, 6).unwrap();
        assert_eq!(vt.date, ymd(2023, 6, 15));
        assert_eq!(vt.hour, 18);
    }

    #[test]
    fn test_valid_time_rollover() {
        let vt = compute_valid_time(ymd(2023, 6, 15), 23, 4).unwrap();
        assert_eq!(vt.date, ymd(2023, 6, 16));
        assert_eq!(vt.hour, 3);
    }

    #[test]
    fn test_valid_time_month_and_year_rollover() {
        let vt = compute_valid_time(ymd(2023, 1, 31), 18, 6).unwrap();
        assert_eq!(vt.date, ymd(2023, 2, 1));
        assert_eq!(vt.hour, 0);

        let vt = compute_valid_time(ymd(2023, 12, 31), 23, 1).unwrap();
        assert_eq!(vt.date, ymd(2024, 1, 1));
        assert_eq!(vt.hour, 0);
    }

    #[test]
    fn test_valid_time_leap_day() {
        let vt = compute_valid_time(ymd(2024, 2, 28), 12, 12).unwrap();
        assert_eq!(vt.date, ymd(2024, 2, 29));
    }

    #[test]
    fn test_valid_time_zero_hour() {
        let vt = compute_valid_time(ymd(2023, 6, 15), 0, 0).unwrap();
        assert_eq!(vt.date, ymd(2023, 6, 15));
        assert_eq!(vt.hour, 0);
    }

    #[test]
    fn test_valid_time_long_range() {
        // GFS 384h from 18Z is 16 days and 18 hours later
        let vt = compute_valid_time(ymd(2023, 6, 15), 18, 384).unwrap();
        assert_eq!(vt.date, ymd(2023, 7, 2));
        assert_eq!(vt.hour, 18);
    }

    #[test]
    fn test_valid_time_properties_hold_over_full_range() {
        let date = ymd(2023, 12, 20);
        for init_hour in 0..24 {
            for forecast_hour in 0..=384 {
                let vt = compute_valid_time(date, init_hour, forecast_hour).unwrap();
                assert!(vt.hour < 24);
                let days = (vt.date - date).num_days();
                assert_eq!(days, i64::from((init_hour + forecast_hour) / 24));
            }
        }
    }

    #[test]
    fn test_valid_time_compact() {
        let vt = ValidTime { date: ymd(2023, 6, 5), hour: 7 };
        assert_eq!(vt.compact(), "2023060507");
        assert_eq!(vt.to_string(), "2023-06-05T07Z");
    }

    #[test]
    fn test_model_run_subdirectory_round_trip() {
        let run = ModelRun::new(ymd(2015, 7, 23), 9);
        assert_eq!(run.subdirectory(), "2015072309");
        assert_eq!(ModelRun::from_subdirectory("2015072309"), Some(run));
    }

    #[test]
    fn test_model_run_rejects_bad_subdirectory() {
        assert_eq!(ModelRun::from_subdirectory("2015072324"), None);
        assert_eq!(ModelRun::from_subdirectory("20150723"), None);
        assert_eq!(ModelRun::from_subdirectory("2015133109"), None);
        assert_eq!(ModelRun::from_subdirectory("201507230x"), None);
    }

    #[test]
    fn test_model_run_previous() {
        let run = ModelRun::new(ymd(2023, 6, 15), 6);
        assert_eq!(run.previous(1), Some(ModelRun::new(ymd(2023, 6, 15), 5)));
        assert_eq!(run.previous(6), Some(ModelRun::new(ymd(2023, 6, 15), 0)));

        let midnight = ModelRun::new(ymd(2023, 1, 1), 0);
        assert_eq!(midnight.previous(1), Some(ModelRun::new(ymd(2022, 12, 31), 23)));
        assert_eq!(midnight.previous(6), Some(ModelRun::new(ymd(2022, 12, 31), 18)));
    }
}
