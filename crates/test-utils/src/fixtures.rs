//! Common test fixtures for hypothetic tests.

use chrono::{DateTime, TimeZone, Utc};
use hypothetic_common::ScheduleDescription;

/// A UTC instant at `hour:30` on the given day.
pub fn fixed_time(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 30, 0)
        .single()
        .expect("valid fixed time")
}

/// Common model run schedules.
pub mod schedules {
    use super::ScheduleDescription;

    /// Four runs a day (00, 06, 12, 18Z), one run retained
    pub const SIX_HOURLY_ONE_RUN: ScheduleDescription = ScheduleDescription {
        interval_seconds: 21600,
        model_start_offset_seconds: 0,
        retention_seconds: 21600,
    };

    /// Four runs a day, a full day retained
    pub const SIX_HOURLY_ONE_DAY: ScheduleDescription = ScheduleDescription {
        interval_seconds: 21600,
        model_start_offset_seconds: 0,
        retention_seconds: 86400,
    };

    /// Hourly runs, three retained
    pub const HOURLY_THREE_RUNS: ScheduleDescription = ScheduleDescription {
        interval_seconds: 3600,
        model_start_offset_seconds: 0,
        retention_seconds: 3 * 3600,
    };
}

/// Template dimensions of the small test cubes.
pub const GRID_DIMS: [(&str, usize); 2] = [("latitude", 2), ("longitude", 3)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedules_are_valid() {
        for s in [
            schedules::SIX_HOURLY_ONE_RUN,
            schedules::SIX_HOURLY_ONE_DAY,
            schedules::HOURLY_THREE_RUNS,
        ] {
            s.validate().unwrap();
        }
    }

    #[test]
    fn test_fixed_time() {
        let t = fixed_time(2024, 1, 15, 14);
        assert_eq!(t.to_rfc3339(), "2024-01-15T14:30:00+00:00");
    }
}
