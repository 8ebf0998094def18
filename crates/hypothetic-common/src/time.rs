//! Forecast reference time windows.
//!
//! A model that runs on a fixed cycle (e.g. every 6 hours starting at 00Z)
//! publishes one set of files per run. Given the cycle and how long runs are
//! retained, [`generate_reference_times`] yields the reference times of every
//! run that should still exist, newest first.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HypotheticError, HypotheticResult};

pub const SECONDS_IN_HOUR: u32 = 60 * 60;
pub const SECONDS_IN_DAY: u32 = 60 * 60 * 24;

/// Format used for every generated reference time.
pub const REFERENCE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Cyclic model run schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDescription {
    /// Seconds between consecutive model runs
    pub interval_seconds: u32,
    /// Offset of the first run of the day from 00Z
    #[serde(default)]
    pub model_start_offset_seconds: u32,
    /// How far back runs are kept
    pub retention_seconds: u32,
}

impl ScheduleDescription {
    pub fn new(interval_seconds: u32, model_start_offset_seconds: u32, retention_seconds: u32) -> Self {
        Self {
            interval_seconds,
            model_start_offset_seconds,
            retention_seconds,
        }
    }

    /// Validate the schedule.
    pub fn validate(&self) -> HypotheticResult<()> {
        if self.interval_seconds == 0 {
            return Err(malformed("interval_seconds must be > 0"));
        }
        if SECONDS_IN_DAY % self.interval_seconds != 0 {
            return Err(malformed(format!(
                "interval_seconds {} does not divide evenly into one day",
                self.interval_seconds
            )));
        }
        if self.interval_seconds % SECONDS_IN_HOUR != 0 {
            return Err(malformed(format!(
                "interval_seconds {} is not a whole number of hours",
                self.interval_seconds
            )));
        }
        if self.model_start_offset_seconds % SECONDS_IN_HOUR != 0 {
            return Err(malformed(format!(
                "model_start_offset_seconds {} is not a whole number of hours",
                self.model_start_offset_seconds
            )));
        }
        if self.model_start_offset_seconds >= SECONDS_IN_DAY {
            return Err(malformed(format!(
                "model_start_offset_seconds {} is not within one day",
                self.model_start_offset_seconds
            )));
        }
        if self.retention_seconds < self.interval_seconds {
            return Err(malformed(format!(
                "retention_seconds {} is shorter than interval_seconds {}",
                self.retention_seconds, self.interval_seconds
            )));
        }
        Ok(())
    }

    pub fn runs_per_day(&self) -> u32 {
        SECONDS_IN_DAY / self.interval_seconds
    }

    /// Hours of the day at which the model runs, ascending.
    ///
    /// Runs pushed past midnight by the start offset belong to the next day
    /// and are not listed.
    pub fn run_hours(&self) -> Vec<u32> {
        let start = self.model_start_offset_seconds / SECONDS_IN_HOUR;
        let step = self.interval_seconds / SECONDS_IN_HOUR;
        (0..self.runs_per_day())
            .map(|k| start + step * k)
            .filter(|&h| h < 24)
            .collect()
    }

    /// Number of reference times in the retention window.
    pub fn window_len(&self) -> usize {
        (self.retention_seconds / self.interval_seconds) as usize
    }

    /// Most recent run hour at or before `hour`.
    pub fn last_run_hour(&self, hour: u32) -> HypotheticResult<u32> {
        self.run_hours()
            .into_iter()
            .filter(|&h| h <= hour)
            .max()
            .ok_or_else(|| {
                HypotheticError::configuration(format!(
                    "no model run at or before {:02}:00 (run hours: {:?})",
                    hour,
                    self.run_hours()
                ))
            })
    }
}

fn malformed(msg: impl Into<String>) -> HypotheticError {
    HypotheticError::configuration(format!("malformed schedule description: {}", msg.into()))
}

/// Generate the retention window of reference times relative to now.
///
/// "Now" is the current UTC time, so run hours and the anchor are UTC hours.
pub fn generate_reference_times(schedule: &ScheduleDescription) -> HypotheticResult<ReferenceTimes> {
    generate_reference_times_at(schedule, Utc::now())
}

/// Generate the retention window of reference times relative to `now`.
pub fn generate_reference_times_at(
    schedule: &ScheduleDescription,
    now: DateTime<Utc>,
) -> HypotheticResult<ReferenceTimes> {
    schedule.validate()?;

    let run_hour = schedule.last_run_hour(now.hour())?;
    let anchor = now
        .date_naive()
        .and_hms_opt(run_hour, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| HypotheticError::configuration(format!("invalid run hour {}", run_hour)))?;

    Ok(ReferenceTimes {
        anchor,
        step: Duration::seconds(schedule.interval_seconds as i64),
        count: schedule.window_len(),
    })
}

/// A finite window of reference times walking backwards from an anchor run.
///
/// Values are computed on demand; the window can be iterated any number of
/// times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceTimes {
    anchor: DateTime<Utc>,
    step: Duration,
    count: usize,
}

impl ReferenceTimes {
    /// The newest reference time in the window.
    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> ReferenceTimeIter {
        ReferenceTimeIter {
            anchor: self.anchor,
            step: self.step,
            next: 0,
            count: self.count,
        }
    }

    /// The window as `YYYY-MM-DDTHH:MM:SSZ` strings, newest first.
    pub fn iso_strings(&self) -> impl Iterator<Item = String> {
        self.iter()
            .map(|t| t.format(REFERENCE_TIME_FORMAT).to_string())
    }
}

impl IntoIterator for &ReferenceTimes {
    type Item = DateTime<Utc>;
    type IntoIter = ReferenceTimeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ReferenceTimes`] window.
#[derive(Debug, Clone)]
pub struct ReferenceTimeIter {
    anchor: DateTime<Utc>,
    step: Duration,
    next: usize,
    count: usize,
}

impl Iterator for ReferenceTimeIter {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let t = self.anchor - self.step * self.next as i32;
        self.next += 1;
        Some(t)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ReferenceTimeIter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 17).unwrap()
    }

    #[test]
    fn test_run_hours() {
        let s = ScheduleDescription::new(6 * 3600, 0, 86400);
        assert_eq!(s.runs_per_day(), 4);
        assert_eq!(s.run_hours(), vec![0, 6, 12, 18]);

        let s = ScheduleDescription::new(6 * 3600, 3 * 3600, 86400);
        assert_eq!(s.run_hours(), vec![3, 9, 15, 21]);
    }

    #[test]
    fn test_window_anchored_on_last_run() {
        let s = ScheduleDescription::new(6 * 3600, 0, 86400);
        let times = generate_reference_times_at(&s, at(2024, 1, 15, 14, 42)).unwrap();

        let strings: Vec<String> = times.iso_strings().collect();
        assert_eq!(
            strings,
            vec![
                "2024-01-15T12:00:00Z",
                "2024-01-15T06:00:00Z",
                "2024-01-15T00:00:00Z",
                "2024-01-14T18:00:00Z",
            ]
        );
    }

    #[test]
    fn test_window_is_restartable() {
        let s = ScheduleDescription::new(3 * 3600, 0, 12 * 3600);
        let times = generate_reference_times_at(&s, at(2024, 3, 1, 1, 5)).unwrap();
        let first: Vec<_> = times.iter().collect();
        let second: Vec<_> = times.iter().collect();
        assert_eq!(first, second);
        assert_eq!(times.iter().len(), 4);
    }

    #[test]
    fn test_window_properties_hold_for_every_schedule() {
        let now = at(2024, 7, 4, 23, 59);
        for interval_h in [1u32, 2, 3, 4, 6, 8, 12, 24] {
            for retention_runs in 1u32..=9 {
                let s = ScheduleDescription::new(
                    interval_h * 3600,
                    0,
                    interval_h * 3600 * retention_runs + 1800,
                );
                let times = generate_reference_times_at(&s, now).unwrap();
                let values: Vec<_> = times.iter().collect();

                assert_eq!(values.len(), retention_runs as usize);
                for pair in values.windows(2) {
                    assert!(pair[0] > pair[1]);
                    assert_eq!(pair[0] - pair[1], Duration::hours(interval_h as i64));
                }
                for v in &values {
                    assert_eq!(v.minute(), 0);
                    assert_eq!(v.second(), 0);
                    assert_eq!(v.nanosecond(), 0);
                }
            }
        }
    }

    #[test]
    fn test_single_run_window() {
        let s = ScheduleDescription::new(21600, 0, 21600);
        let times = generate_reference_times_at(&s, at(2024, 1, 15, 7, 0)).unwrap();
        assert_eq!(times.len(), 1);
        assert_eq!(times.iso_strings().next().unwrap(), "2024-01-15T06:00:00Z");
    }

    #[test]
    fn test_hour_before_first_run_fails() {
        let s = ScheduleDescription::new(6 * 3600, 6 * 3600, 86400);
        let err = generate_reference_times_at(&s, at(2024, 1, 15, 2, 0)).unwrap_err();
        assert!(matches!(err, HypotheticError::Configuration(_)));
    }

    #[test]
    fn test_malformed_schedules_rejected() {
        let now = at(2024, 1, 15, 12, 0);
        for s in [
            ScheduleDescription::new(0, 0, 3600),
            ScheduleDescription::new(7 * 3600, 0, 86400),
            ScheduleDescription::new(1800, 0, 86400),
            ScheduleDescription::new(3600, 900, 86400),
            ScheduleDescription::new(6 * 3600, 0, 3600),
            ScheduleDescription::new(6 * 3600, 86400, 86400),
        ] {
            let err = generate_reference_times_at(&s, now).unwrap_err();
            assert!(matches!(err, HypotheticError::Configuration(_)), "{:?}", s);
        }
    }

    #[test]
    fn test_schedule_deserialize_defaults_offset() {
        let s: ScheduleDescription =
            serde_json::from_str(r#"{"interval_seconds": 3600, "retention_seconds": 7200}"#)
                .unwrap();
        assert_eq!(s.model_start_offset_seconds, 0);
    }
}
