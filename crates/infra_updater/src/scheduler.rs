//! Recurring update schedules
//!
//! Schedules are evaluated in UTC. Textual forms, as used in
//! configuration:
//!
//! | form                | meaning                          |
//! |---------------------|----------------------------------|
//! | `daily@02:00`       | every day at 02:00               |
//! | `weekly@sun 03:30`  | every Sunday at 03:30            |
//! | `every 6h`          | every 6 hours (`s`, `m`, `h`, `d`) |

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::data_set::DataSetKind;
use crate::error::UpdaterError;
use crate::manager::UpdaterJobManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { at: NaiveTime },
    Weekly { weekday: Weekday, at: NaiveTime },
    Interval { every: Duration },
}

impl Schedule {
    /// First occurrence strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Daily { at } => {
                let candidate = after.date_naive().and_time(at).and_utc();
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Schedule::Weekly { weekday, at } => {
                let days_ahead = (weekday.num_days_from_monday() + 7
                    - after.weekday().num_days_from_monday())
                    % 7;
                let candidate = after.date_naive().and_time(at).and_utc()
                    + Duration::days(i64::from(days_ahead));
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::weeks(1)
                }
            }
            Schedule::Interval { every } => after.checked_add_signed(every).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Daily { at } => write!(f, "daily@{}", at.format("%H:%M")),
            Schedule::Weekly { weekday, at } => {
                write!(f, "weekly@{} {}", weekday, at.format("%H:%M"))
            }
            Schedule::Interval { every } => write!(f, "every {}s", every.num_seconds()),
        }
    }
}

impl FromStr for Schedule {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UpdaterError::InvalidSchedule(s.to_string());
        let text = s.trim().to_ascii_lowercase();
        let parse_time = |t: &str| NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|_| invalid());

        if let Some(time) = text.strip_prefix("daily@") {
            return Ok(Schedule::Daily { at: parse_time(time)? });
        }
        if let Some(rest) = text.strip_prefix("weekly@") {
            let (day, time) = rest.trim().split_once(' ').ok_or_else(invalid)?;
            let weekday = day.parse::<Weekday>().map_err(|_| invalid())?;
            return Ok(Schedule::Weekly {
                weekday,
                at: parse_time(time)?,
            });
        }
        if let Some(rest) = text.strip_prefix("every ") {
            let rest = rest.trim();
            let split = rest.len().checked_sub(1).ok_or_else(invalid)?;
            if !rest.is_char_boundary(split) {
                return Err(invalid());
            }
            let (amount, unit) = rest.split_at(split);
            let amount: i64 = amount.trim().parse().map_err(|_| invalid())?;
            if amount <= 0 {
                return Err(invalid());
            }
            let every = match unit {
                "s" => Duration::try_seconds(amount),
                "m" => Duration::try_minutes(amount),
                "h" => Duration::try_hours(amount),
                "d" => Duration::try_days(amount),
                _ => return Err(invalid()),
            }
            .ok_or_else(invalid)?;
            return Ok(Schedule::Interval { every });
        }
        Err(invalid())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledUpdate {
    pub data_set: DataSetKind,
    pub schedule: Schedule,
}

/// Starts updater jobs on their schedules until shut down
pub struct RecurringScheduler {
    manager: Arc<UpdaterJobManager>,
    entries: Vec<ScheduledUpdate>,
}

impl RecurringScheduler {
    pub fn new(manager: Arc<UpdaterJobManager>, entries: Vec<ScheduledUpdate>) -> Self {
        Self { manager, entries }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.entries.is_empty() {
            info!("No updater schedules configured");
            return;
        }

        let now = Utc::now();
        let mut next: Vec<DateTime<Utc>> = self
            .entries
            .iter()
            .map(|entry| entry.schedule.next_after(now))
            .collect();
        for (entry, due) in self.entries.iter().zip(&next) {
            info!(data_set = %entry.data_set, schedule = %entry.schedule, next = %due, "Scheduled updater job");
        }

        loop {
            let Some((index, due)) = next
                .iter()
                .copied()
                .enumerate()
                .min_by_key(|(_, due)| *due)
            else {
                return;
            };
            let wait = (due - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Updater scheduler stopped");
                        return;
                    }
                    continue;
                }
            }

            let entry = &self.entries[index];
            match self.manager.start_job(entry.data_set, None).await {
                Ok(job) => info!(job_id = %job.id, data_set = %entry.data_set, "Scheduled updater job started"),
                Err(UpdaterError::JobAlreadyActive { job_id, .. }) => {
                    info!(data_set = %entry.data_set, active = %job_id, "Skipped schedule; job already active")
                }
                Err(e) => error!(data_set = %entry.data_set, error = %e, "Scheduled updater job failed to start"),
            }
            next[index] = entry.schedule.next_after(due.max(Utc::now()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_daily_next_occurrence() {
        let schedule = Schedule::Daily { at: time(2, 0) };
        assert_eq!(schedule.next_after(at(2026, 3, 10, 1, 0)), at(2026, 3, 10, 2, 0));
        assert_eq!(schedule.next_after(at(2026, 3, 10, 2, 0)), at(2026, 3, 11, 2, 0));
        assert_eq!(schedule.next_after(at(2026, 12, 31, 23, 0)), at(2027, 1, 1, 2, 0));
    }

    #[test]
    fn test_weekly_next_occurrence() {
        // 2026-03-10 is a Tuesday
        let schedule = Schedule::Weekly {
            weekday: Weekday::Sun,
            at: time(3, 30),
        };
        assert_eq!(schedule.next_after(at(2026, 3, 10, 12, 0)), at(2026, 3, 15, 3, 30));
        assert_eq!(schedule.next_after(at(2026, 3, 15, 3, 30)), at(2026, 3, 22, 3, 30));
        assert_eq!(schedule.next_after(at(2026, 3, 15, 1, 0)), at(2026, 3, 15, 3, 30));
    }

    #[test]
    fn test_interval_next_occurrence() {
        let schedule = Schedule::Interval {
            every: Duration::hours(6),
        };
        assert_eq!(schedule.next_after(at(2026, 3, 10, 1, 0)), at(2026, 3, 10, 7, 0));
    }

    #[test]
    fn test_parse_schedules() {
        assert_eq!(
            "daily@02:00".parse::<Schedule>().unwrap(),
            Schedule::Daily { at: time(2, 0) }
        );
        assert_eq!(
            "Weekly@SUN 03:30".parse::<Schedule>().unwrap(),
            Schedule::Weekly {
                weekday: Weekday::Sun,
                at: time(3, 30)
            }
        );
        assert_eq!(
            "every 6h".parse::<Schedule>().unwrap(),
            Schedule::Interval {
                every: Duration::hours(6)
            }
        );

        for bad in ["", "daily", "daily@25:00", "weekly@funday 01:00", "every 0h", "every 5y", "every h"] {
            assert!(bad.parse::<Schedule>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_oversized_interval_is_rejected() {
        for huge in [
            format!("every {}d", i64::MAX),
            format!("every {}h", i64::MAX / 2),
            format!("every {}s", i64::MAX),
        ] {
            assert!(
                matches!(huge.parse::<Schedule>(), Err(UpdaterError::InvalidSchedule(_))),
                "{huge} should be rejected"
            );
        }
    }

    #[test]
    fn test_far_interval_never_overflows() {
        let schedule: Schedule = "every 100000000d".parse().unwrap();
        assert_eq!(schedule.next_after(at(2026, 3, 10, 1, 0)), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["daily@02:00", "weekly@Sun 03:30"] {
            let schedule: Schedule = text.parse().unwrap();
            assert_eq!(schedule.to_string().parse::<Schedule>().unwrap(), schedule);
        }
    }
}
