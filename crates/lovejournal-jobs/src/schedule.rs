//! Declarative job schedules.
//!
//! Accepted forms (case-insensitive, UTC):
//! - `every day HH:MM`
//! - `every N hours` / `every hour`
//! - `every N minutes` / `every minute`
//!
//! Interval schedules are aligned to the Unix epoch, so `every 6 hours`
//! fires at 00:00, 06:00, 12:00 and 18:00.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

use lovejournal_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at a fixed UTC wall-clock time.
    Daily { hour: u32, minute: u32 },
    /// Every `seconds`, aligned to the epoch.
    Interval { seconds: i64 },
}

impl Schedule {
    pub fn every_hours(n: u32) -> Self {
        Schedule::Interval {
            seconds: i64::from(n.max(1)) * 3600,
        }
    }

    pub fn every_minutes(n: u32) -> Self {
        Schedule::Interval {
            seconds: i64::from(n.max(1)) * 60,
        }
    }

    pub fn daily_at(hour: u32, minute: u32) -> Result<Self, Error> {
        if hour > 23 || minute > 59 {
            return Err(Error::Config(format!(
                "invalid time of day {hour:02}:{minute:02}"
            )));
        }
        Ok(Schedule::Daily { hour, minute })
    }

    /// Next fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Daily { hour, minute } => {
                // Validated on construction.
                let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
                let today = Utc.from_utc_datetime(&after.date_naive().and_time(at));
                if today > after {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Schedule::Interval { seconds } => {
                let step = seconds.max(1);
                let slot = after.timestamp().div_euclid(step) + 1;
                Utc.timestamp_opt(slot * step, 0)
                    .single()
                    .unwrap_or(after + Duration::seconds(step))
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Schedule::Daily { hour, minute } => write!(f, "every day {hour:02}:{minute:02}"),
            Schedule::Interval { seconds } if seconds % 3600 == 0 => {
                write!(f, "every {} hours", seconds / 3600)
            }
            Schedule::Interval { seconds } => write!(f, "every {} minutes", seconds / 60),
        }
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let invalid = || Error::Config(format!("invalid schedule: {s:?}"));

        match words.as_slice() {
            ["every", "day", time] => {
                let (h, m) = time.split_once(':').ok_or_else(invalid)?;
                let hour = h.parse::<u32>().map_err(|_| invalid())?;
                let minute = m.parse::<u32>().map_err(|_| invalid())?;
                Schedule::daily_at(hour, minute)
            }
            ["every", "hour"] => Ok(Schedule::every_hours(1)),
            ["every", "minute"] => Ok(Schedule::every_minutes(1)),
            ["every", n, unit] => {
                let n = n.parse::<u32>().map_err(|_| invalid())?;
                if n == 0 {
                    return Err(invalid());
                }
                match *unit {
                    "hour" | "hours" => Ok(Schedule::every_hours(n)),
                    "minute" | "minutes" => Ok(Schedule::every_minutes(n)),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }
}
