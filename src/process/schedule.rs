use crate::config::{self, keys, ConfigProvider};
use crate::error::Result;
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// Source of the local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Time of day of the daily restart, at minute precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartTime {
    hour: u32,
    minute: u32,
}

impl RestartTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Whether `now` falls in this exact minute
    pub fn matches(&self, now: &NaiveDateTime) -> bool {
        now.hour() == self.hour && now.minute() == self.minute
    }
}

impl FromStr for RestartTime {
    type Err = String;

    /// Parse `HH:MM`, two digits each
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err("expected HH:MM".to_string());
        }

        let digits = |part: &str| -> std::result::Result<u32, String> {
            if part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse::<u32>().map_err(|e| e.to_string())
            } else {
                Err("expected HH:MM".to_string())
            }
        };

        let hour = digits(&s[0..2])?;
        let minute = digits(&s[3..5])?;

        Self::new(hour, minute).ok_or_else(|| "time of day out of range".to_string())
    }
}

impl fmt::Display for RestartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// When the next restart is due
///
/// A restart fires at most once per calendar day: only during the minute
/// matching `time_of_day`, and only on a date different from the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartSchedule {
    time_of_day: RestartTime,
    last_restart_date: NaiveDate,
}

impl RestartSchedule {
    /// A schedule whose last restart is `today`, so nothing fires before
    /// tomorrow
    pub fn new(time_of_day: RestartTime, today: NaiveDate) -> Self {
        Self {
            time_of_day,
            last_restart_date: today,
        }
    }

    /// Read `TIME_WHEN_REBOOT` from the provider
    pub fn load_time(provider: &dyn ConfigProvider) -> Result<RestartTime> {
        config::require_parsed(provider, keys::TIME_WHEN_REBOOT)
    }

    pub fn time_of_day(&self) -> RestartTime {
        self.time_of_day
    }

    pub fn last_restart_date(&self) -> NaiveDate {
        self.last_restart_date
    }

    pub fn is_due(&self, now: &NaiveDateTime) -> bool {
        now.date() != self.last_restart_date && self.time_of_day.matches(now)
    }

    pub fn mark_restarted(&mut self, date: NaiveDate) {
        self.last_restart_date = date;
    }

    /// Replace the time of day, keeping the last restart date
    pub fn set_time_of_day(&mut self, time_of_day: RestartTime) {
        self.time_of_day = time_of_day;
    }
}
