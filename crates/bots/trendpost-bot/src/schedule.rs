//! Daily trigger times.
//!
//! Post times are configured as local wall-clock times together with a fixed
//! hour offset from UTC. They are converted to UTC once at startup; the
//! [`Schedule`] then fires each trigger at most once per UTC day.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use snafu::{ResultExt, Snafu};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time, UtcOffset};

/// Zero-padded 24 hour `HH:MM`, used both for parsing and display.
const HOUR_MINUTE: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

#[derive(Debug, Snafu)]
pub enum LocalTimeParseError {
    #[snafu(display("Expected a time formatted as HH:MM, got `{input}`: {source}"))]
    Parse {
        input: String,
        source: time::error::Parse,
    },
}

/// A wall-clock time of day in the configured local timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalTime(Time);

impl FromStr for LocalTime {
    type Err = LocalTimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Time::parse(s, HOUR_MINUTE)
            .map(Self)
            .context(ParseSnafu { input: s })
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        HourMinute(self.0).fmt(f)
    }
}

/// `HH:MM` rendering of a [`Time`].
pub struct HourMinute(pub Time);

impl fmt::Display for HourMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(HOUR_MINUTE).map_err(|_| fmt::Error)?;
        f.write_str(&formatted)
    }
}

/// UTC time of day matching `local` in a zone `offset_hours` ahead of UTC.
pub fn trigger_time(local: LocalTime, offset_hours: i32) -> Time {
    local.0 - Duration::hours(i64::from(offset_hours))
}

/// Convert local post times into UTC trigger times.
///
/// `trigger = local - offset_hours`, wrapped into a 24 hour day. The result is
/// sorted and free of duplicates.
pub fn compute_trigger_times(local_times: &[LocalTime], offset_hours: i32) -> Vec<Time> {
    let mut triggers: Vec<Time> = local_times
        .iter()
        .map(|&local| trigger_time(local, offset_hours))
        .collect();
    triggers.sort_unstable();
    triggers.dedup();
    triggers
}

/// Tracks which UTC trigger times have already fired today.
#[derive(Debug, Clone)]
pub struct Schedule {
    triggers: Vec<Time>,
    last_fired: HashMap<Time, Date>,
}

impl Schedule {
    pub fn new(triggers: Vec<Time>) -> Self {
        Self {
            triggers,
            last_fired: HashMap::new(),
        }
    }

    pub fn from_local_times(local_times: &[LocalTime], offset_hours: i32) -> Self {
        Self::new(compute_trigger_times(local_times, offset_hours))
    }

    pub fn triggers(&self) -> &[Time] {
        &self.triggers
    }

    /// Returns `true` when `now` falls in the minute of a trigger that has not
    /// fired yet on `now`'s UTC date, and records it as fired.
    pub fn poll(&mut self, now: OffsetDateTime) -> bool {
        let now = now.to_offset(UtcOffset::UTC);
        let Ok(minute) = Time::from_hms(now.hour(), now.minute(), 0) else {
            return false;
        };

        if !self.triggers.contains(&minute) {
            return false;
        }

        let today = now.date();
        if self.last_fired.get(&minute) == Some(&today) {
            return false;
        }

        self.last_fired.insert(minute, today);
        true
    }

    /// The next moment strictly after `now` at which a trigger is due.
    pub fn next_due(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        let now = now.to_offset(UtcOffset::UTC);
        self.triggers
            .iter()
            .map(|&trigger| {
                let candidate = now.replace_time(trigger);
                if candidate <= now {
                    candidate + Duration::DAY
                } else {
                    candidate
                }
            })
            .min()
    }
}
