//! Timezone-aware calendar types.
//!
//! Day-ahead prices are keyed by *local* civil day, which does not line up
//! with UTC days and occasionally has 23 or 25 hours. Everything here is
//! value-typed and derived from a single absolute instant so the civil
//! fields can never drift out of sync with the epoch seconds.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Offset, Timelike, Utc};
use chrono_tz::Tz;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Sentinel returned by [`LocalDay::days_after`] for unrepresentable dates.
pub const DAYS_AFTER_SENTINEL: i64 = 9999;

/// An absolute point in time, seconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcTime(i64);

impl UtcTime {
    pub fn now() -> Self {
        UtcTime(Utc::now().timestamp())
    }

    pub const fn from_unix(seconds: i64) -> Self {
        UtcTime(seconds)
    }

    pub const fn unix(self) -> i64 {
        self.0
    }

    pub const fn plus_seconds(self, seconds: i64) -> Self {
        UtcTime(self.0 + seconds)
    }

    pub const fn plus_hours(self, hours: i64) -> Self {
        self.plus_seconds(hours * 60 * 60)
    }

    fn civil(self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    pub fn year(self) -> i32 {
        self.civil().year()
    }

    pub fn month(self) -> u32 {
        self.civil().month()
    }

    pub fn day(self) -> u32 {
        self.civil().day()
    }

    pub fn hour(self) -> u32 {
        self.civil().hour()
    }

    pub fn minute(self) -> u32 {
        self.civil().minute()
    }

    pub fn second(self) -> u32 {
        self.civil().second()
    }
}

const MONTHS: [&str; 12] = [
    "januar",
    "februar",
    "mars",
    "april",
    "mai",
    "juni",
    "juli",
    "august",
    "september",
    "oktober",
    "november",
    "desember",
];

/// A civil calendar date in the configured timezone, independent of UTC
/// offset changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDay {
    year: i32,
    month: u32,
    day: u32,
}

impl LocalDay {
    /// Sentinel "never cached" day used by the scheduler's trackers.
    pub const EPOCH: LocalDay = LocalDay {
        year: 1970,
        month: 1,
        day: 1,
    };

    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        LocalDay { year, month, day }
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    pub const fn day(self) -> u32 {
        self.day
    }

    /// Dense integer encoding `year*10000 + month*100 + day`. Injective for
    /// civil dates, so it is safe as a cache key and in provider URLs.
    pub const fn key(self) -> u32 {
        self.year as u32 * 10_000 + self.month * 100 + self.day
    }

    /// Civil-day difference `self - other`, computed on day numbers rather
    /// than UTC seconds so DST transitions cannot skew the result. Returns
    /// `-9999`/`9999` when either date is unrepresentable.
    pub fn days_after(self, other: LocalDay) -> i64 {
        let Some(this) = NaiveDate::from_ymd_opt(self.year, self.month, self.day) else {
            return -DAYS_AFTER_SENTINEL;
        };
        let Some(other) = NaiveDate::from_ymd_opt(other.year, other.month, other.day) else {
            return DAYS_AFTER_SENTINEL;
        };
        (this - other).num_days()
    }
}

impl fmt::Display for LocalDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let month = MONTHS[(self.month as usize - 1) % MONTHS.len()];
        write!(f, "{}.{} {}", self.day, month, self.year)
    }
}

/// A [`LocalDay`] plus a local time of day. Composition rather than
/// inheritance: the day is reachable through [`LocalTime::day`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    day: LocalDay,
    hour: u32,
    minute: u32,
    second: u32,
}

impl LocalTime {
    pub const fn day(self) -> LocalDay {
        self.day
    }

    pub const fn hour(self) -> u32 {
        self.hour
    }

    pub const fn minute(self) -> u32 {
        self.minute
    }

    pub const fn second(self) -> u32 {
        self.second
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}.{:02} {}",
            self.hour, self.minute, self.second, self.day
        )
    }
}

/// How UTC instants map to local wall-clock time.
#[derive(Debug, Clone, Copy)]
pub enum TimeRule {
    /// Central European Time with the EU daylight rule evaluated directly:
    /// +2h from the last Sunday of March 01:00 UTC until the last Sunday of
    /// October 01:00 UTC, +1h otherwise. Host-independent and stable for
    /// historical fixtures.
    FixedCet,
    /// IANA timezone rules via chrono-tz.
    Named(Tz),
}

/// Converts between absolute instants and local civil days/times.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    rule: TimeRule,
}

impl Calendar {
    pub const fn new(rule: TimeRule) -> Self {
        Calendar { rule }
    }

    pub fn now(&self) -> UtcTime {
        UtcTime::now()
    }

    /// UTC offset in seconds in force at `instant`.
    pub fn offset_seconds(&self, instant: UtcTime) -> i64 {
        match self.rule {
            TimeRule::FixedCet => {
                let year = instant.year();
                let dst_start = dst_boundary(year, 3);
                let dst_end = dst_boundary(year, 10);
                if instant < dst_start || instant >= dst_end {
                    3600
                } else {
                    7200
                }
            }
            TimeRule::Named(tz) => {
                let local = instant.civil().with_timezone(&tz);
                i64::from(local.offset().fix().local_minus_utc())
            }
        }
    }

    pub fn local_time(&self, instant: UtcTime) -> LocalTime {
        let shifted = instant.plus_seconds(self.offset_seconds(instant));
        LocalTime {
            day: LocalDay::new(shifted.year(), shifted.month(), shifted.day()),
            hour: shifted.hour(),
            minute: shifted.minute(),
            second: shifted.second(),
        }
    }

    pub fn local_day(&self, instant: UtcTime) -> LocalDay {
        self.local_time(instant).day()
    }

    /// Adds `days` calendar days, preserving the local wall-clock time even
    /// when the UTC offset changes in between: first the naive 24h step,
    /// then a correction by the origin/destination offset delta.
    pub fn add_local_days(&self, instant: UtcTime, days: i64) -> UtcTime {
        let naive = instant.plus_seconds(days * SECONDS_PER_DAY);
        naive.plus_seconds(self.offset_seconds(instant) - self.offset_seconds(naive))
    }

    pub fn is_today(&self, day: LocalDay) -> bool {
        day == self.local_day(self.now())
    }

    pub fn is_tomorrow(&self, day: LocalDay) -> bool {
        day == self.local_day(self.add_local_days(self.now(), 1))
    }

    /// The instant at which `day` reads the given local wall-clock time.
    /// Not meaningful for wall-clock times inside a DST transition; the
    /// scheduler only asks for gate and midnight times, which never are.
    pub fn instant_at(&self, day: LocalDay, hour: u32, minute: u32, second: u32) -> UtcTime {
        let naive = NaiveDate::from_ymd_opt(day.year(), day.month(), day.day())
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        let guess = UtcTime::from_unix(naive);
        guess.plus_seconds(-self.offset_seconds(guess))
    }
}

fn dst_boundary(year: i32, month: u32) -> UtcTime {
    // March and October both have 31 days.
    let day = last_sunday(year, month);
    let seconds = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(1, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default();
    UtcTime::from_unix(seconds)
}

fn last_sunday(year: i32, month: u32) -> u32 {
    match NaiveDate::from_ymd_opt(year, month, 31) {
        Some(last) => 31 - last.weekday().num_days_from_sunday(),
        None => 31,
    }
}
