//! Exchange session calendar.
//!
//! Bar times encode exchange wall-clock time as UTC epoch seconds, so
//! `2024-01-02 09:31` on the exchange is `2024-01-02T09:31:00Z` here.
//!
//! Sessions run 09:30–11:30 and 13:00–15:00. A minute bar is stamped at the
//! end of its minute (09:31 … 11:30, 13:01 … 15:00); 09:30 and 13:00 stamps are
//! folded into the first minute of their half-session. Trading minutes are
//! numbered 1..=240 across both halves, and an N-minute bucket `k` covers
//! minutes `k*N+1 ..= (k+1)*N`, stamped at the wall time of its last minute.
//!
//! Only weekends are skipped. There is no holiday table: a holiday looks like
//! a trading day with no data.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::resolution::Resolution;

/// Minute-of-day of the morning open (09:30).
pub const MORNING_OPEN: u32 = 9 * 60 + 30;
/// Minute-of-day of the morning close (11:30).
pub const MORNING_CLOSE: u32 = 11 * 60 + 30;
/// Minute-of-day of the afternoon open (13:00).
pub const AFTERNOON_OPEN: u32 = 13 * 60;
/// Minute-of-day of the afternoon close (15:00).
pub const AFTERNOON_CLOSE: u32 = 15 * 60;
/// Trading minutes in one half-session.
pub const HALF_SESSION_MINUTES: u32 = MORNING_CLOSE - MORNING_OPEN;
/// Trading minutes in one day.
pub const SESSION_MINUTES: u32 = 2 * HALF_SESSION_MINUTES;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Inclusive range of minute stamps that aggregate into one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// First minute stamp belonging to the bucket.
    pub start: i64,
    /// Last minute stamp belonging to the bucket.
    pub end: i64,
    /// Time the aggregated bar is stamped with.
    pub stamp: i64,
}

impl Bucket {
    pub fn contains(&self, time: i64) -> bool {
        time >= self.start && time <= self.end
    }
}

pub fn to_naive(time: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(time, 0).map(|dt| dt.naive_utc())
}

pub fn from_naive(naive: NaiveDateTime) -> i64 {
    naive.and_utc().timestamp()
}

pub fn date_of(time: i64) -> Option<NaiveDate> {
    to_naive(time).map(|dt| dt.date())
}

/// Trading date of a bar whose stamp carries `stamp_offset_secs`.
///
/// Daily rows may be shifted off midnight by a fixed UTC correction; calendar
/// arithmetic must see the unshifted stamp.
pub fn bar_date(time: i64, stamp_offset_secs: i64) -> Option<NaiveDate> {
    date_of(time.checked_sub(stamp_offset_secs)?)
}

/// Midnight stamp of `date`.
pub fn day_start(date: NaiveDate) -> i64 {
    from_naive(date.and_time(chrono::NaiveTime::MIN))
}

/// Stamp of `date` at the given minute-of-day.
pub fn at_minute(date: NaiveDate, minute_of_day: u32) -> i64 {
    day_start(date) + i64::from(minute_of_day) * 60
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// First weekday strictly after `date`.
pub fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_trading_day(next) {
        next += Duration::days(1);
    }
    next
}

/// Last weekday strictly before `date`.
pub fn previous_trading_day(date: NaiveDate) -> NaiveDate {
    let mut prev = date - Duration::days(1);
    while !is_trading_day(prev) {
        prev -= Duration::days(1);
    }
    prev
}

fn minute_of_day(naive: NaiveDateTime) -> u32 {
    naive.hour() * 60 + naive.minute()
}

/// Trading-minute number (1..=240) of a minute stamp, or `None` outside the sessions.
pub fn session_minute(time: i64) -> Option<u32> {
    let m = minute_of_day(to_naive(time)?);
    if (MORNING_OPEN..=MORNING_CLOSE).contains(&m) {
        Some((m - MORNING_OPEN).max(1))
    } else if (AFTERNOON_OPEN..=AFTERNOON_CLOSE).contains(&m) {
        Some(HALF_SESSION_MINUTES + (m - AFTERNOON_OPEN).max(1))
    } else {
        None
    }
}

/// Trading minutes completed by wall-clock `time` on its own day (0..=240).
pub fn elapsed_session_minutes(time: i64) -> Option<u32> {
    let m = minute_of_day(to_naive(time)?);
    Some(if m < MORNING_OPEN {
        0
    } else if m <= MORNING_CLOSE {
        m - MORNING_OPEN
    } else if m < AFTERNOON_OPEN {
        HALF_SESSION_MINUTES
    } else if m <= AFTERNOON_CLOSE {
        HALF_SESSION_MINUTES + (m - AFTERNOON_OPEN)
    } else {
        SESSION_MINUTES
    })
}

/// Minute-of-day at which trading minute `index` ends.
pub fn wall_minute(index: u32) -> u32 {
    let index = index.min(SESSION_MINUTES);
    if index <= HALF_SESSION_MINUTES {
        MORNING_OPEN + index
    } else {
        AFTERNOON_OPEN + (index - HALF_SESSION_MINUTES)
    }
}

/// Bucket of an intraday stride `n` (in trading minutes) with index `k` on `date`.
fn intraday_bucket(date: NaiveDate, n: u32, k: u32) -> Bucket {
    let first = k * n + 1;
    let last = ((k + 1) * n).min(SESSION_MINUTES);
    let end = at_minute(date, wall_minute(last));
    Bucket {
        start: at_minute(date, wall_minute(first)),
        end,
        stamp: end,
    }
}

/// The whole-session bucket of `date`, stamped at midnight.
pub fn daily_bucket(date: NaiveDate) -> Bucket {
    Bucket {
        start: at_minute(date, MORNING_OPEN),
        end: at_minute(date, AFTERNOON_CLOSE),
        stamp: day_start(date),
    }
}

/// Bucket that a minute stamp belongs to under `resolution`.
///
/// Daily buckets accept any time on the date. Intraday buckets return `None`
/// for stamps outside the sessions.
pub fn bucket_for(time: i64, resolution: Resolution) -> Option<Bucket> {
    let date = date_of(time)?;
    if resolution.is_daily() {
        return Some(daily_bucket(date));
    }
    let n = resolution.minutes();
    let index = session_minute(time)?;
    Some(intraday_bucket(date, n, (index - 1) / n))
}

/// Theoretical stamp of the bar following `last_time` under `resolution`.
pub fn next_bar_time(last_time: i64, resolution: Resolution) -> Option<i64> {
    let date = date_of(last_time)?;
    if resolution.is_daily() {
        return Some(day_start(next_trading_day(date)));
    }

    let n = resolution.minutes();
    let elapsed = elapsed_session_minutes(last_time)?;
    if !is_trading_day(date) || elapsed >= SESSION_MINUTES {
        return Some(intraday_bucket(next_trading_day(date), n, 0).stamp);
    }
    Some(intraday_bucket(date, n, elapsed / n).stamp)
}

/// Stamp of the bar preceding `time` under `resolution`.
pub fn previous_bar_time(time: i64, resolution: Resolution) -> Option<i64> {
    let date = date_of(time)?;
    if resolution.is_daily() {
        return Some(day_start(previous_trading_day(date)));
    }
    let n = resolution.minutes();
    let index = session_minute(time).unwrap_or(0);
    if index <= n || !is_trading_day(date) {
        let prev = previous_trading_day(date);
        let last_k = (SESSION_MINUTES - 1) / n;
        return Some(intraday_bucket(prev, n, last_k).stamp);
    }
    Some(intraday_bucket(date, n, (index - 1) / n - 1).stamp)
}
