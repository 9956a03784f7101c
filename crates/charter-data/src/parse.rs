//! Conversion of raw source rows into bars.
//!
//! Dates arrive as `YYYY-MM-DD` (daily rows) or `YYYY-MM-DD HH:MM[:SS]`
//! (intraday rows, end-of-minute stamps in exchange time). Numeric epoch
//! strings are also accepted, in seconds or milliseconds.

use charter_core::calendar;
use charter_core::{Bar, Resolution};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::source::RawRow;
use crate::validation::validate_bar;

/// Why a row was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("unparseable date {0:?}")]
    BadDate(String),
    #[error("non-finite price or volume")]
    NonFinite,
    #[error("non-positive price")]
    NonPositivePrice,
    #[error("negative volume {0}")]
    NegativeVolume(f64),
    #[error("inconsistent range: low {low} high {high}")]
    InconsistentRange { low: f64, high: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParseOptions {
    /// Offset added to date-only stamps of non-minute resolutions.
    pub daily_utc_offset_secs: i64,
}

/// Outcome of parsing a batch: accepted bars in time order, plus rejects.
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub bars: Vec<Bar>,
    /// Index into the input slice and the reason.
    pub rejected: Vec<(usize, RowError)>,
}

/// A parsed date string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowDate {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Epoch(i64),
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

pub fn parse_date(s: &str) -> Option<RowDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = s.parse::<f64>() {
        if !ts.is_finite() {
            return None;
        }
        // Milliseconds carry 13+ digits
        let secs = if ts > 1e12 { ts / 1000.0 } else { ts };
        return Some(RowDate::Epoch(secs as i64));
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    {
        return Some(RowDate::DateTime(dt));
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .map(RowDate::Date)
}

/// Bar stamp of a row date under `resolution`.
pub fn row_time(date: RowDate, resolution: Resolution, options: ParseOptions) -> i64 {
    match date {
        RowDate::Date(d) if resolution.is_daily() => {
            calendar::day_start(d) + options.daily_utc_offset_secs
        }
        RowDate::Date(d) => calendar::day_start(d),
        RowDate::DateTime(dt) if resolution.is_daily() && dt.time() == NaiveTime::MIN => {
            calendar::from_naive(dt) + options.daily_utc_offset_secs
        }
        RowDate::DateTime(dt) => calendar::from_naive(dt),
        RowDate::Epoch(secs) => secs,
    }
}

pub fn parse_row(row: &RawRow, resolution: Resolution, options: ParseOptions) -> Result<Bar, RowError> {
    let date = parse_date(&row.date).ok_or_else(|| RowError::BadDate(row.date.clone()))?;
    let bar = Bar::new(
        row_time(date, resolution, options),
        row.open,
        row.high,
        row.low,
        row.close,
        row.volume.unwrap_or(0.0),
    );
    validate_bar(&bar)?;
    Ok(bar)
}

/// Parse a batch of rows, dropping invalid rows individually.
///
/// Accepted bars are sorted by time with duplicate stamps collapsed (last wins).
pub fn parse_rows(rows: &[RawRow], resolution: Resolution, options: ParseOptions) -> ParsedRows {
    let mut parsed = ParsedRows::default();
    for (index, row) in rows.iter().enumerate() {
        match parse_row(row, resolution, options) {
            Ok(bar) => parsed.bars.push(bar),
            Err(err) => {
                log::warn!("Dropping row {} ({:?}): {}", index, row.date, err);
                parsed.rejected.push((index, err));
            }
        }
    }

    // Stable sort keeps source order among equal stamps, so the later row wins
    parsed.bars.sort_by_key(|b| b.time);
    let mut deduped: Vec<Bar> = Vec::with_capacity(parsed.bars.len());
    for bar in parsed.bars.drain(..) {
        match deduped.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            _ => deduped.push(bar),
        }
    }
    parsed.bars = deduped;
    parsed
}

/// Format a bar stamp the way sources deliver it.
pub fn format_time(time: i64, resolution: Resolution) -> String {
    let Some(dt) = calendar::to_naive(time) else {
        return time.to_string();
    };
    if resolution.is_daily() {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, open: f64, high: f64, low: f64, close: f64) -> RawRow {
        RawRow::new(date, open, high, low, close, 100.0)
    }

    #[test]
    fn test_parse_date_forms() {
        assert!(matches!(parse_date("2024-01-02"), Some(RowDate::Date(_))));
        assert!(matches!(parse_date("2024-01-02 09:31:00"), Some(RowDate::DateTime(_))));
        assert!(matches!(parse_date("2024-01-02 09:31"), Some(RowDate::DateTime(_))));
        assert_eq!(parse_date("1704189060000"), Some(RowDate::Epoch(1704189060)));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_offset_applies_to_daily_date_only_rows() {
        let options = ParseOptions { daily_utc_offset_secs: -8 * 3600 };
        let daily = parse_row(&row("2024-01-02", 10.0, 11.0, 9.0, 10.5), Resolution::Daily, options).unwrap();
        assert_eq!(daily.time, 1704153600 - 8 * 3600);

        let minute = parse_row(
            &row("2024-01-02 09:31:00", 10.0, 11.0, 9.0, 10.5),
            Resolution::Min1,
            options,
        )
        .unwrap();
        assert_eq!(minute.time, 1704153600 + 9 * 3600 + 31 * 60);

        let midnight = parse_row(
            &row("2024-01-02 00:00:00", 10.0, 11.0, 9.0, 10.5),
            Resolution::Daily,
            options,
        )
        .unwrap();
        assert_eq!(midnight.time, daily.time);
    }

    #[test]
    fn test_parse_rows_drops_bad_rows_individually() {
        let rows = vec![
            row("2024-01-03", 10.0, 11.0, 9.0, 10.5),
            row("garbage", 10.0, 11.0, 9.0, 10.5),
            row("2024-01-02", 10.0, 9.0, 11.0, 10.5),
            row("2024-01-02", 10.0, 11.0, 9.0, 10.2),
        ];
        let parsed = parse_rows(&rows, Resolution::Daily, ParseOptions::default());
        assert_eq!(parsed.bars.len(), 2);
        assert!(parsed.bars[0].time < parsed.bars[1].time);
        assert_eq!(parsed.rejected.len(), 2);
        assert_eq!(parsed.rejected[0].0, 1);
    }

    #[test]
    fn test_parse_rows_duplicate_stamp_last_wins() {
        let rows = vec![
            row("2024-01-02", 10.0, 11.0, 9.0, 10.5),
            row("2024-01-02", 10.0, 12.0, 9.0, 11.5),
        ];
        let parsed = parse_rows(&rows, Resolution::Daily, ParseOptions::default());
        assert_eq!(parsed.bars.len(), 1);
        assert_eq!(parsed.bars[0].close, 11.5);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(1704153600, Resolution::Daily), "2024-01-02");
        assert_eq!(
            format_time(1704153600 + 9 * 3600 + 31 * 60, Resolution::Min1),
            "2024-01-02 09:31:00"
        );
    }
}
