//! Local CSV data source.
//!
//! Files live at `{root}/{year}/{MARKET}.{code}.csv`, one per symbol and year,
//! with columns date, code, open, high, low, close, volume (lots), amount.
//! Columns are matched by header name, falling back to that order when the
//! header is not UTF-8.

use std::path::{Path, PathBuf};

use charter_core::{aggregate, calendar, Bar, Resolution};
use chrono::{Datelike, Local, NaiveDate};

use crate::parse::{format_time, parse_date, row_time, ParseOptions, RowDate};
use crate::source::{BarQuery, DataSource, RawRow, SourceError};
use crate::validation::validate_bar;

/// Oldest year scanned when a query leaves the start open.
const EARLIEST_YEAR: i32 = 2020;

/// Reads bars from per-year CSV files.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
}

impl CsvSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn file_path(&self, symbol: &str, year: i32) -> PathBuf {
        let (market, code) = split_symbol(symbol);
        self.root
            .join(year.to_string())
            .join(format!("{market}.{code}.csv"))
    }

    fn year_range(&self, query: &BarQuery) -> (i32, i32) {
        let current = Local::now().year();
        let (start, end) = match (query.start_date, query.end_date) {
            (Some(s), Some(e)) => (s.year(), e.year()),
            (None, Some(e)) => ((e.year() - 2).max(EARLIEST_YEAR), e.year()),
            (Some(s), None) => (s.year(), current),
            (None, None) => {
                let newest = (current - 3..=current)
                    .rev()
                    .find(|&y| self.file_path(&query.symbol, y).exists())
                    .unwrap_or(current);
                (newest, newest)
            }
        };
        (start.min(end), start.max(end))
    }

    fn load(&self, query: &BarQuery) -> Result<Vec<RawRow>, SourceError> {
        let (start_year, end_year) = self.year_range(query);

        let mut bars = Vec::new();
        let mut intraday = false;
        let mut found = false;
        for year in start_year..=end_year {
            let path = self.file_path(&query.symbol, year);
            if !path.exists() {
                log::warn!("Data file not found: {}", path.display());
                continue;
            }
            match load_file(&path) {
                Ok(file) => {
                    found = true;
                    intraday |= file.intraday;
                    bars.extend(file.bars);
                }
                Err(e) => log::warn!("Failed to read {}: {}", path.display(), e),
            }
        }
        if !found {
            return Err(SourceError::Semantic(format!(
                "no local data for {} in {}..={}",
                query.symbol, start_year, end_year
            )));
        }

        bars.sort_by_key(|b| b.time);
        bars.dedup_by_key(|b| b.time);
        bars.retain(|b| in_range(b.time, query.start_date, query.end_date));

        if intraday && !query.resolution.is_minute_feed() {
            bars = aggregate(&bars, query.resolution);
        }

        // An explicit date range returns everything inside it
        if query.start_date.is_none() && query.end_date.is_none() && bars.len() > query.row_limit {
            bars.drain(..bars.len() - query.row_limit);
        }

        let format_as = if intraday { Resolution::Min1 } else { Resolution::Daily };
        Ok(bars
            .iter()
            .map(|b| {
                RawRow::new(
                    format_time(b.time, format_as),
                    b.open,
                    b.high,
                    b.low,
                    b.close,
                    b.volume,
                )
            })
            .collect())
    }
}

impl DataSource for CsvSource {
    /// File reads run on the blocking pool so the caller's task keeps ticking.
    async fn query(&self, query: &BarQuery) -> Result<Vec<RawRow>, SourceError> {
        let source = self.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || source.load(&query))
            .await
            .map_err(|e| SourceError::Transport(format!("csv reader task failed: {e}")))?
    }
}

/// Market prefix and bare code of a symbol.
///
/// Accepts `sh600000`, `600000.XSHG`, `000001.XSHE` and bare codes, where a
/// leading `6` means Shanghai.
pub fn split_symbol(symbol: &str) -> (&'static str, &str) {
    if let Some(code) = symbol.strip_prefix("sh") {
        ("SH", code)
    } else if let Some(code) = symbol.strip_prefix("sz") {
        ("SZ", code)
    } else if let Some(code) = symbol.strip_suffix(".XSHG") {
        ("SH", code)
    } else if let Some(code) = symbol.strip_suffix(".XSHE") {
        ("SZ", code)
    } else if symbol.starts_with('6') {
        ("SH", symbol)
    } else {
        ("SZ", symbol)
    }
}

fn in_range(time: i64, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    let Some(date) = calendar::date_of(time) else {
        return false;
    };
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

struct FileBars {
    bars: Vec<Bar>,
    intraday: bool,
}

/// Column positions of one file, found by header name with positional fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl Columns {
    fn detect(headers: &[String]) -> Self {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.starts_with(n)))
        };
        Self {
            date: find(&["日期", "date"]).unwrap_or(0),
            open: find(&["开盘价", "open"]).unwrap_or(2),
            high: find(&["最高价", "high"]).unwrap_or(3),
            low: find(&["最低价", "low"]).unwrap_or(4),
            close: find(&["收盘价", "close"]).unwrap_or(5),
            volume: find(&["成交量", "volume"]).unwrap_or(6),
        }
    }

    fn width(&self) -> usize {
        [self.date, self.open, self.high, self.low, self.close, self.volume]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }
}

fn load_file(path: &Path) -> Result<FileBars, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_lowercase())
        .collect();
    let columns = Columns::detect(&headers);

    let mut bars = Vec::new();
    let mut intraday = false;
    let mut skipped = 0usize;

    for result in reader.byte_records() {
        let record = result?;
        if record.len() < columns.width() {
            skipped += 1;
            continue;
        }
        let field = |i: usize| String::from_utf8_lossy(record.get(i).unwrap_or_default()).into_owned();
        let number = |i: usize| field(i).trim().parse::<f64>().ok();

        let Some(date) = parse_date(&field(columns.date)) else {
            skipped += 1;
            continue;
        };
        intraday |= matches!(date, RowDate::DateTime(_));

        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            number(columns.open),
            number(columns.high),
            number(columns.low),
            number(columns.close),
            number(columns.volume),
        ) else {
            skipped += 1;
            continue;
        };

        let time = row_time(date, Resolution::Min1, ParseOptions::default());
        let bar = Bar::new(time, open, high, low, close, volume);
        if validate_bar(&bar).is_err() {
            skipped += 1;
            continue;
        }
        bars.push(bar);
    }

    if skipped > 0 {
        log::warn!("Skipped {} invalid rows in {}", skipped, path.display());
    }
    Ok(FileBars { bars, intraday })
}
