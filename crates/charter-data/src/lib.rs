//! Data loading for charter.
//!
//! The core consumes bars through one query contract ([`DataSource`]): symbol,
//! resolution, optional date bounds and a row cap in, ordered OHLCV rows out.
//! Rows are converted into [`charter_core::Bar`]s by [`parse`], which rejects
//! bad rows individually.

pub mod csv;
pub mod http;
pub mod parse;
pub mod source;
pub mod validation;

pub use self::csv::CsvSource;
pub use http::HttpSource;
pub use parse::{parse_rows, ParseOptions, ParsedRows, RowError};
pub use source::{BarQuery, DataSource, RawRow, SourceError, SourceResponse};
