//! Core types for the charter application.
//!
//! This crate provides the fundamental data structures and pure functions:
//! - `Bar` - OHLCV bar keyed by epoch seconds
//! - `Resolution` - Bucket width enumeration
//! - `calendar` - Exchange session calendar (bucket boundaries, trading days)
//! - `aggregate` - Bucket aggregation, incremental bar building, moving averages

pub mod aggregate;
pub mod bar;
pub mod calendar;
pub mod resolution;

pub use aggregate::{aggregate, aggregate_bucket, moving_average, AveragePoint, BarBuilder, BuildStep};
pub use bar::Bar;
pub use resolution::{ParseResolutionError, Resolution};
