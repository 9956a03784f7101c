//! Bar data structure for OHLCV data.

use serde::{Deserialize, Serialize};

/// One OHLCV record for a time bucket.
///
/// `time` is the bucket stamp in epoch seconds and is the unique key of a bar
/// inside a store. Bars are never edited in place; an update replaces the bar
/// stored at that key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A bar whose four prices are all `price`.
    pub fn flat(time: i64, price: f64, volume: f64) -> Self {
        Self::new(time, price, price, price, price, volume)
    }

    /// Check `low <= min(open, close) <= max(open, close) <= high` and `volume >= 0`.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= 0.0
    }

    /// The four price points in open, high, low, close order.
    pub fn ohlc(&self) -> [f64; 4] {
        [self.open, self.high, self.low, self.close]
    }

    /// Whether the bar closed at or above its open.
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }

    /// Copy of this bar stamped with a different time.
    pub fn with_time(self, time: i64) -> Self {
        Self { time, ..self }
    }
}
