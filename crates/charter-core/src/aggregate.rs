//! Bar aggregation and moving averages.

use crate::bar::Bar;
use crate::calendar::{self, Bucket};
use crate::resolution::Resolution;

/// Aggregate the bars of `bars` falling inside `bucket` (inclusive on both ends).
///
/// `bars` must be sorted by time. Returns `None` when no bar falls inside the bucket.
pub fn aggregate_bucket(bars: &[Bar], bucket: &Bucket) -> Option<Bar> {
    let from = bars.partition_point(|b| b.time < bucket.start);
    let to = bars.partition_point(|b| b.time <= bucket.end);
    let slice = bars.get(from..to)?;
    let first = slice.first()?;

    let mut agg = first.with_time(bucket.stamp);
    for bar in &slice[1..] {
        extend(&mut agg, bar);
    }
    Some(agg)
}

fn extend(agg: &mut Bar, bar: &Bar) {
    agg.high = agg.high.max(bar.high);
    agg.low = agg.low.min(bar.low);
    agg.close = bar.close;
    agg.volume += bar.volume;
}

/// Aggregate sorted finer-granularity bars into `resolution` buckets.
///
/// Bars outside the trading sessions are dropped for intraday resolutions.
pub fn aggregate(bars: &[Bar], resolution: Resolution) -> Vec<Bar> {
    if resolution == Resolution::Min1 {
        return bars.to_vec();
    }

    let mut aggregated = Vec::new();
    let mut current: Option<(Bucket, Bar)> = None;

    for bar in bars {
        let Some(bucket) = calendar::bucket_for(bar.time, resolution) else {
            continue;
        };

        match current.as_mut() {
            Some((cur_bucket, agg)) if *cur_bucket == bucket => {
                // Same bucket - update high, low, close, accumulate volume
                extend(agg, bar);
            }
            _ => {
                if let Some((_, agg)) = current.take() {
                    aggregated.push(agg);
                }
                current = Some((bucket, bar.with_time(bucket.stamp)));
            }
        }
    }

    if let Some((_, agg)) = current {
        aggregated.push(agg);
    }

    aggregated
}

/// One moving-average value, stamped with the bar that closes its window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AveragePoint {
    pub time: i64,
    pub value: f64,
}

/// Simple moving average over `close`.
///
/// One point per bar from index `window - 1` on, rounded to 2 decimal places.
/// Runs in linear time using a sliding sum.
pub fn moving_average(window: usize, bars: &[Bar]) -> Vec<AveragePoint> {
    if window == 0 || bars.len() < window {
        return Vec::new();
    }

    let mut points = Vec::with_capacity(bars.len() + 1 - window);
    let mut sum: f64 = bars[..window - 1].iter().map(|b| b.close).sum();

    for (i, bar) in bars.iter().enumerate().skip(window - 1) {
        sum += bar.close;
        if i >= window {
            sum -= bars[i - window].close;
        }
        points.push(AveragePoint {
            time: bar.time,
            value: round2(sum / window as f64),
        });
    }

    points
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Result of feeding one minute bar into a [`BarBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BuildStep {
    /// Bar completed by this step (the previous bucket, or the minute itself at 1m).
    pub finalized: Option<Bar>,
    /// In-progress bar after this step, for live display.
    pub live: Option<Bar>,
}

/// Incrementally builds `resolution` bars from a 1-minute feed.
#[derive(Debug, Clone)]
pub struct BarBuilder {
    resolution: Resolution,
    current: Option<(Bucket, Bar)>,
}

impl BarBuilder {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            current: None,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// The unfinalized bar, if a bucket is open.
    pub fn building(&self) -> Option<&Bar> {
        self.current.as_ref().map(|(_, bar)| bar)
    }

    /// Feed one minute bar.
    ///
    /// The first minute of a bucket opens a new bar; later minutes of the same
    /// bucket extend it. A minute from a new bucket finalizes the open bar.
    pub fn push(&mut self, minute: &Bar) -> BuildStep {
        if self.resolution == Resolution::Min1 {
            return BuildStep {
                finalized: Some(*minute),
                live: None,
            };
        }

        let Some(bucket) = calendar::bucket_for(minute.time, self.resolution) else {
            return BuildStep {
                finalized: None,
                live: self.building().copied(),
            };
        };

        let mut finalized = None;
        match self.current.as_mut() {
            Some((cur_bucket, agg)) if *cur_bucket == bucket => extend(agg, minute),
            _ => {
                finalized = self.current.take().map(|(_, bar)| bar);
                self.current = Some((bucket, minute.with_time(bucket.stamp)));
            }
        }

        BuildStep {
            finalized,
            live: self.building().copied(),
        }
    }

    /// Finalize and return the open bar.
    pub fn flush(&mut self) -> Option<Bar> {
        self.current.take().map(|(_, bar)| bar)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{at_minute, wall_minute};
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    /// One 1-minute bar per trading minute `1..=count`, close rising by 0.1.
    fn minute_bars(count: u32) -> Vec<Bar> {
        (1..=count)
            .map(|i| {
                let base = 10.0 + f64::from(i) * 0.1;
                Bar::new(at_minute(day(), wall_minute(i)), base, base + 0.5, base - 0.5, base + 0.05, 100.0)
            })
            .collect()
    }

    #[test]
    fn test_aggregate_bucket_ohlc() {
        let bars = minute_bars(240);
        let bucket = calendar::bucket_for(bars[0].time, Resolution::Min30).unwrap();
        let agg = aggregate_bucket(&bars, &bucket).unwrap();

        assert_eq!(agg.time, bucket.stamp);
        assert_eq!(agg.open, bars[0].open);
        assert_eq!(agg.close, bars[29].close);
        assert_eq!(agg.high, bars[29].high);
        assert_eq!(agg.low, bars[0].low);
        assert_eq!(agg.volume, 3000.0);
        assert!(agg.is_consistent());
    }

    #[test]
    fn test_aggregate_bucket_empty() {
        let bars = minute_bars(10);
        let bucket = calendar::daily_bucket(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert!(aggregate_bucket(&bars, &bucket).is_none());
        assert!(aggregate_bucket(&[], &bucket).is_none());
    }

    #[test]
    fn test_aggregate_resolutions() {
        let bars = minute_bars(240);
        assert_eq!(aggregate(&bars, Resolution::Min5).len(), 48);
        assert_eq!(aggregate(&bars, Resolution::Min30).len(), 8);
        assert_eq!(aggregate(&bars, Resolution::Min60).len(), 4);

        let daily = aggregate(&bars, Resolution::Daily);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].volume, 24_000.0);
        for bar in aggregate(&bars, Resolution::Min15) {
            assert!(bar.is_consistent());
        }
    }

    #[test]
    fn test_moving_average_constant_close() {
        let bars: Vec<Bar> = (0..30).map(|i| Bar::flat(i, 12.34, 1.0)).collect();
        let ma = moving_average(5, &bars);
        assert_eq!(ma.len(), 26);
        assert_eq!(ma[0].time, 4);
        assert!(ma.iter().all(|p| p.value == 12.34));
    }

    #[test]
    fn test_moving_average_values() {
        let bars: Vec<Bar> = [1.0, 2.0, 3.0, 4.0, 6.0]
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::flat(i as i64, *c, 0.0))
            .collect();
        let ma = moving_average(3, &bars);
        let values: Vec<f64> = ma.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.33]);
        let times: Vec<i64> = ma.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![2, 3, 4]);
    }

    #[test]
    fn test_moving_average_short_input() {
        let bars: Vec<Bar> = (0..3).map(|i| Bar::flat(i, 1.0, 0.0)).collect();
        assert!(moving_average(5, &bars).is_empty());
        assert!(moving_average(0, &bars).is_empty());
    }

    #[test]
    fn test_builder_finalizes_on_new_bucket() {
        let bars = minute_bars(61);
        let mut builder = BarBuilder::new(Resolution::Min30);

        let mut finalized = Vec::new();
        for bar in &bars {
            let step = builder.push(bar);
            assert!(step.live.is_some());
            finalized.extend(step.finalized);
        }

        assert_eq!(finalized.len(), 2);
        assert_eq!(finalized, aggregate(&bars[..60], Resolution::Min30));
        // minute 61 opened the third bucket
        assert_eq!(builder.building().unwrap().open, bars[60].open);
        assert!(builder.flush().is_some());
        assert!(builder.building().is_none());
    }

    #[test]
    fn test_builder_one_minute_passthrough() {
        let bars = minute_bars(2);
        let mut builder = BarBuilder::new(Resolution::Min1);
        let step = builder.push(&bars[0]);
        assert_eq!(step.finalized, Some(bars[0]));
        assert!(step.live.is_none());
    }
}
