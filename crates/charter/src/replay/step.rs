//! Single-step "next bar" advancement.

use chrono::NaiveDate;

use charter_core::calendar::{self, Bucket};
use charter_core::{Bar, Resolution};

/// Empty buckets skipped before a step gives up.
pub const MAX_EMPTY_BUCKETS: usize = 10;

/// The bar a step is trying to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub resolution: Resolution,
    pub bucket: Bucket,
    /// Trading date whose minute rows cover the bucket.
    pub date: NaiveDate,
}

impl StepPlan {
    /// Plan for the bucket stamped at `stamp`.
    pub fn at(stamp: i64, resolution: Resolution) -> Option<Self> {
        let bucket = calendar::bucket_for(stamp, resolution)?;
        let date = calendar::date_of(bucket.start)?;
        Some(Self {
            resolution,
            bucket,
            date,
        })
    }

    /// Plan for the bucket after the one this plan covers.
    pub fn following(&self) -> Option<Self> {
        let next = calendar::next_bar_time(self.bucket.stamp, self.resolution)?;
        Self::at(next, self.resolution)
    }

    /// Aggregate the rows of `minutes` that fall into this bucket.
    pub fn build(&self, minutes: &[Bar]) -> Option<Bar> {
        build_partial(minutes, &self.bucket, self.resolution, u32::MAX)
    }
}

/// Plan the bar following `last_time`.
pub fn plan_next_bar(last_time: i64, resolution: Resolution) -> Option<StepPlan> {
    let next = calendar::next_bar_time(last_time, resolution)?;
    StepPlan::at(next, resolution)
}

/// Aggregate the first `minutes_limit` session minutes of `bucket`.
///
/// Rows are matched by bucket membership, so an open-of-session stamp
/// (09:30, 13:00) counts as the first minute.
pub fn build_partial(minutes: &[Bar], bucket: &Bucket, resolution: Resolution, minutes_limit: u32) -> Option<Bar> {
    let first_index = calendar::session_minute(bucket.start)?;
    let cutoff = first_index.saturating_sub(1).saturating_add(minutes_limit);

    let mut agg: Option<Bar> = None;
    for bar in minutes {
        if calendar::bucket_for(bar.time, resolution).as_ref() != Some(bucket) {
            continue;
        }
        let Some(index) = calendar::session_minute(bar.time) else {
            continue;
        };
        if index > cutoff {
            continue;
        }
        match agg.as_mut() {
            None => agg = Some(bar.with_time(bucket.stamp)),
            Some(agg) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
        }
    }
    agg
}

/// Rejected because the candidate would not move the series forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale bar at {candidate} (last bar at {last})")]
pub struct StaleBar {
    pub last: i64,
    pub candidate: i64,
}

/// Accept `candidate` only when it is strictly later than `last`.
pub fn accept_next_bar(last: Option<&Bar>, candidate: Bar) -> Result<Bar, StaleBar> {
    match last {
        Some(last) if candidate.time <= last.time => Err(StaleBar {
            last: last.time,
            candidate: candidate.time,
        }),
        _ => Ok(candidate),
    }
}
