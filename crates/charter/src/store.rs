//! Ordered, deduplicated bar storage.

use charter_core::Bar;

/// What a store mutation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Bars that were not already present.
    pub added: usize,
    /// Oldest bars dropped to stay under the cap.
    pub truncated: usize,
}

/// Why a bar could not be pushed at the end of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfOrder {
    pub last_time: i64,
    pub time: i64,
}

/// All loaded bars, sorted ascending by time with unique times.
#[derive(Debug, Clone)]
pub struct BarStore {
    bars: Vec<Bar>,
    max_bars: usize,
    cap_warned: bool,
    pending_cap_warning: Option<usize>,
}

impl BarStore {
    pub fn new(max_bars: usize) -> Self {
        Self {
            bars: Vec::new(),
            max_bars: max_bars.max(1),
            cap_warned: false,
            pending_cap_warning: None,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn max_bars(&self) -> usize {
        self.max_bars
    }

    /// Merge bars, keeping existing bars where times collide.
    ///
    /// Merging the same bars twice has no further effect.
    pub fn merge(&mut self, mut new_bars: Vec<Bar>) -> MergeOutcome {
        new_bars.sort_by_key(|b| b.time);
        new_bars.dedup_by_key(|b| b.time);
        new_bars.retain(|b| self.index_of(b.time).is_none());

        let added = new_bars.len();
        if added == 0 {
            return MergeOutcome::default();
        }

        self.bars.extend(new_bars);
        self.bars.sort_by_key(|b| b.time);
        MergeOutcome {
            added,
            truncated: self.enforce_cap(),
        }
    }

    /// Discard all bars and load `bars` instead.
    pub fn replace_all(&mut self, mut bars: Vec<Bar>) -> MergeOutcome {
        bars.sort_by_key(|b| b.time);
        bars.dedup_by_key(|b| b.time);
        self.bars = bars;
        MergeOutcome {
            added: self.bars.len(),
            truncated: self.enforce_cap(),
        }
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    /// Append `bar`, or replace the last bar when it has the same time.
    pub fn push_or_replace_last(&mut self, bar: Bar) -> Result<(), OutOfOrder> {
        match self.bars.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            Some(last) if last.time > bar.time => {
                return Err(OutOfOrder {
                    last_time: last.time,
                    time: bar.time,
                })
            }
            _ => {
                self.bars.push(bar);
                self.enforce_cap();
            }
        }
        Ok(())
    }

    /// Earliest and latest time, found in a single pass.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let first = self.bars.first()?;
        Some(self.bars.iter().fold((first.time, first.time), |(min, max), b| {
            (min.min(b.time), max.max(b.time))
        }))
    }

    pub fn index_of(&self, time: i64) -> Option<usize> {
        self.bars.binary_search_by_key(&time, |b| b.time).ok()
    }

    /// Index of the bar whose time is closest to `time` (earlier bar on ties).
    pub fn closest_to(&self, time: i64) -> Option<usize> {
        if self.bars.is_empty() {
            return None;
        }
        let after = self.bars.partition_point(|b| b.time < time);
        if after == 0 {
            return Some(0);
        }
        if after == self.bars.len() {
            return Some(after - 1);
        }
        let before_diff = time - self.bars[after - 1].time;
        let after_diff = self.bars[after].time - time;
        Some(if after_diff < before_diff { after } else { after - 1 })
    }

    /// Number of bars dropped by the first truncation, reported once.
    pub fn take_cap_warning(&mut self) -> Option<usize> {
        self.pending_cap_warning.take()
    }

    fn enforce_cap(&mut self) -> usize {
        if self.bars.len() <= self.max_bars {
            return 0;
        }
        let excess = self.bars.len() - self.max_bars;
        self.bars.drain(..excess);
        if !self.cap_warned {
            self.cap_warned = true;
            self.pending_cap_warning = Some(excess);
            log::warn!(
                "Bar count exceeds {}, keeping the most recent {} (dropped {})",
                self.max_bars,
                self.max_bars,
                excess
            );
        }
        excess
    }
}

impl Default for BarStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64) -> Bar {
        Bar::flat(time, 10.0, 100.0)
    }

    fn bars(times: &[i64]) -> Vec<Bar> {
        times.iter().map(|&t| bar(t)).collect()
    }

    #[test]
    fn test_merge_sorts_and_dedups() {
        let mut store = BarStore::new(100);
        store.merge(bars(&[30, 10, 20, 10]));
        let outcome = store.merge(bars(&[25, 20, 5]));

        assert_eq!(outcome.added, 2);
        let times: Vec<i64> = store.bars().iter().map(|b| b.time).collect();
        assert_eq!(times, vec![5, 10, 20, 25, 30]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = bars(&[3, 1, 2]);
        let mut once = BarStore::new(100);
        once.merge(input.clone());

        let mut twice = BarStore::new(100);
        twice.merge(input.clone());
        let second = twice.merge(input);

        assert_eq!(second, MergeOutcome::default());
        assert_eq!(once.bars(), twice.bars());
    }

    #[test]
    fn test_merge_keeps_existing_bar_on_collision() {
        let mut store = BarStore::new(100);
        store.merge(vec![Bar::flat(10, 1.0, 0.0)]);
        store.merge(vec![Bar::flat(10, 2.0, 0.0)]);
        assert_eq!(store.bars()[0].close, 1.0);
    }

    #[test]
    fn test_cap_truncates_oldest_and_warns_once() {
        let mut store = BarStore::new(3);
        let outcome = store.merge(bars(&[1, 2, 3, 4, 5]));
        assert_eq!(outcome.truncated, 2);
        assert_eq!(store.first().map(|b| b.time), Some(3));
        assert_eq!(store.take_cap_warning(), Some(2));

        store.merge(bars(&[6]));
        assert_eq!(store.len(), 3);
        assert_eq!(store.take_cap_warning(), None);
    }

    #[test]
    fn test_bounds_and_lookup() {
        let mut store = BarStore::new(100);
        assert_eq!(store.bounds(), None);
        store.replace_all(bars(&[100, 200, 300]));
        assert_eq!(store.bounds(), Some((100, 300)));
        assert_eq!(store.index_of(200), Some(1));
        assert_eq!(store.index_of(250), None);
        assert_eq!(store.closest_to(240), Some(1));
        assert_eq!(store.closest_to(260), Some(2));
        assert_eq!(store.closest_to(250), Some(1));
        assert_eq!(store.closest_to(0), Some(0));
        assert_eq!(store.closest_to(999), Some(2));
    }

    #[test]
    fn test_push_or_replace_last() {
        let mut store = BarStore::new(100);
        store.push_or_replace_last(Bar::flat(10, 1.0, 0.0)).unwrap();
        store.push_or_replace_last(Bar::flat(10, 2.0, 0.0)).unwrap();
        store.push_or_replace_last(Bar::flat(20, 3.0, 0.0)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.bars()[0].close, 2.0);
        assert!(store.push_or_replace_last(Bar::flat(15, 1.0, 0.0)).is_err());
    }

    #[test]
    fn test_replace_all_discards_previous() {
        let mut store = BarStore::new(100);
        store.merge(bars(&[1, 2, 3]));
        store.replace_all(bars(&[7, 8]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.first().map(|b| b.time), Some(7));
    }
}
