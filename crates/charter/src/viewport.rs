//! Viewport reference tracking across data mutations.
//!
//! Before a fetch mutates the store, [`ViewportTracker::record`] remembers
//! which bar sits where on screen and at what zoom. After the merge,
//! [`ViewportTracker::restore`] puts that bar back at the same fractional
//! position with the same pixels-per-bar, so loading history to the left does
//! not shove the user's view sideways.

use crate::store::BarStore;
use crate::widget::{ChartWidget, LogicalRange};

/// Where the reference bar was on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportReference {
    pub reference_time: i64,
    /// `(bar_index - logical.from) / logical.span()`, normally in `[0, 1]`.
    pub relative_position: f64,
    /// `plot_width / visible_bar_count` at recording time.
    pub pixels_per_bar: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewportTracker {
    reference: Option<ViewportReference>,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(&self) -> Option<&ViewportReference> {
        self.reference.as_ref()
    }

    /// Drop the recorded reference without restoring it.
    pub fn discard(&mut self) {
        self.reference = None;
    }

    /// Record the bar closest to the middle of the visible time range.
    pub fn record(&mut self, widget: &dyn ChartWidget, store: &BarStore) -> Option<ViewportReference> {
        let visible = widget.visible_range()?;
        let logical = widget.visible_logical_range()?;
        let index = store.closest_to(visible.midpoint())?;
        let bar = store.get(index)?;
        let relative_position = logical.offset_of(index as f64)?;

        let span = logical.span();
        let width = f64::from(widget.plot_area().width);
        let pixels_per_bar = (span > 0.0 && width > 0.0).then(|| width / span);

        let reference = ViewportReference {
            reference_time: bar.time,
            relative_position,
            pixels_per_bar,
        };
        log::debug!(
            "Recorded reference bar {} at {:.3} ({:?} px/bar)",
            reference.reference_time,
            relative_position,
            pixels_per_bar
        );
        self.reference = Some(reference);
        Some(reference)
    }

    /// Put the reference bar back where it was. Consumes the reference.
    ///
    /// Returns `false` (and logs) when nothing was recorded or the reference
    /// bar is no longer in the store.
    pub fn restore(&mut self, widget: &mut dyn ChartWidget, store: &BarStore) -> bool {
        let Some(reference) = self.reference.take() else {
            log::debug!("No viewport reference to restore");
            return false;
        };
        let Some(index) = store.index_of(reference.reference_time) else {
            log::info!("Reference bar {} no longer loaded", reference.reference_time);
            return false;
        };

        let width = f64::from(widget.plot_area().width);
        let span = match reference.pixels_per_bar {
            Some(ppb) if ppb > 0.0 && width > 0.0 => width / ppb,
            _ => match widget.visible_logical_range() {
                Some(current) => current.span(),
                None => return false,
            },
        };

        let from = index as f64 - reference.relative_position * span;
        widget.set_visible_logical_range(LogicalRange::new(from, from + span));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PlotArea;
    use crate::widget::HeadlessChart;
    use charter_core::Bar;

    fn day_bars(from: i64, count: i64) -> Vec<Bar> {
        (from..from + count)
            .map(|d| Bar::new(d * 86_400, 10.0, 11.0, 9.0, 10.5, 100.0))
            .collect()
    }

    #[test]
    fn test_round_trip_after_prepend() {
        let mut store = BarStore::new(1000);
        store.merge(day_bars(100, 50));
        let mut chart = HeadlessChart::new(PlotArea::new(800.0, 400.0));
        chart.set_all(store.bars());
        chart.set_visible_logical_range(LogicalRange::new(5.0, 25.0));

        let mut tracker = ViewportTracker::new();
        let reference = tracker.record(&chart, &store).unwrap();
        let zoom = reference.pixels_per_bar.unwrap();

        // 30 older bars shift every index by 30
        store.merge(day_bars(70, 30));
        chart.set_all(store.bars());
        assert!(tracker.restore(&mut chart, &store));

        let logical = chart.visible_logical_range().unwrap();
        let index = store.index_of(reference.reference_time).unwrap() as f64;
        let offset = logical.offset_of(index).unwrap();
        assert!((offset - reference.relative_position).abs() < 1e-9);
        assert!((800.0 / logical.span() - zoom).abs() < 1e-9);
        assert!(tracker.reference().is_none());
    }

    #[test]
    fn test_restore_without_reference_is_noop() {
        let store = BarStore::new(10);
        let mut chart = HeadlessChart::default();
        let mut tracker = ViewportTracker::new();
        assert!(!tracker.restore(&mut chart, &store));
    }

    #[test]
    fn test_restore_missing_bar_is_noop() {
        let mut store = BarStore::new(1000);
        store.merge(day_bars(100, 10));
        let mut chart = HeadlessChart::default();
        chart.set_all(store.bars());
        chart.fit_content();

        let mut tracker = ViewportTracker::new();
        tracker.record(&chart, &store).unwrap();
        store.replace_all(day_bars(500, 10));
        let before = chart.visible_logical_range();
        assert!(!tracker.restore(&mut chart, &store));
        assert_eq!(chart.visible_logical_range(), before);
    }
}
