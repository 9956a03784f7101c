//! Snapping pointer positions onto nearby OHLC values.

use charter_core::Bar;

use super::types::ChartPoint;
use crate::coords::ScreenPos;
use crate::widget::ChartWidget;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapSettings {
    pub threshold_px: f32,
    /// Bars on each side of the pointer's bar that are candidates.
    pub neighbors: usize,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            threshold_px: 20.0,
            neighbors: 2,
        }
    }
}

/// Index of the bar whose time is closest to `time`; earlier bar on ties.
fn nearest_index(bars: &[Bar], time: i64) -> Option<usize> {
    if bars.is_empty() {
        return None;
    }
    let after = bars.partition_point(|b| b.time < time);
    if after == 0 {
        return Some(0);
    }
    if after == bars.len() {
        return Some(bars.len() - 1);
    }
    let before = after - 1;
    if time - bars[before].time <= bars[after].time - time {
        Some(before)
    } else {
        Some(after)
    }
}

/// Resolve the chart point under `pointer`.
///
/// Scans the OHLC values of the bars around the pointer's time and snaps to
/// the closest one within the pixel threshold; otherwise the raw position is
/// returned unsnapped. `None` when the widget cannot convert the pointer.
pub fn find_snap_point(
    widget: &dyn ChartWidget,
    bars: &[Bar],
    pointer: ScreenPos,
    settings: &SnapSettings,
) -> Option<ChartPoint> {
    let (time, price) = widget.from_screen(pointer)?;
    let raw = ChartPoint::raw(time, price);

    let Some(center) = nearest_index(bars, time) else {
        return Some(raw);
    };
    let from = center.saturating_sub(settings.neighbors);
    let to = (center + settings.neighbors).min(bars.len() - 1);

    let mut best: Option<(f32, ChartPoint)> = None;
    for bar in &bars[from..=to] {
        for value in bar.ohlc() {
            let Some(pos) = widget.to_screen(bar.time, value) else {
                continue;
            };
            let distance = pos.distance_to(pointer);
            if distance > settings.threshold_px {
                continue;
            }
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, ChartPoint::snapped(bar.time, value)));
            }
        }
    }

    Some(best.map_or(raw, |(_, point)| point))
}
