//! Moving-average overlays and volume histogram data.

use charter_core::{moving_average, Bar};

use crate::widget::{ChartWidget, LineStyle, LinePoint, SeriesId, VolumeBar};

/// One moving-average line on the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct MaOverlay {
    pub window: usize,
    series: Option<SeriesId>,
}

impl MaOverlay {
    pub fn name(&self) -> String {
        format!("MA{}", self.window)
    }

    pub fn series(&self) -> Option<SeriesId> {
        self.series
    }
}

/// Overlays recomputed after every store mutation.
#[derive(Debug, Clone, Default)]
pub struct IndicatorOverlays {
    overlays: Vec<MaOverlay>,
}

impl IndicatorOverlays {
    pub fn new(windows: &[usize]) -> Self {
        Self {
            overlays: windows
                .iter()
                .filter(|&&w| w > 0)
                .map(|&window| MaOverlay { window, series: None })
                .collect(),
        }
    }

    pub fn overlays(&self) -> &[MaOverlay] {
        &self.overlays
    }

    /// Recompute every overlay from `bars` and push it to the widget.
    pub fn refresh(&mut self, bars: &[Bar], widget: &mut dyn ChartWidget) {
        for overlay in &mut self.overlays {
            let points: Vec<LinePoint> = moving_average(overlay.window, bars)
                .into_iter()
                .map(|p| LinePoint::new(p.time, p.value))
                .collect();

            match overlay.series {
                Some(id) => widget.set_line_data(id, points),
                None => overlay.series = Some(widget.add_line_series(LineStyle::Solid, points)),
            }
        }
    }

    /// Remove all overlay series from the widget.
    pub fn detach(&mut self, widget: &mut dyn ChartWidget) {
        for overlay in &mut self.overlays {
            if let Some(id) = overlay.series.take() {
                widget.remove_series(id);
            }
        }
    }
}

/// Volume histogram entries, colored by direction.
pub fn volume_bars(bars: &[Bar]) -> Vec<VolumeBar> {
    bars.iter()
        .map(|b| VolumeBar {
            time: b.time,
            value: b.volume,
            up: b.is_up(),
        })
        .collect()
}
