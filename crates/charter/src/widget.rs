//! Charting widget contract and a headless implementation.
//!
//! The core never renders. It talks to a widget through [`ChartWidget`]:
//! coordinate conversion, series mutation, and viewport get/set. Input events
//! travel the other way, as calls into [`crate::session::ChartSession`].
//!
//! Every conversion returns `Option`: `None` means the widget cannot place
//! that value right now, and the caller abandons the operation for this tick.

use std::collections::BTreeMap;

use charter_core::Bar;

use crate::coords::{PlotArea, ScreenPos};

/// Viewport in bar-index units. Fractional and possibly outside the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalRange {
    pub from: f64,
    pub to: f64,
}

impl LogicalRange {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    /// Number of bars spanned.
    pub fn span(&self) -> f64 {
        self.to - self.from
    }

    /// Fractional position of `index` inside the range.
    pub fn offset_of(&self, index: f64) -> Option<f64> {
        let span = self.span();
        (span > 0.0).then(|| (index - self.from) / span)
    }
}

/// Viewport in bar times (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn midpoint(&self) -> i64 {
        self.from + (self.to - self.from) / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineStyle {
    #[default]
    Solid,
    /// Lighter dashed rendering used for previews.
    Dashed,
    Highlighted,
}

/// Handle of an auxiliary line series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePoint {
    pub time: i64,
    pub value: f64,
}

impl LinePoint {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

/// One volume histogram entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBar {
    pub time: i64,
    pub value: f64,
    /// Close at or above open.
    pub up: bool,
}

pub trait ChartWidget {
    fn plot_area(&self) -> PlotArea;

    fn time_to_x(&self, time: i64) -> Option<f32>;
    fn x_to_time(&self, x: f32) -> Option<i64>;
    fn price_to_y(&self, price: f64) -> Option<f32>;
    fn y_to_price(&self, y: f32) -> Option<f64>;

    /// Replace the main series.
    fn set_all(&mut self, bars: &[Bar]);
    /// Update the last bar of the main series, or append a newer one.
    fn append_or_update(&mut self, bar: Bar);
    fn set_volume(&mut self, volume: &[VolumeBar]);

    fn visible_range(&self) -> Option<TimeRange>;
    fn set_visible_range(&mut self, range: TimeRange);
    fn visible_logical_range(&self) -> Option<LogicalRange>;
    fn set_visible_logical_range(&mut self, range: LogicalRange);
    fn fit_content(&mut self);

    fn add_line_series(&mut self, style: LineStyle, points: Vec<LinePoint>) -> SeriesId;
    fn set_line_data(&mut self, id: SeriesId, points: Vec<LinePoint>);
    fn set_line_style(&mut self, id: SeriesId, style: LineStyle);
    fn remove_series(&mut self, id: SeriesId);

    /// Screen position of a (time, price) pair.
    fn to_screen(&self, time: i64, price: f64) -> Option<ScreenPos> {
        Some(ScreenPos::new(self.time_to_x(time)?, self.price_to_y(price)?))
    }

    /// (time, price) under a screen position.
    fn from_screen(&self, pos: ScreenPos) -> Option<(i64, f64)> {
        Some((self.x_to_time(pos.x)?, self.y_to_price(pos.y)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineSeries {
    pub style: LineStyle,
    pub points: Vec<LinePoint>,
}

/// In-memory widget with linear scales.
///
/// Bars sit at integer logical indices. Times between bars interpolate,
/// and times past either end extrapolate with the spacing of the two
/// outermost bars. The price scale fits the visible bars unless pinned with
/// [`HeadlessChart::set_price_range`].
#[derive(Debug, Clone)]
pub struct HeadlessChart {
    area: PlotArea,
    bars: Vec<Bar>,
    volume: Vec<VolumeBar>,
    logical: Option<LogicalRange>,
    price_range: Option<(f64, f64)>,
    series: BTreeMap<SeriesId, LineSeries>,
    next_series: u64,
    set_all_calls: usize,
}

impl HeadlessChart {
    pub fn new(area: PlotArea) -> Self {
        Self {
            area,
            bars: Vec::new(),
            volume: Vec::new(),
            logical: None,
            price_range: None,
            series: BTreeMap::new(),
            next_series: 1,
            set_all_calls: 0,
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn volume(&self) -> &[VolumeBar] {
        &self.volume
    }

    pub fn series(&self, id: SeriesId) -> Option<&LineSeries> {
        self.series.get(&id)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn set_all_calls(&self) -> usize {
        self.set_all_calls
    }

    /// Pin the price scale to `[low, high]`; `None` restores auto-fit.
    pub fn set_price_range(&mut self, range: Option<(f64, f64)>) {
        self.price_range = range;
    }

    pub fn resize(&mut self, area: PlotArea) {
        self.area = area;
    }

    fn spacing(&self) -> Option<f64> {
        let range = self.logical?;
        let span = range.span();
        (span > 0.0).then(|| f64::from(self.area.width) / span)
    }

    /// Seconds per logical index past the ends of the data.
    fn edge_step(&self, at_end: bool) -> i64 {
        let n = self.bars.len();
        if n < 2 {
            return 60;
        }
        let (a, b) = if at_end {
            (self.bars[n - 2].time, self.bars[n - 1].time)
        } else {
            (self.bars[0].time, self.bars[1].time)
        };
        (b - a).max(1)
    }

    fn time_to_index(&self, time: i64) -> Option<f64> {
        let first = self.bars.first()?;
        let last = self.bars.last()?;
        if time < first.time {
            return Some((time - first.time) as f64 / self.edge_step(false) as f64);
        }
        if time > last.time {
            let last_index = (self.bars.len() - 1) as f64;
            return Some(last_index + (time - last.time) as f64 / self.edge_step(true) as f64);
        }
        let after = self.bars.partition_point(|b| b.time < time);
        let right = &self.bars[after];
        if right.time == time || after == 0 {
            return Some(after as f64);
        }
        let left = &self.bars[after - 1];
        let frac = (time - left.time) as f64 / (right.time - left.time) as f64;
        Some((after - 1) as f64 + frac)
    }

    fn index_to_time(&self, index: f64) -> Option<i64> {
        let first = self.bars.first()?;
        let last = self.bars.last()?;
        let last_index = (self.bars.len() - 1) as f64;
        if index <= 0.0 {
            return Some(first.time + (index * self.edge_step(false) as f64).round() as i64);
        }
        if index >= last_index {
            return Some(last.time + ((index - last_index) * self.edge_step(true) as f64).round() as i64);
        }
        let left = index.floor() as usize;
        let frac = index - left as f64;
        let (a, b) = (self.bars[left].time, self.bars[left + 1].time);
        Some(a + ((b - a) as f64 * frac).round() as i64)
    }

    fn auto_price_range(&self) -> Option<(f64, f64)> {
        if let Some(range) = self.price_range {
            return Some(range);
        }
        let logical = self.logical?;
        let last_index = self.bars.len().checked_sub(1)?;
        let from = logical.from.floor().max(0.0) as usize;
        let to = (logical.to.ceil().max(0.0) as usize).min(last_index);
        let visible = self.bars.get(from..=to)?;
        let low = visible.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let high = visible.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        (low.is_finite() && high.is_finite()).then_some((low, high))
    }

    fn price_span(&self) -> Option<(f64, f64)> {
        let (low, high) = self.auto_price_range()?;
        let span = high - low;
        (span > 0.0).then_some((low, high))
    }
}

impl Default for HeadlessChart {
    fn default() -> Self {
        Self::new(PlotArea::default())
    }
}

impl ChartWidget for HeadlessChart {
    fn plot_area(&self) -> PlotArea {
        self.area
    }

    fn time_to_x(&self, time: i64) -> Option<f32> {
        let index = self.time_to_index(time)?;
        let from = self.logical?.from;
        Some(((index - from) * self.spacing()?) as f32)
    }

    fn x_to_time(&self, x: f32) -> Option<i64> {
        let from = self.logical?.from;
        self.index_to_time(from + f64::from(x) / self.spacing()?)
    }

    fn price_to_y(&self, price: f64) -> Option<f32> {
        let (low, high) = self.price_span()?;
        Some(((high - price) / (high - low) * f64::from(self.area.height)) as f32)
    }

    fn y_to_price(&self, y: f32) -> Option<f64> {
        let (low, high) = self.price_span()?;
        Some(high - f64::from(y) / f64::from(self.area.height) * (high - low))
    }

    fn set_all(&mut self, bars: &[Bar]) {
        self.bars = bars.to_vec();
        self.set_all_calls += 1;
    }

    fn append_or_update(&mut self, bar: Bar) {
        match self.bars.last_mut() {
            Some(last) if last.time == bar.time => *last = bar,
            Some(last) if last.time > bar.time => {
                log::debug!("Ignoring out-of-order bar {} (last {})", bar.time, last.time)
            }
            _ => self.bars.push(bar),
        }
    }

    fn set_volume(&mut self, volume: &[VolumeBar]) {
        self.volume = volume.to_vec();
    }

    fn visible_range(&self) -> Option<TimeRange> {
        let logical = self.logical?;
        let last_index = self.bars.len().checked_sub(1)? as f64;
        let from = logical.from.ceil().clamp(0.0, last_index) as usize;
        let to = logical.to.floor().clamp(0.0, last_index) as usize;
        let (from, to) = (from.min(to), from.max(to));
        Some(TimeRange::new(self.bars[from].time, self.bars[to].time))
    }

    fn set_visible_range(&mut self, range: TimeRange) {
        if let (Some(from), Some(to)) = (self.time_to_index(range.from), self.time_to_index(range.to)) {
            self.logical = Some(LogicalRange::new(from, to));
        }
    }

    fn visible_logical_range(&self) -> Option<LogicalRange> {
        self.logical
    }

    fn set_visible_logical_range(&mut self, range: LogicalRange) {
        if range.span() > 0.0 {
            self.logical = Some(range);
        }
    }

    fn fit_content(&mut self) {
        if !self.bars.is_empty() {
            self.logical = Some(LogicalRange::new(-0.5, self.bars.len() as f64 - 0.5));
        }
    }

    fn add_line_series(&mut self, style: LineStyle, points: Vec<LinePoint>) -> SeriesId {
        let id = SeriesId(self.next_series);
        self.next_series += 1;
        self.series.insert(id, LineSeries { style, points });
        id
    }

    fn set_line_data(&mut self, id: SeriesId, points: Vec<LinePoint>) {
        if let Some(series) = self.series.get_mut(&id) {
            series.points = points;
        }
    }

    fn set_line_style(&mut self, id: SeriesId, style: LineStyle) {
        if let Some(series) = self.series.get_mut(&id) {
            series.style = style;
        }
    }

    fn remove_series(&mut self, id: SeriesId) {
        self.series.remove(&id);
    }
}
