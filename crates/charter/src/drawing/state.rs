//! Drawing tool state machine and annotation registry.

use std::time::{Duration, Instant};

use charter_config::DrawingConfig;
use charter_core::Bar;

use super::hit;
use super::snap::{find_snap_point, SnapSettings};
use super::types::{Annotation, AnnotationId, BuildError, ChartPoint, Segment, ToolKind};
use crate::coords::ScreenPos;
use crate::widget::{ChartWidget, LineStyle, LinePoint, LogicalRange, SeriesId};

const ZOOM_IN_FACTOR: f64 = 0.8;
const ZOOM_OUT_FACTOR: f64 = 1.25;

/// What the user is doing with the pointer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Mode {
    /// Pointer events belong to chart navigation.
    #[default]
    Navigate,
    /// Placing anchors for `tool`.
    Draw { tool: ToolKind, anchors: Vec<ChartPoint> },
    /// Highlighting and removing annotations.
    Delete {
        highlighted: Option<AnnotationId>,
        last_hit_test: Option<Instant>,
    },
}

/// Result of a pointer click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Ignored,
    AnchorPlaced,
    Created(AnnotationId),
    Rejected(BuildError),
    Deleted(AnnotationId),
}

/// Everything a pointer handler needs from the session.
pub struct DrawContext<'a> {
    pub widget: &'a mut dyn ChartWidget,
    pub bars: &'a [Bar],
    pub now: Instant,
}

impl<'a> DrawContext<'a> {
    pub fn new(widget: &'a mut dyn ChartWidget, bars: &'a [Bar], now: Instant) -> Self {
        Self { widget, bars, now }
    }

    fn extent(&self) -> Option<(i64, i64)> {
        Some((self.bars.first()?.time, self.bars.last()?.time))
    }
}

#[derive(Debug, Clone)]
struct Placed {
    annotation: Annotation,
    series: Vec<SeriesId>,
}

/// Owns the active tool, the preview series and every placed annotation.
#[derive(Debug)]
pub struct DrawingManager {
    mode: Mode,
    placed: Vec<Placed>,
    preview: Vec<SeriesId>,
    next_id: u64,
    snap: SnapSettings,
    hit_threshold_px: f32,
    hit_throttle: Duration,
    user_adjusted_view: bool,
}

impl DrawingManager {
    pub fn new(config: &DrawingConfig) -> Self {
        Self {
            mode: Mode::Navigate,
            placed: Vec::new(),
            preview: Vec::new(),
            next_id: 1,
            snap: SnapSettings {
                threshold_px: config.snap_threshold_px,
                neighbors: config.snap_neighbors,
            },
            hit_threshold_px: config.hit_threshold_px,
            hit_throttle: Duration::from_millis(config.hit_throttle_ms),
            user_adjusted_view: false,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn active_tool(&self) -> Option<ToolKind> {
        match &self.mode {
            Mode::Draw { tool, .. } => Some(*tool),
            _ => None,
        }
    }

    pub fn pending_anchors(&self) -> &[ChartPoint] {
        match &self.mode {
            Mode::Draw { anchors, .. } => anchors,
            _ => &[],
        }
    }

    pub fn highlighted(&self) -> Option<AnnotationId> {
        match &self.mode {
            Mode::Delete { highlighted, .. } => *highlighted,
            _ => None,
        }
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.placed.iter().map(|p| &p.annotation)
    }

    pub fn len(&self) -> usize {
        self.placed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    pub fn has_preview(&self) -> bool {
        !self.preview.is_empty()
    }

    pub fn user_adjusted_view(&self) -> bool {
        self.user_adjusted_view
    }

    /// Whether viewport restoration should be skipped right now.
    pub fn suppresses_restore(&self) -> bool {
        self.user_adjusted_view && self.has_preview()
    }

    /// Arm `tool`, dropping whatever was in progress.
    pub fn start(&mut self, tool: ToolKind, widget: &mut dyn ChartWidget) {
        self.leave_mode(widget);
        log::debug!("Drawing tool armed: {}", tool.name());
        self.mode = Mode::Draw {
            tool,
            anchors: Vec::new(),
        };
    }

    pub fn start_delete(&mut self, widget: &mut dyn ChartWidget) {
        self.leave_mode(widget);
        self.mode = Mode::Delete {
            highlighted: None,
            last_hit_test: None,
        };
    }

    /// Back to navigation without producing an annotation.
    pub fn cancel(&mut self, widget: &mut dyn ChartWidget) {
        self.leave_mode(widget);
        self.mode = Mode::Navigate;
    }

    fn leave_mode(&mut self, widget: &mut dyn ChartWidget) {
        self.clear_preview(widget);
        if let Some(id) = self.highlighted() {
            self.set_style(widget, id, LineStyle::Solid);
        }
        self.user_adjusted_view = false;
    }

    pub fn on_pointer_move(&mut self, ctx: &mut DrawContext<'_>, pointer: ScreenPos) {
        let previewing = match &self.mode {
            Mode::Navigate => return,
            Mode::Draw { anchors, .. } if anchors.is_empty() => return,
            Mode::Draw { .. } => true,
            Mode::Delete { .. } => false,
        };
        if previewing {
            self.update_preview(ctx, pointer);
        } else {
            self.update_highlight(ctx, pointer);
        }
    }

    pub fn on_pointer_click(&mut self, ctx: &mut DrawContext<'_>, pointer: ScreenPos) -> ClickOutcome {
        match &mut self.mode {
            Mode::Navigate => ClickOutcome::Ignored,
            Mode::Draw { tool, anchors } => {
                let Some(point) = find_snap_point(&*ctx.widget, ctx.bars, pointer, &self.snap) else {
                    return ClickOutcome::Ignored;
                };
                anchors.push(point);
                if anchors.len() < tool.behavior().anchors {
                    return ClickOutcome::AnchorPlaced;
                }
                self.finish(ctx)
            }
            Mode::Delete { highlighted, .. } => match highlighted.take() {
                Some(id) => {
                    self.remove(ctx.widget, id);
                    ClickOutcome::Deleted(id)
                }
                None => ClickOutcome::Ignored,
            },
        }
    }

    /// Build the annotation from the placed anchors.
    ///
    /// A rejected ray discards its anchors and keeps the tool armed.
    pub fn finish(&mut self, ctx: &mut DrawContext<'_>) -> ClickOutcome {
        let Mode::Draw { tool, anchors } = &mut self.mode else {
            return ClickOutcome::Ignored;
        };
        let tool = *tool;
        let behavior = tool.behavior();
        let id = AnnotationId(self.next_id);
        let result = (behavior.build)(id, anchors, &*ctx.widget);
        anchors.clear();
        let extent = ctx.extent();

        self.clear_preview(ctx.widget);
        self.user_adjusted_view = false;

        match result {
            Ok(annotation) => {
                self.next_id += 1;
                let series = render(ctx.widget, &annotation.segments(extent), LineStyle::Solid);
                log::info!("Created {} annotation {}", tool.name(), id.0);
                self.placed.push(Placed { annotation, series });
                if !behavior.continuous {
                    self.mode = Mode::Navigate;
                }
                ClickOutcome::Created(id)
            }
            Err(err) => {
                match err {
                    BuildError::RayDirection => log::warn!("Ray rejected: second point must be later than the first"),
                    _ => log::debug!("{} not built: {err:?}", tool.name()),
                }
                ClickOutcome::Rejected(err)
            }
        }
    }

    fn update_preview(&mut self, ctx: &mut DrawContext<'_>, pointer: ScreenPos) {
        let Mode::Draw { tool, anchors } = &self.mode else {
            return;
        };
        let Some(point) = find_snap_point(&*ctx.widget, ctx.bars, pointer, &self.snap) else {
            return;
        };
        let mut points = anchors.clone();
        points.push(point);
        let extent = ctx.extent();

        match (tool.behavior().build)(AnnotationId(0), &points, &*ctx.widget) {
            Ok(shape) => {
                let segments = shape.segments(extent);
                if segments.len() == self.preview.len() {
                    for (id, segment) in self.preview.iter().zip(&segments) {
                        ctx.widget.set_line_data(*id, segment_points(segment));
                    }
                } else {
                    self.clear_preview(ctx.widget);
                    self.preview = render(ctx.widget, &segments, LineStyle::Dashed);
                }
            }
            Err(_) => self.clear_preview(ctx.widget),
        }
    }

    fn update_highlight(&mut self, ctx: &mut DrawContext<'_>, pointer: ScreenPos) {
        let Mode::Delete { highlighted, last_hit_test } = &mut self.mode else {
            return;
        };
        if last_hit_test.is_some_and(|last| ctx.now.duration_since(last) < self.hit_throttle) {
            return;
        }
        *last_hit_test = Some(ctx.now);

        let annotations: Vec<Annotation> = self.placed.iter().map(|p| p.annotation.clone()).collect();
        let nearest = hit::nearest(&*ctx.widget, &annotations, pointer, self.hit_threshold_px);
        let previous = std::mem::replace(highlighted, nearest);
        if previous == nearest {
            return;
        }
        if let Some(id) = previous {
            self.set_style(ctx.widget, id, LineStyle::Solid);
        }
        if let Some(id) = nearest {
            self.set_style(ctx.widget, id, LineStyle::Highlighted);
        }
    }

    /// Keyboard zoom, honored only while drawing or deleting.
    pub fn on_key_zoom(&mut self, zoom_in: bool, widget: &mut dyn ChartWidget) -> bool {
        if matches!(self.mode, Mode::Navigate) {
            return false;
        }
        let Some(range) = widget.visible_logical_range() else {
            return false;
        };
        let factor = if zoom_in { ZOOM_IN_FACTOR } else { ZOOM_OUT_FACTOR };
        let center = (range.from + range.to) / 2.0;
        let half = range.span() * factor / 2.0;
        widget.set_visible_logical_range(LogicalRange::new(center - half, center + half));
        self.user_adjusted_view = true;
        true
    }

    /// Re-render extent-dependent annotations after the loaded data changed.
    pub fn sync_extent(&mut self, widget: &mut dyn ChartWidget, bars: &[Bar]) {
        let extent = bars.first().zip(bars.last()).map(|(a, b)| (a.time, b.time));
        for placed in &mut self.placed {
            if !matches!(placed.annotation, Annotation::HorizontalLine { .. }) {
                continue;
            }
            let segments = placed.annotation.segments(extent);
            if segments.len() == placed.series.len() {
                for (id, segment) in placed.series.iter().zip(&segments) {
                    widget.set_line_data(*id, segment_points(segment));
                }
            } else {
                for id in placed.series.drain(..) {
                    widget.remove_series(id);
                }
                placed.series = render(widget, &segments, LineStyle::Solid);
            }
        }
    }

    pub fn remove(&mut self, widget: &mut dyn ChartWidget, id: AnnotationId) -> bool {
        let Some(index) = self.placed.iter().position(|p| p.annotation.id() == id) else {
            return false;
        };
        let placed = self.placed.remove(index);
        for series in placed.series {
            widget.remove_series(series);
        }
        if let Mode::Delete { highlighted, .. } = &mut self.mode {
            if *highlighted == Some(id) {
                *highlighted = None;
            }
        }
        log::info!("Deleted annotation {}", id.0);
        true
    }

    pub fn clear_all(&mut self, widget: &mut dyn ChartWidget) {
        for placed in self.placed.drain(..) {
            for series in placed.series {
                widget.remove_series(series);
            }
        }
        self.clear_preview(widget);
        if let Mode::Delete { highlighted, .. } = &mut self.mode {
            *highlighted = None;
        }
    }

    /// Drop in-progress anchors and the preview; used when the data is replaced.
    pub fn reset_preview(&mut self, widget: &mut dyn ChartWidget) {
        self.clear_preview(widget);
        if let Mode::Draw { anchors, .. } = &mut self.mode {
            anchors.clear();
        }
        self.user_adjusted_view = false;
    }

    fn clear_preview(&mut self, widget: &mut dyn ChartWidget) {
        for id in self.preview.drain(..) {
            widget.remove_series(id);
        }
    }

    fn set_style(&self, widget: &mut dyn ChartWidget, id: AnnotationId, style: LineStyle) {
        if let Some(placed) = self.placed.iter().find(|p| p.annotation.id() == id) {
            for series in &placed.series {
                widget.set_line_style(*series, style);
            }
        }
    }
}

impl Default for DrawingManager {
    fn default() -> Self {
        Self::new(&DrawingConfig::default())
    }
}

fn segment_points(segment: &Segment) -> Vec<LinePoint> {
    segment.iter().map(ChartPoint::line_point).collect()
}

fn render(widget: &mut dyn ChartWidget, segments: &[Segment], style: LineStyle) -> Vec<SeriesId> {
    segments
        .iter()
        .map(|segment| widget.add_line_series(style, segment_points(segment)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::HeadlessChart;

    const DAY: i64 = 86_400;

    fn setup() -> (HeadlessChart, Vec<Bar>) {
        let bars: Vec<Bar> = (0..11).map(|i| Bar::flat(i * DAY, 10.0, 1.0)).collect();
        let mut chart = HeadlessChart::default();
        chart.set_all(&bars);
        chart.set_visible_logical_range(LogicalRange::new(0.0, 10.0));
        chart.set_price_range(Some((0.0, 20.0)));
        (chart, bars)
    }

    fn manager() -> DrawingManager {
        // Snapping off so clicks land exactly where placed.
        DrawingManager::new(&DrawingConfig {
            snap_threshold_px: 0.0,
            ..DrawingConfig::default()
        })
    }

    #[test]
    fn test_horizontal_line_is_continuous() {
        let (mut chart, bars) = setup();
        let mut drawing = manager();
        drawing.start(ToolKind::HorizontalLine, &mut chart);
        let now = Instant::now();

        for y in [100.0, 300.0] {
            let mut ctx = DrawContext::new(&mut chart, &bars, now);
            let outcome = drawing.on_pointer_click(&mut ctx, ScreenPos::new(200.0, y));
            assert!(matches!(outcome, ClickOutcome::Created(_)));
        }

        assert_eq!(drawing.len(), 2);
        assert_eq!(drawing.active_tool(), Some(ToolKind::HorizontalLine));
        assert!(drawing.pending_anchors().is_empty());
        assert_eq!(chart.series_count(), 2);
    }

    #[test]
    fn test_ray_rejected_when_second_anchor_earlier() {
        let (mut chart, bars) = setup();
        let mut drawing = manager();
        drawing.start(ToolKind::TrendRay, &mut chart);
        let now = Instant::now();

        let mut ctx = DrawContext::new(&mut chart, &bars, now);
        assert_eq!(drawing.on_pointer_click(&mut ctx, ScreenPos::new(400.0, 200.0)), ClickOutcome::AnchorPlaced);
        drawing.on_pointer_move(&mut ctx, ScreenPos::new(300.0, 150.0));
        let outcome = drawing.on_pointer_click(&mut ctx, ScreenPos::new(240.0, 150.0));

        assert_eq!(outcome, ClickOutcome::Rejected(BuildError::RayDirection));
        assert!(drawing.is_empty());
        assert_eq!(drawing.active_tool(), Some(ToolKind::TrendRay));
        assert!(drawing.pending_anchors().is_empty());
        assert_eq!(chart.series_count(), 0);
    }

    #[test]
    fn test_ray_preview_then_commit() {
        let (mut chart, bars) = setup();
        let mut drawing = manager();
        drawing.start(ToolKind::TrendRay, &mut chart);
        let now = Instant::now();

        let mut ctx = DrawContext::new(&mut chart, &bars, now);
        drawing.on_pointer_click(&mut ctx, ScreenPos::new(160.0, 200.0));
        drawing.on_pointer_move(&mut ctx, ScreenPos::new(240.0, 200.0));
        assert!(drawing.has_preview());
        drawing.on_pointer_move(&mut ctx, ScreenPos::new(320.0, 180.0));
        let outcome = drawing.on_pointer_click(&mut ctx, ScreenPos::new(320.0, 180.0));

        assert!(matches!(outcome, ClickOutcome::Created(_)));
        assert!(!drawing.has_preview());
        assert_eq!(drawing.mode(), &Mode::Navigate);
        assert_eq!(chart.series_count(), 1);
    }

    #[test]
    fn test_rectangle_renders_four_segments() {
        let (mut chart, bars) = setup();
        let mut drawing = manager();
        drawing.start(ToolKind::Rectangle, &mut chart);
        let now = Instant::now();

        let mut ctx = DrawContext::new(&mut chart, &bars, now);
        drawing.on_pointer_click(&mut ctx, ScreenPos::new(160.0, 100.0));
        drawing.on_pointer_move(&mut ctx, ScreenPos::new(400.0, 300.0));
        assert_eq!(ctx.widget.visible_logical_range(), Some(LogicalRange::new(0.0, 10.0)));
        drawing.on_pointer_click(&mut ctx, ScreenPos::new(480.0, 300.0));

        assert_eq!(drawing.len(), 1);
        assert_eq!(chart.series_count(), 4);
    }

    #[test]
    fn test_cancel_discards_anchor() {
        let (mut chart, bars) = setup();
        let mut drawing = manager();
        drawing.start(ToolKind::Rectangle, &mut chart);
        {
            let mut ctx = DrawContext::new(&mut chart, &bars, Instant::now());
            drawing.on_pointer_click(&mut ctx, ScreenPos::new(160.0, 100.0));
            drawing.on_pointer_move(&mut ctx, ScreenPos::new(400.0, 300.0));
        }
        drawing.cancel(&mut chart);
        assert!(drawing.is_empty());
        assert_eq!(drawing.mode(), &Mode::Navigate);
        assert_eq!(chart.series_count(), 0);
    }

    #[test]
    fn test_delete_mode_highlights_and_deletes() {
        let (mut chart, bars) = setup();
        let mut drawing = manager();
        let start = Instant::now();
        drawing.start(ToolKind::HorizontalLine, &mut chart);
        {
            let mut ctx = DrawContext::new(&mut chart, &bars, start);
            drawing.on_pointer_click(&mut ctx, ScreenPos::new(200.0, 200.0));
        }
        drawing.start_delete(&mut chart);

        let mut ctx = DrawContext::new(&mut chart, &bars, start);
        drawing.on_pointer_move(&mut ctx, ScreenPos::new(500.0, 203.0));
        let id = drawing.highlighted().unwrap();

        // Throttled: a move within 100ms is not re-tested.
        ctx.now = start + Duration::from_millis(50);
        drawing.on_pointer_move(&mut ctx, ScreenPos::new(500.0, 50.0));
        assert_eq!(drawing.highlighted(), Some(id));

        assert_eq!(drawing.on_pointer_click(&mut ctx, ScreenPos::new(500.0, 50.0)), ClickOutcome::Deleted(id));
        assert!(drawing.is_empty());
        assert_eq!(chart.series_count(), 0);
    }

    #[test]
    fn test_key_zoom_only_while_drawing() {
        let (mut chart, _) = setup();
        let mut drawing = manager();
        assert!(!drawing.on_key_zoom(true, &mut chart));
        assert_eq!(chart.visible_logical_range(), Some(LogicalRange::new(0.0, 10.0)));

        drawing.start(ToolKind::TrendRay, &mut chart);
        assert!(drawing.on_key_zoom(true, &mut chart));
        assert!(drawing.user_adjusted_view());
        let range = chart.visible_logical_range().unwrap();
        assert!((range.span() - 8.0).abs() < 1e-9);

        drawing.cancel(&mut chart);
        assert!(!drawing.user_adjusted_view());
    }

    #[test]
    fn test_sync_extent_stretches_horizontal_lines() {
        let (mut chart, mut bars) = setup();
        let mut drawing = manager();
        drawing.start(ToolKind::HorizontalLine, &mut chart);
        {
            let mut ctx = DrawContext::new(&mut chart, &bars, Instant::now());
            drawing.on_pointer_click(&mut ctx, ScreenPos::new(200.0, 200.0));
        }
        bars.push(Bar::flat(20 * DAY, 10.0, 1.0));
        drawing.sync_extent(&mut chart, &bars);

        let series = chart.series(SeriesId(1)).unwrap();
        assert_eq!(series.points.last().unwrap().time, 20 * DAY);
    }
}
