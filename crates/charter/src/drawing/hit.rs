//! Hit-testing placed annotations in screen space.

use std::collections::HashMap;

use super::types::{Annotation, AnnotationId, ChartPoint};
use crate::coords::ScreenPos;
use crate::widget::ChartWidget;

/// Memoized chart-to-screen conversions for a single hit-test pass.
///
/// Only reads from the widget; a fresh cache is built per pass so results
/// never outlive a pan or zoom.
pub struct ConversionCache<'a> {
    widget: &'a dyn ChartWidget,
    points: HashMap<(i64, u64), Option<ScreenPos>>,
    prices: HashMap<u64, Option<f32>>,
}

impl<'a> ConversionCache<'a> {
    pub fn new(widget: &'a dyn ChartWidget) -> Self {
        Self {
            widget,
            points: HashMap::new(),
            prices: HashMap::new(),
        }
    }

    pub fn point(&mut self, point: &ChartPoint) -> Option<ScreenPos> {
        let widget = self.widget;
        *self
            .points
            .entry((point.time, point.price.to_bits()))
            .or_insert_with(|| widget.to_screen(point.time, point.price))
    }

    pub fn price_y(&mut self, price: f64) -> Option<f32> {
        let widget = self.widget;
        *self
            .prices
            .entry(price.to_bits())
            .or_insert_with(|| widget.price_to_y(price))
    }

    pub fn len(&self) -> usize {
        self.points.len() + self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Screen distance from `pointer` to `annotation`, if it can be computed.
pub fn distance_to(cache: &mut ConversionCache<'_>, annotation: &Annotation, pointer: ScreenPos) -> Option<f32> {
    if let Annotation::HorizontalLine { anchor, .. } = annotation {
        return cache.price_y(anchor.price).map(|y| (pointer.y - y).abs());
    }

    annotation
        .segments(None)
        .iter()
        .filter_map(|[a, b]| {
            let a = cache.point(a)?;
            let b = cache.point(b)?;
            Some(pointer.distance_to_segment(a, b))
        })
        .min_by(|a, b| a.total_cmp(b))
}

/// Nearest annotation within `threshold_px` of the pointer.
pub fn nearest(
    widget: &dyn ChartWidget,
    annotations: &[Annotation],
    pointer: ScreenPos,
    threshold_px: f32,
) -> Option<AnnotationId> {
    let mut cache = ConversionCache::new(widget);
    annotations
        .iter()
        .filter_map(|a| Some((a.id(), distance_to(&mut cache, a, pointer)?)))
        .filter(|(_, d)| *d <= threshold_px)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}
