//! Annotation types and the per-tool behavior table.

use crate::widget::{ChartWidget, LinePoint};

/// Unique identifier for a placed annotation.
///
/// Ids come from the owning [`super::DrawingManager`], so two managers never
/// share a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(pub u64);

/// A point in chart space, remembering whether it was captured by snapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub time: i64,
    pub price: f64,
    /// Whether this point was snapped to an OHLC value.
    pub snapped: bool,
}

impl ChartPoint {
    pub fn raw(time: i64, price: f64) -> Self {
        Self {
            time,
            price,
            snapped: false,
        }
    }

    pub fn snapped(time: i64, price: f64) -> Self {
        Self {
            time,
            price,
            snapped: true,
        }
    }

    pub fn line_point(&self) -> LinePoint {
        LinePoint::new(self.time, self.price)
    }
}

/// A two-point line in chart space.
pub type Segment = [ChartPoint; 2];

/// A placed drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Full-width line at one price.
    HorizontalLine { id: AnnotationId, anchor: ChartPoint },
    /// Line at one time spanning the price range visible when it was placed.
    VerticalLine {
        id: AnnotationId,
        anchor: ChartPoint,
        top: f64,
        bottom: f64,
    },
    /// Line from the first anchor through the second to the viewport edge.
    ///
    /// `far` is computed once at creation and never re-clipped.
    TrendRay {
        id: AnnotationId,
        anchors: [ChartPoint; 2],
        far: ChartPoint,
    },
    /// Axis-aligned box between two opposite corners.
    Rectangle { id: AnnotationId, corners: [ChartPoint; 2] },
}

impl Annotation {
    pub fn id(&self) -> AnnotationId {
        match self {
            Annotation::HorizontalLine { id, .. }
            | Annotation::VerticalLine { id, .. }
            | Annotation::TrendRay { id, .. }
            | Annotation::Rectangle { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Annotation::HorizontalLine { .. } => ToolKind::HorizontalLine,
            Annotation::VerticalLine { .. } => ToolKind::VerticalLine,
            Annotation::TrendRay { .. } => ToolKind::TrendRay,
            Annotation::Rectangle { .. } => ToolKind::Rectangle,
        }
    }

    /// The user-placed points.
    pub fn anchors(&self) -> Vec<ChartPoint> {
        match self {
            Annotation::HorizontalLine { anchor, .. } | Annotation::VerticalLine { anchor, .. } => vec![*anchor],
            Annotation::TrendRay { anchors, .. } => anchors.to_vec(),
            Annotation::Rectangle { corners, .. } => corners.to_vec(),
        }
    }

    /// Line segments that render this annotation.
    ///
    /// Horizontal lines span `extent` (first and last time of the loaded
    /// data) and have no segments without one.
    pub fn segments(&self, extent: Option<(i64, i64)>) -> Vec<Segment> {
        match self {
            Annotation::HorizontalLine { anchor, .. } => extent
                .map(|(from, to)| {
                    vec![[
                        ChartPoint::raw(from, anchor.price),
                        ChartPoint::raw(to, anchor.price),
                    ]]
                })
                .unwrap_or_default(),
            Annotation::VerticalLine { anchor, top, bottom, .. } => vec![[
                ChartPoint::raw(anchor.time, *top),
                ChartPoint::raw(anchor.time, *bottom),
            ]],
            Annotation::TrendRay { anchors, far, .. } => vec![[anchors[0], *far]],
            Annotation::Rectangle { corners, .. } => {
                let left = corners[0].time.min(corners[1].time);
                let right = corners[0].time.max(corners[1].time);
                let low = corners[0].price.min(corners[1].price);
                let high = corners[0].price.max(corners[1].price);
                let p = ChartPoint::raw;
                vec![
                    [p(left, high), p(right, high)],
                    [p(left, low), p(right, low)],
                    [p(left, low), p(left, high)],
                    [p(right, low), p(right, high)],
                ]
            }
        }
    }
}

/// Why a tool could not turn its anchors into an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// Second ray anchor is not later than the first.
    RayDirection,
    /// The widget could not convert a coordinate right now.
    Unrenderable,
    /// Fewer anchors than the tool needs.
    MissingAnchor,
}

type BuildFn = fn(AnnotationId, &[ChartPoint], &dyn ChartWidget) -> Result<Annotation, BuildError>;

/// What a tool needs and how it builds its annotation.
pub struct ToolBehavior {
    pub label: &'static str,
    /// Anchors placed before the annotation is built.
    pub anchors: usize,
    /// Whether the tool restarts itself after each annotation.
    pub continuous: bool,
    pub build: BuildFn,
}

impl std::fmt::Debug for ToolBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBehavior")
            .field("label", &self.label)
            .field("anchors", &self.anchors)
            .field("continuous", &self.continuous)
            .finish()
    }
}

/// Available drawing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    HorizontalLine,
    VerticalLine,
    TrendRay,
    Rectangle,
}

static HORIZONTAL_LINE: ToolBehavior = ToolBehavior {
    label: "H-Line",
    anchors: 1,
    continuous: true,
    build: build_horizontal,
};

static VERTICAL_LINE: ToolBehavior = ToolBehavior {
    label: "V-Line",
    anchors: 1,
    continuous: true,
    build: build_vertical,
};

static TREND_RAY: ToolBehavior = ToolBehavior {
    label: "Ray",
    anchors: 2,
    continuous: false,
    build: build_ray,
};

static RECTANGLE: ToolBehavior = ToolBehavior {
    label: "Box",
    anchors: 2,
    continuous: false,
    build: build_rectangle,
};

impl ToolKind {
    pub fn behavior(&self) -> &'static ToolBehavior {
        match self {
            ToolKind::HorizontalLine => &HORIZONTAL_LINE,
            ToolKind::VerticalLine => &VERTICAL_LINE,
            ToolKind::TrendRay => &TREND_RAY,
            ToolKind::Rectangle => &RECTANGLE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.behavior().label
    }

    pub fn all() -> &'static [ToolKind] {
        &[
            ToolKind::HorizontalLine,
            ToolKind::VerticalLine,
            ToolKind::TrendRay,
            ToolKind::Rectangle,
        ]
    }
}

fn build_horizontal(id: AnnotationId, anchors: &[ChartPoint], _: &dyn ChartWidget) -> Result<Annotation, BuildError> {
    let anchor = *anchors.first().ok_or(BuildError::MissingAnchor)?;
    Ok(Annotation::HorizontalLine { id, anchor })
}

fn build_vertical(id: AnnotationId, anchors: &[ChartPoint], widget: &dyn ChartWidget) -> Result<Annotation, BuildError> {
    let anchor = *anchors.first().ok_or(BuildError::MissingAnchor)?;
    let area = widget.plot_area();
    let top = widget.y_to_price(0.0).ok_or(BuildError::Unrenderable)?;
    let bottom = widget.y_to_price(area.height).ok_or(BuildError::Unrenderable)?;
    Ok(Annotation::VerticalLine {
        id,
        anchor,
        top,
        bottom,
    })
}

/// Clip the ray through both anchors against the right, top and bottom edges.
fn build_ray(id: AnnotationId, anchors: &[ChartPoint], widget: &dyn ChartWidget) -> Result<Annotation, BuildError> {
    let [first, second] = match anchors {
        [a, b, ..] => [*a, *b],
        _ => return Err(BuildError::MissingAnchor),
    };
    if second.time <= first.time {
        return Err(BuildError::RayDirection);
    }

    let origin = widget
        .to_screen(first.time, first.price)
        .ok_or(BuildError::Unrenderable)?;
    let through = widget
        .to_screen(second.time, second.price)
        .ok_or(BuildError::Unrenderable)?;
    let exit = widget
        .plot_area()
        .ray_exit(origin, through)
        .ok_or(BuildError::Unrenderable)?;
    let (time, price) = widget.from_screen(exit).ok_or(BuildError::Unrenderable)?;

    Ok(Annotation::TrendRay {
        id,
        anchors: [first, second],
        far: ChartPoint::raw(time, price),
    })
}

fn build_rectangle(id: AnnotationId, anchors: &[ChartPoint], _: &dyn ChartWidget) -> Result<Annotation, BuildError> {
    match anchors {
        [a, b, ..] => Ok(Annotation::Rectangle { id, corners: [*a, *b] }),
        _ => Err(BuildError::MissingAnchor),
    }
}
