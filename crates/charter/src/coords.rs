//! Screen-space geometry shared by the viewport and annotation code.
//!
//! All positions here are pixels from the top-left of the plotting area:
//! X increases to the right, Y increases downward. Conversions between
//! pixels and (time, price) belong to the widget, see [`crate::widget`].

/// Screen coordinates in pixels from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPos {
    pub x: f32,
    pub y: f32,
}

impl ScreenPos {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(self, other: ScreenPos) -> f32 {
        self.distance_squared_to(other).sqrt()
    }

    /// Squared distance, for comparisons.
    #[must_use]
    pub fn distance_squared_to(self, other: ScreenPos) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Shortest distance from this point to the segment `a`-`b`.
    #[must_use]
    pub fn distance_to_segment(self, a: ScreenPos, b: ScreenPos) -> f32 {
        let abx = b.x - a.x;
        let aby = b.y - a.y;
        let len_sq = abx * abx + aby * aby;
        if len_sq <= f32::EPSILON {
            return self.distance_to(a);
        }
        let t = (((self.x - a.x) * abx + (self.y - a.y) * aby) / len_sq).clamp(0.0, 1.0);
        self.distance_to(ScreenPos::new(a.x + t * abx, a.y + t * aby))
    }
}

impl From<(f32, f32)> for ScreenPos {
    fn from(pos: (f32, f32)) -> Self {
        Self::new(pos.0, pos.1)
    }
}

/// Size of the plotting area in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub width: f32,
    pub height: f32,
}

impl PlotArea {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn contains(self, pos: ScreenPos) -> bool {
        pos.x >= 0.0 && pos.x <= self.width && pos.y >= 0.0 && pos.y <= self.height
    }

    /// Where the ray from `origin` through `through` leaves the area.
    ///
    /// Only the right, top and bottom edges are considered, so the ray must
    /// point rightwards. Returns `None` for a ray that does not, or that never
    /// crosses one of those edges ahead of `origin`.
    #[must_use]
    pub fn ray_exit(self, origin: ScreenPos, through: ScreenPos) -> Option<ScreenPos> {
        let dx = through.x - origin.x;
        let dy = through.y - origin.y;
        if dx <= 0.0 {
            return None;
        }

        let mut t = (self.width - origin.x) / dx;
        if dy < 0.0 {
            t = t.min((0.0 - origin.y) / dy);
        } else if dy > 0.0 {
            t = t.min((self.height - origin.y) / dy);
        }

        (t > 0.0 && t.is_finite()).then(|| ScreenPos::new(origin.x + dx * t, origin.y + dy * t))
    }
}

impl Default for PlotArea {
    fn default() -> Self {
        Self::new(800.0, 400.0)
    }
}
