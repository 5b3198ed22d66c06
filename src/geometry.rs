//! Rectangles in the two coordinate frames used when placing highlights
//!
//! Text layout works in *search space* (origin at the top-left corner of the
//! page, y grows downward). PDF annotation objects live in *annotation space*
//! (origin at the bottom-left corner, y grows upward). The two frames get
//! distinct types so a rectangle can only cross between them through
//! [`SearchRect::to_annotation`] and [`AnnotRect::to_search`].

/// A rectangle in search space (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRect {
    pub x0: f32,
    /// Top edge
    pub y0: f32,
    pub x1: f32,
    /// Bottom edge
    pub y1: f32,
}

/// A rectangle in annotation space (bottom-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotRect {
    pub x0: f32,
    /// Bottom edge
    pub y0: f32,
    pub x1: f32,
    /// Top edge
    pub y1: f32,
}

/// Quad points for one rectangle: `[x0, top, x1, top, x0, bottom, x1, bottom]`
pub type QuadPoint = [f32; 8];

impl SearchRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Inclusive containment of `other` within `self`
    pub fn contains(&self, other: &SearchRect) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1 && other.y0 >= self.y0 && other.y1 <= self.y1
    }

    /// True when the two rectangles share a region of non-zero area
    pub fn intersects(&self, other: &SearchRect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn union(&self, other: &SearchRect) -> SearchRect {
        SearchRect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Flip into annotation space for a page of the given height
    pub fn to_annotation(&self, page_height: f32) -> AnnotRect {
        AnnotRect {
            x0: self.x0,
            y0: page_height - self.y1,
            x1: self.x1,
            y1: page_height - self.y0,
        }
    }
}

impl AnnotRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build from two arbitrary corners, ordering the coordinates
    pub fn from_corners(ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Flip into search space for a page of the given height
    pub fn to_search(&self, page_height: f32) -> SearchRect {
        SearchRect {
            x0: self.x0,
            y0: page_height - self.y1,
            x1: self.x1,
            y1: page_height - self.y0,
        }
    }

    /// Quad points in the order PDF viewers expect for highlights
    pub fn quad_points(&self) -> QuadPoint {
        [
            self.x0, self.y1, self.x1, self.y1, self.x0, self.y0, self.x1, self.y0,
        ]
    }
}

/// Convert search-space rectangles into annotation space.
///
/// Must be applied exactly once, right before geometry leaves the resolver.
pub fn invert_coordinates(rects: &[SearchRect], page_height: f32) -> Vec<AnnotRect> {
    rects.iter().map(|r| r.to_annotation(page_height)).collect()
}

/// Decode a flat quad point array back into one rectangle per quad.
///
/// Each group of 8 floats contributes `(q[0], q[5], q[6], q[1])`, i.e. the
/// bottom-left and top-right corners. A trailing partial group is ignored.
pub fn quad_points_to_rects(quad_points: &[f32]) -> Vec<AnnotRect> {
    quad_points
        .chunks_exact(8)
        .map(|q| AnnotRect::new(q[0], q[5], q[6], q[1]))
        .collect()
}

/// Encode annotation-space rectangles as quad points, one set per rectangle
pub fn rects_to_quad_points(rects: &[AnnotRect]) -> Vec<QuadPoint> {
    rects.iter().map(AnnotRect::quad_points).collect()
}

/// Smallest rectangle covering every corner of every input rectangle
pub fn bounding_rect(rects: &[AnnotRect]) -> Option<AnnotRect> {
    let first = rects.first()?;
    let mut bound = AnnotRect::from_corners(first.x0, first.y0, first.x1, first.y1);
    for r in &rects[1..] {
        bound.x0 = bound.x0.min(r.x0).min(r.x1);
        bound.y0 = bound.y0.min(r.y0).min(r.y1);
        bound.x1 = bound.x1.max(r.x0).max(r.x1);
        bound.y1 = bound.y1.max(r.y0).max(r.y1);
    }
    Some(bound)
}
