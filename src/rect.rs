//! Axis-aligned rectangle in map coordinates (y grows northwards).

use approx::AbsDiffEq;

use crate::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    top_left: Point,
    bottom_right: Point,
}

impl Default for Rect {
    fn default() -> Self {
        Rect::from_nw_se(Point::new(0.0, 0.0), Point::new(0.0, 0.0))
    }
}

impl Rect {
    pub fn from_points(p1: Point, p2: Point) -> Self {
        let (x0, x1) = sorted(p1.x(), p2.x());
        let (y0, y1) = sorted(p1.y(), p2.y());

        Rect::from_nw_se(Point::new(x0, y1), Point::new(x1, y0))
    }

    pub fn from_nw_se(nw: Point, se: Point) -> Self {
        Rect {
            top_left: nw,
            bottom_right: se,
        }
    }

    pub fn width(&self) -> f64 {
        (self.bottom_right.x() - self.top_left.x()).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.top_left.y() - self.bottom_right.y()).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn top_left(&self) -> Point {
        self.top_left
    }

    pub fn top_right(&self) -> Point {
        Point::new(self.bottom_right.x(), self.top_left.y())
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.top_left.x(), self.bottom_right.y())
    }

    pub fn bottom_right(&self) -> Point {
        self.bottom_right
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.top_left.x() + self.bottom_right.x()) / 2.0,
            (self.top_left.y() + self.bottom_right.y()) / 2.0,
        )
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::default();
        }

        let left = self.top_left.x().max(other.top_left.x());
        let right = self.bottom_right.x().min(other.bottom_right.x());
        let top = self.top_left.y().min(other.top_left.y());
        let bottom = self.bottom_right.y().max(other.bottom_right.y());

        if left >= right || bottom >= top {
            return Rect::default();
        }

        Rect::from_nw_se(Point::new(left, top), Point::new(right, bottom))
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Containment check with a tolerance for floating point jitter on the edges.
    pub fn contains_rect(&self, inner: &Rect, epsilon: f64) -> bool {
        inner.top_left.x() >= self.top_left.x() - epsilon
            && inner.top_left.y() <= self.top_left.y() + epsilon
            && inner.bottom_right.x() <= self.bottom_right.x() + epsilon
            && inner.bottom_right.y() >= self.bottom_right.y() - epsilon
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x() >= self.top_left.x() && p.x() <= self.bottom_right.x() && p.y() <= self.top_left.y() && p.y() >= self.bottom_right.y()
    }
}

fn sorted(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

impl From<Rect> for geo_types::Polygon<f64> {
    fn from(rect: Rect) -> geo_types::Polygon<f64> {
        let (nw, se) = (rect.top_left(), rect.bottom_right());
        let ring = vec![
            (nw.x(), nw.y()),
            (se.x(), nw.y()),
            (se.x(), se.y()),
            (nw.x(), se.y()),
            (nw.x(), nw.y()),
        ];

        geo_types::Polygon::new(ring.into(), Vec::new())
    }
}

impl AbsDiffEq for Rect {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.top_left.abs_diff_eq(&other.top_left, epsilon) && self.bottom_right.abs_diff_eq(&other.bottom_right, epsilon)
    }
}
