use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::{CellSize, Error, Point, Result};

/// Affine transformation mapping pixel (col, row) coordinates to map coordinates.
///
/// The coefficients are in the order: [top left x, pixel width, row rotation,
/// top left y, column rotation, pixel height]. Only north-up, axis-aligned
/// transforms (zero rotation terms, negative pixel height) are supported by
/// the matching code.
#[derive(Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    pub fn from_top_left_and_cell_size(top_left: Point, cell_size: CellSize) -> Self {
        Self::new([top_left.x(), cell_size.x(), 0.0, top_left.y(), 0.0, cell_size.y()])
    }

    /// Translates a pixel position to a point in map coordinates.
    /// Pixel (0, 0) is the top left corner of the raster.
    pub fn apply(&self, col: f64, row: f64) -> Point {
        let [ox, px, row_rot, oy, col_rot, py] = self.0;
        Point::new(ox + px * col + row_rot * row, oy + col_rot * col + py * row)
    }

    /// Translates a map coordinate to a fractional (col, row) pixel position.
    pub fn apply_inverse(&self, p: Point) -> Result<(f64, f64)> {
        let inv = self.invert()?;
        let pixel = inv.apply(p.x(), p.y());
        Ok((pixel.x(), pixel.y()))
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.0[0], self.0[3])
    }

    pub fn set_top_left(&mut self, p: Point) {
        self.0[0] = p.x();
        self.0[3] = p.y();
    }

    /// The horizontal cell size
    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    /// The vertical cell size (negative for north-up rasters)
    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    pub fn cell_size(&self) -> CellSize {
        CellSize::new(self.0[1], self.0[5])
    }

    pub fn is_north_up(&self) -> bool {
        self.0[5] < 0.0 && self.0[1] > 0.0
    }

    pub fn is_rotated(&self) -> bool {
        self.0[2] != 0.0 || self.0[4] != 0.0
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    pub fn invert(&self) -> Result<Self> {
        let [ox, px, row_rot, oy, col_rot, py] = self.0;

        // the linear part inverts like any 2x2 matrix
        let det = px * py - row_rot * col_rot;
        let magnitude = [px, row_rot, col_rot, py].into_iter().fold(0.0_f64, |m, c| m.max(c.abs()));
        if det.abs() <= 1e-10 * magnitude * magnitude {
            return Err(Error::Runtime(
                "GeoTransform::invert: determinant is too small, cannot compute the inverse".to_string(),
            ));
        }

        let a = py / det;
        let b = -row_rot / det;
        let c = -col_rot / det;
        let d = px / det;

        // the inverse maps the forward origin back onto pixel (0, 0)
        Ok(GeoTransform([-(a * ox + b * oy), a, b, -(c * ox + d * oy), c, d]))
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(geo_trans: GeoTransform) -> [f64; 6] {
        geo_trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origin = self.top_left();
        write!(
            f,
            "GeoTransform {{ origin: ({}, {}), cell size: {}x{} }}",
            origin.x(),
            origin.y(),
            self.cell_size_x(),
            self.cell_size_y()
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}
