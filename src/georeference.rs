use approx::{AbsDiffEq, RelativeEq};

use crate::{Cell, Error, GeoTransform, Point, RasterSize, Rect, Result};

/// Horizontal and vertical size of a raster cell in map units.
/// The vertical size is negative for north-up rasters.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellSize {
    x: f64,
    y: f64,
}

impl CellSize {
    pub fn new(x: f64, y: f64) -> Self {
        CellSize { x, y }
    }

    pub fn square(size: f64) -> Self {
        CellSize::new(size, -size)
    }

    pub fn is_valid(&self) -> bool {
        self.x != 0.0 && self.y != 0.0
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }
}

impl AbsDiffEq for CellSize {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        f64::abs_diff_eq(&self.x, &other.x, epsilon) && f64::abs_diff_eq(&self.y, &other.y, epsilon)
    }
}

impl RelativeEq for CellSize {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        f64::relative_eq(&self.x, &other.x, epsilon, max_relative) && f64::relative_eq(&self.y, &other.y, epsilon, max_relative)
    }
}

/// The metadata that georeferences a raster: projection identifier, pixel
/// grid size, geotransform and the optional nodata value.
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoReference {
    projection: String,
    size: RasterSize,
    geo_transform: GeoTransform,
    nodata: Option<f64>,
}

impl GeoReference {
    pub fn new<S: Into<String>>(projection: S, size: RasterSize, geo_transform: GeoTransform, nodata: Option<f64>) -> Self {
        GeoReference {
            projection: projection.into(),
            size,
            geo_transform,
            nodata,
        }
    }

    pub fn with_top_left_origin<S: Into<String>>(
        projection: S,
        size: RasterSize,
        top_left: Point,
        cell_size: CellSize,
        nodata: Option<f64>,
    ) -> Self {
        GeoReference::new(
            projection,
            size,
            GeoTransform::from_top_left_and_cell_size(top_left, cell_size),
            nodata,
        )
    }

    /// Fails when the geotransform is rotated or not north-up, the matching
    /// code only supports axis aligned grids.
    pub fn validated(self) -> Result<Self> {
        if self.geo_transform.is_rotated() {
            return Err(Error::InvalidArgument(format!(
                "Rotated geotransforms are not supported: {:?}",
                self.geo_transform
            )));
        }

        if !self.geo_transform.is_north_up() {
            return Err(Error::InvalidArgument(format!(
                "Only north-up geotransforms are supported: {:?}",
                self.geo_transform
            )));
        }

        Ok(self)
    }

    pub fn raster_size(&self) -> RasterSize {
        self.size
    }

    pub fn rows(&self) -> i32 {
        self.size.rows.count()
    }

    pub fn columns(&self) -> i32 {
        self.size.cols.count()
    }

    pub fn cell_size(&self) -> CellSize {
        self.geo_transform.cell_size()
    }

    pub fn cell_size_x(&self) -> f64 {
        self.geo_transform.cell_size_x()
    }

    pub fn cell_size_y(&self) -> f64 {
        self.geo_transform.cell_size_y()
    }

    pub fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    pub fn projection_equals(&self, other: &GeoReference) -> bool {
        self.projection.trim() == other.projection.trim()
    }

    fn coordinate_for_cell_fraction(&self, col: f64, row: f64) -> Point {
        self.geo_transform.apply(col, row)
    }

    pub fn cell_center(&self, cell: Cell) -> Point {
        self.coordinate_for_cell_fraction(cell.col as f64 + 0.5, cell.row as f64 + 0.5)
    }

    pub fn top_left(&self) -> Point {
        self.coordinate_for_cell_fraction(0.0, 0.0)
    }

    pub fn bottom_right(&self) -> Point {
        self.coordinate_for_cell_fraction(self.columns() as f64, self.rows() as f64)
    }

    /// Fractional (col, row) pixel position of a map coordinate.
    pub fn point_to_pixel_fraction(&self, p: Point) -> (f64, f64) {
        let gt = self.geo_transform.coefficients();
        ((p.x() - gt[0]) / gt[1], (p.y() - gt[3]) / gt[5])
    }

    pub fn point_to_cell(&self, p: Point) -> Cell {
        let (col, row) = self.point_to_pixel_fraction(p);
        Cell::from_row_col(row.floor() as i32, col.floor() as i32)
    }

    /// Like [`GeoReference::point_to_cell`] but rounds to the nearest cell edge,
    /// for points that are supposed to lie on the pixel grid.
    pub fn point_to_nearest_cell(&self, p: Point) -> Cell {
        let (col, row) = self.point_to_pixel_fraction(p);
        Cell::from_row_col(row.round() as i32, col.round() as i32)
    }

    pub fn is_cell_on_map(&self, cell: Cell) -> bool {
        cell.row >= 0 && cell.col >= 0 && cell.row < self.rows() && cell.col < self.columns()
    }

    pub fn is_point_on_map(&self, p: Point) -> bool {
        self.is_cell_on_map(self.point_to_cell(p))
    }

    pub fn bounding_box(&self) -> Rect {
        Rect::from_nw_se(self.top_left(), self.bottom_right())
    }

    /// The georeference of a sub window of this raster.
    pub fn window(&self, origin: Cell, size: RasterSize) -> GeoReference {
        let top_left = self.coordinate_for_cell_fraction(origin.col as f64, origin.row as f64);
        GeoReference::with_top_left_origin(self.projection.clone(), size, top_left, self.cell_size(), self.nodata)
    }

    /// True when the pixel grids share the same cell size and origin modulo
    /// whole cells, i.e. the rasters can be windowed into each other without
    /// resampling.
    pub fn grid_equals(&self, other: &GeoReference) -> bool {
        use approx::relative_eq;

        if !relative_eq!(self.cell_size(), other.cell_size(), epsilon = 1e-9) {
            return false;
        }

        let (col, row) = self.point_to_pixel_fraction(other.top_left());
        let aligned = |v: f64| (v - v.round()).abs() < 1e-6;
        aligned(col) && aligned(row)
    }
}

impl std::fmt::Display for GeoReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?} nodata: {:?}", self.size, self.geo_transform, self.nodata)
    }
}
