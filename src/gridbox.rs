//! A rectangular window on a raster grid.
//!
//! The box is stored canonically as a fractional pixel origin and pixel
//! dimensions on a fixed geotransform. Map polygon, pixel polygon and both
//! bounds flavours are derived on demand so they can never disagree.

use geo_types::Polygon;

use crate::{
    Cell, CellSize, GeoReference, GeoTransform, Point, RasterSize, RasterWindow, Rect,
    array::{Columns, Rows},
    geometry,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBox {
    gt: GeoTransform,
    origin_col: f64,
    origin_row: f64,
    cols: f64,
    rows: f64,
}

impl GridBox {
    /// Box centered on the map position `wp` with a size in map units.
    pub fn from_center_and_map_size(wp: Point, ws_map: (f64, f64), gt: &GeoTransform) -> Self {
        let origin = gt.top_left();
        let center_col = (wp.x() - origin.x()) / gt.cell_size_x();
        let center_row = (wp.y() - origin.y()) / gt.cell_size_y();

        let cols = ws_map.0 / gt.cell_size_x();
        let rows = ws_map.1 / gt.cell_size_y().abs();

        GridBox {
            gt: *gt,
            origin_col: center_col - cols / 2.0,
            origin_row: center_row - rows / 2.0,
            cols,
            rows,
        }
    }

    pub fn from_map_rect(rect: &Rect, gt: &GeoTransform) -> Self {
        let (col0, row0, col1, row1) = geometry::rect_to_pixel_bounds(rect, gt);
        GridBox {
            gt: *gt,
            origin_col: col0,
            origin_row: row0,
            cols: col1 - col0,
            rows: row1 - row0,
        }
    }

    pub fn from_im_bounds(origin_row: f64, origin_col: f64, rows: f64, cols: f64, gt: &GeoTransform) -> Self {
        GridBox {
            gt: *gt,
            origin_col,
            origin_row,
            cols,
            rows,
        }
    }

    pub fn geo_transform(&self) -> GeoTransform {
        self.gt
    }

    pub fn cell_size(&self) -> CellSize {
        self.gt.cell_size()
    }

    /// (origin_row, origin_col) in fractional pixel coordinates.
    pub fn im_origin(&self) -> (f64, f64) {
        (self.origin_row, self.origin_col)
    }

    /// (rows, cols) in fractional pixel units.
    pub fn im_dims_yx(&self) -> (f64, f64) {
        (self.rows, self.cols)
    }

    pub fn map_bounds(&self) -> Rect {
        let nw = self.gt.apply(self.origin_col, self.origin_row);
        let se = self.gt.apply(self.origin_col + self.cols, self.origin_row + self.rows);
        Rect::from_nw_se(nw, se)
    }

    pub fn map_poly(&self) -> Polygon<f64> {
        self.map_bounds().into()
    }

    pub fn center_map(&self) -> Point {
        self.map_bounds().center()
    }

    /// Grows (positive) or shrinks (negative) the box by the given number of
    /// pixels on each side, per axis.
    pub fn buffer_im_xy(&mut self, dx: f64, dy: f64) {
        self.origin_col -= dx;
        self.origin_row -= dy;
        self.cols = (self.cols + 2.0 * dx).max(0.0);
        self.rows = (self.rows + 2.0 * dy).max(0.0);
    }

    /// Moves the box so its north-west corner lies on a pixel edge of its
    /// own grid. The dimensions are preserved.
    pub fn snap_to_grid(&mut self) {
        let snapped = geometry::snap_rect_to_grid(&self.map_bounds(), &self.gt);
        let (col0, row0, _, _) = geometry::rect_to_pixel_bounds(&snapped, &self.gt);
        self.origin_col = col0;
        self.origin_row = row0;
    }

    /// Rounds the pixel coordinates of the box corners to whole pixels.
    pub fn round_im_poly(&mut self) {
        let end_col = (self.origin_col + self.cols).round();
        let end_row = (self.origin_row + self.rows).round();
        self.origin_col = self.origin_col.round();
        self.origin_row = self.origin_row.round();
        self.cols = end_col - self.origin_col;
        self.rows = end_row - self.origin_row;
    }

    /// Whether the box sticks out of the given map bounds, per axis.
    pub fn exceeds(&self, outer: &Rect) -> (bool, bool) {
        let bounds = self.map_bounds();
        let eps_x = self.gt.cell_size_x().abs() * 1e-9;
        let eps_y = self.gt.cell_size_y().abs() * 1e-9;

        let x_larger = bounds.top_left().x() < outer.top_left().x() - eps_x
            || bounds.bottom_right().x() > outer.bottom_right().x() + eps_x;
        let y_larger = bounds.top_left().y() > outer.top_left().y() + eps_y
            || bounds.bottom_right().y() < outer.bottom_right().y() - eps_y;

        (x_larger, y_larger)
    }

    /// The box as an integer pixel window for reading raster data.
    pub fn raster_window(&self) -> RasterWindow {
        RasterWindow::new(
            Cell::from_row_col(self.origin_row.round() as i32, self.origin_col.round() as i32),
            self.size(),
        )
    }

    pub fn size(&self) -> RasterSize {
        RasterSize::with_rows_cols(Rows(self.rows.round() as i32), Columns(self.cols.round() as i32))
    }

    /// Georeference of the box content, with the grid origin at the box
    /// north-west corner.
    pub fn geo_reference<S: Into<String>>(&self, projection: S, nodata: Option<f64>) -> GeoReference {
        let top_left = self.gt.apply(self.origin_col.round(), self.origin_row.round());
        GeoReference::with_top_left_origin(projection, self.size(), top_left, self.gt.cell_size(), nodata)
    }
}

/// The smallest pixel aligned box on `gt` whose map polygon contains the
/// given map rectangle.
pub fn smallest_box_containing(rect: &Rect, gt: &GeoTransform) -> GridBox {
    let (col0, row0, col1, row1) = geometry::rect_to_pixel_bounds(rect, gt);

    let col0 = (col0 + 1e-9).floor();
    let row0 = (row0 + 1e-9).floor();
    let col1 = (col1 - 1e-9).ceil();
    let row1 = (row1 - 1e-9).ceil();

    GridBox::from_im_bounds(row0, col0, row1 - row0, col1 - col0, gt)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn gt() -> GeoTransform {
        GeoTransform::new([0.0, 1.0, 0.0, 256.0, 0.0, -1.0])
    }

    #[test]
    fn center_construction() {
        let boxx = GridBox::from_center_and_map_size(Point::new(128.0, 128.0), (256.0, 256.0), &gt());

        let bounds = boxx.map_bounds();
        assert_eq!(bounds.top_left(), Point::new(0.0, 256.0));
        assert_eq!(bounds.bottom_right(), Point::new(256.0, 0.0));
        assert_eq!(boxx.im_dims_yx(), (256.0, 256.0));
    }

    #[test]
    fn buffering_grows_on_both_sides() {
        let mut boxx = GridBox::from_im_bounds(10.0, 10.0, 4.0, 4.0, &gt());
        boxx.buffer_im_xy(1.0, 2.0);

        assert_eq!(boxx.im_origin(), (8.0, 9.0));
        assert_eq!(boxx.im_dims_yx(), (8.0, 6.0));

        boxx.buffer_im_xy(-1.0, -2.0);
        assert_eq!(boxx.im_origin(), (10.0, 10.0));
        assert_eq!(boxx.im_dims_yx(), (4.0, 4.0));
    }

    #[test]
    fn snapping_preserves_size() {
        let mut boxx = GridBox::from_im_bounds(10.3, 9.6, 16.0, 16.0, &gt());
        boxx.snap_to_grid();

        assert_eq!(boxx.im_origin(), (10.0, 10.0));
        assert_eq!(boxx.im_dims_yx(), (16.0, 16.0));
    }

    #[test]
    fn smallest_containing_box_is_pixel_aligned() {
        let rect = Rect::from_nw_se(Point::new(10.4, 245.7), Point::new(20.2, 235.1));
        let boxx = smallest_box_containing(&rect, &gt());

        assert_eq!(boxx.im_origin(), (10.0, 10.0));
        assert_eq!(boxx.im_dims_yx(), (11.0, 11.0));

        let bounds = boxx.map_bounds();
        assert!(bounds.contains_rect(&rect, 1e-9));
        assert_abs_diff_eq!(bounds.top_left().x(), 10.0);
        assert_abs_diff_eq!(bounds.top_left().y(), 246.0);
    }

    #[test]
    fn exceeds_detects_oversize_axes() {
        let outer = Rect::from_nw_se(Point::new(0.0, 256.0), Point::new(256.0, 0.0));
        let inside = GridBox::from_im_bounds(10.0, 10.0, 16.0, 16.0, &gt());
        let too_wide = GridBox::from_im_bounds(10.0, -5.0, 16.0, 300.0, &gt());

        assert_eq!(inside.exceeds(&outer), (false, false));
        assert_eq!(too_wide.exceeds(&outer), (true, false));
    }
}
