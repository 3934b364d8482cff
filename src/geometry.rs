//! Polygon and grid arithmetic used to place the matching window.

use geo::{Area, BooleanOps};
use geo_types::Polygon;

use crate::{Error, GeoTransform, Point, Rect, Result};

/// The overlap region of two footprints.
#[derive(Debug, Clone)]
pub struct OverlapInfo {
    pub polygon: Polygon<f64>,
    pub area: f64,
    /// Overlap area as a percentage of the target footprint.
    pub percentage: f64,
}

/// Intersects two footprint polygons. Fails when the footprints do not
/// overlap. When the intersection falls apart into multiple parts the
/// largest part is used.
pub fn overlap_polygon(reference: &Polygon<f64>, target: &Polygon<f64>) -> Result<OverlapInfo> {
    let intersection = reference.intersection(target);

    let polygon = intersection
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
        .ok_or_else(|| Error::InsufficientOverlap("the input images have no spatial overlap".to_string()))?;

    let area = polygon.unsigned_area();
    if area <= 0.0 {
        return Err(Error::InsufficientOverlap("the input images have no spatial overlap".to_string()));
    }

    let target_area = target.unsigned_area();
    let percentage = if target_area > 0.0 { 100.0 * area / target_area } else { 0.0 };

    Ok(OverlapInfo { polygon, area, percentage })
}

/// True when `inner` is covered by `outer` (shared boundaries allowed).
/// Evaluated through the intersection area so boundary jitter from earlier
/// polygon clipping does not flip the result.
pub fn polygon_within(inner: &Polygon<f64>, outer: &Polygon<f64>) -> bool {
    let inner_area = inner.unsigned_area();
    if inner_area <= 0.0 {
        return false;
    }

    let common = inner.intersection(outer).unsigned_area();
    (inner_area - common) <= inner_area * 1e-9
}

/// Translates the rectangle so its north-west corner coincides with the
/// nearest pixel edge of the grid. No rotation or scaling.
pub fn snap_rect_to_grid(rect: &Rect, gt: &GeoTransform) -> Rect {
    let origin = gt.top_left();
    let px = gt.cell_size_x();
    let py = gt.cell_size_y();

    let nw = rect.top_left();
    let snapped_x = origin.x() + ((nw.x() - origin.x()) / px).round() * px;
    let snapped_y = origin.y() + ((nw.y() - origin.y()) / py).round() * py;

    let dx = snapped_x - nw.x();
    let dy = snapped_y - nw.y();

    Rect::from_nw_se(
        Point::new(snapped_x, snapped_y),
        Point::new(rect.bottom_right().x() + dx, rect.bottom_right().y() + dy),
    )
}

/// Fractional pixel bounds of a map rectangle on the given grid:
/// (col0, row0, col1, row1) with row0/col0 the north-west corner.
pub fn rect_to_pixel_bounds(rect: &Rect, gt: &GeoTransform) -> (f64, f64, f64, f64) {
    let origin = gt.top_left();
    let px = gt.cell_size_x();
    let py = gt.cell_size_y();

    let col0 = (rect.top_left().x() - origin.x()) / px;
    let row0 = (rect.top_left().y() - origin.y()) / py;
    let col1 = (rect.bottom_right().x() - origin.x()) / px;
    let row1 = (rect.bottom_right().y() - origin.y()) / py;

    (col0, row0, col1, row1)
}

/// Angle of the shift vector in degrees clockwise from north, in [0, 360).
/// `dy` is in pixel units, i.e. positive towards the south.
pub fn angle_to_north(dx: f64, dy: f64) -> f64 {
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }

    let angle = f64::atan2(dx, -dy).to_degrees();
    (angle + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn rect_poly(x0: f64, y1: f64, x1: f64, y0: f64) -> Polygon<f64> {
        Rect::from_nw_se(Point::new(x0, y1), Point::new(x1, y0)).into()
    }

    #[test]
    fn overlap_of_shifted_squares() {
        let a = rect_poly(0.0, 10.0, 10.0, 0.0);
        let b = rect_poly(5.0, 15.0, 15.0, 5.0);

        let overlap = overlap_polygon(&a, &b).unwrap();
        assert_abs_diff_eq!(overlap.area, 25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(overlap.percentage, 25.0, epsilon = 1e-9);
    }

    #[test]
    fn disjoint_footprints_fail() {
        let a = rect_poly(0.0, 10.0, 10.0, 0.0);
        let b = rect_poly(20.0, 30.0, 30.0, 20.0);

        assert!(matches!(overlap_polygon(&a, &b), Err(Error::InsufficientOverlap(_))));
    }

    #[test]
    fn within_allows_shared_boundaries() {
        let outer = rect_poly(0.0, 10.0, 10.0, 0.0);
        let inner = rect_poly(0.0, 10.0, 5.0, 5.0);
        let crossing = rect_poly(5.0, 15.0, 15.0, 5.0);

        assert!(polygon_within(&inner, &outer));
        assert!(polygon_within(&outer, &outer));
        assert!(!polygon_within(&crossing, &outer));
    }

    #[test]
    fn snapping_moves_to_the_nearest_pixel_edge() {
        let gt = GeoTransform::new([100.0, 10.0, 0.0, 500.0, 0.0, -10.0]);
        let rect = Rect::from_nw_se(Point::new(123.0, 487.0), Point::new(163.0, 447.0));

        let snapped = snap_rect_to_grid(&rect, &gt);
        assert_eq!(snapped.top_left(), Point::new(120.0, 490.0));
        // size is preserved
        assert_abs_diff_eq!(snapped.width(), rect.width(), epsilon = 1e-9);
        assert_abs_diff_eq!(snapped.height(), rect.height(), epsilon = 1e-9);
    }

    #[test]
    fn angles() {
        assert_abs_diff_eq!(angle_to_north(0.0, -1.0), 0.0);
        assert_abs_diff_eq!(angle_to_north(1.0, 0.0), 90.0);
        assert_abs_diff_eq!(angle_to_north(0.0, 1.0), 180.0);
        assert_abs_diff_eq!(angle_to_north(-1.0, 0.0), 270.0);
        assert_abs_diff_eq!(angle_to_north(3.0, -2.0), f64::atan2(3.0, 2.0).to_degrees(), epsilon = 1e-9);
    }
}
