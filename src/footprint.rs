//! Footprint polygons describing the valid data region of a raster.

use geo::{Area, BooleanOps, ConvexHull, Validation};
use geo_types::{LineString, MultiPoint, Polygon};

use crate::{BandIndex, Error, GeoReference, Point, RasterView, Rect, Result};

/// Footprint covering the full raster extent.
pub fn from_extent(georef: &GeoReference) -> Polygon<f64> {
    georef.bounding_box().into()
}

/// Groups a flat `[x, y, x, y, ...]` coordinate list into corner points.
pub fn corners_from_flat(coords: &[f64]) -> Result<Vec<Point>> {
    if coords.len() < 6 || coords.len() % 2 != 0 {
        return Err(Error::InvalidArgument(format!(
            "Corner coordinate list must contain an even number of at least 6 values, got {}",
            coords.len()
        )));
    }

    Ok(coords.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect())
}

/// Builds a footprint polygon from corner coordinates. Corner orders that
/// produce a self intersecting ring are repaired.
pub fn from_corners(corners: &[Point]) -> Result<Polygon<f64>> {
    if corners.len() < 3 {
        return Err(Error::InvalidArgument(format!(
            "A footprint needs at least 3 corners, got {}",
            corners.len()
        )));
    }

    let mut ring: Vec<Point> = corners.to_vec();
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }

    Ok(repaired(Polygon::new(LineString::from(ring), Vec::default())))
}

/// Returns a valid version of the polygon. Self intersecting rings are
/// dissolved by overlaying the polygon with itself (the zero distance buffer
/// trick), which resolves the crossings without discarding concave parts of
/// the outline; when the ring falls apart the largest piece wins.
pub fn repaired(poly: Polygon<f64>) -> Polygon<f64> {
    if poly.is_valid() {
        return poly;
    }

    let largest = poly
        .union(&poly)
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()));

    match largest {
        Some(part) if part.unsigned_area() > 0.0 => part,
        // a fully degenerate ring carries no usable outline, the hull of its
        // points is all that is left
        _ => MultiPoint::from(poly.exterior().points().collect::<Vec<_>>()).convex_hull(),
    }
}

/// The bounding rectangle of the valid data in the given band, in map
/// coordinates. `None` when the band contains no valid data.
///
/// This is a cheap approximation of true data corner tracing, which is the
/// job of the footprint collaborator.
pub fn valid_data_bounds(raster: &dyn RasterView, band: BandIndex, nodata: Option<f64>) -> Result<Option<Rect>> {
    let Some(nodata) = nodata else {
        return Ok(Some(raster.geo_reference().bounding_box()));
    };

    let data = raster.read_band(band)?;
    let (mut min_row, mut max_row) = (i32::MAX, i32::MIN);
    let (mut min_col, mut max_col) = (i32::MAX, i32::MIN);

    for row in 0..data.rows() {
        for col in 0..data.columns() {
            let v = data.value(row, col);
            if v != nodata && !(v.is_nan() && nodata.is_nan()) {
                min_row = min_row.min(row as i32);
                max_row = max_row.max(row as i32);
                min_col = min_col.min(col as i32);
                max_col = max_col.max(col as i32);
            }
        }
    }

    if min_row > max_row {
        return Ok(None);
    }

    let georef = raster.geo_reference();
    let gt = georef.geo_transform();
    let nw = gt.apply(min_col as f64, min_row as f64);
    let se = gt.apply(max_col as f64 + 1.0, max_row as f64 + 1.0);

    Ok(Some(Rect::from_nw_se(nw, se)))
}
