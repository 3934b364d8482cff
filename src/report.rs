use crate::{GeoReference, GeoTransform};

/// Origin and pixel size of a raster in its projection, the part of the
/// georeferencing that shift correction updates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapInfo {
    pub projection: String,
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
}

impl MapInfo {
    pub fn from_geo_reference(georef: &GeoReference) -> Self {
        let gt = georef.geo_transform();
        MapInfo {
            projection: georef.projection().to_string(),
            origin_x: gt.top_left().x(),
            origin_y: gt.top_left().y(),
            pixel_size_x: gt.cell_size_x(),
            pixel_size_y: gt.cell_size_y(),
        }
    }

    /// The same grid with the origin moved by the given map shift.
    pub fn shifted_origin(&self, x_shift_map: f64, y_shift_map: f64) -> Self {
        MapInfo {
            origin_x: self.origin_x + x_shift_map,
            origin_y: self.origin_y + y_shift_map,
            ..self.clone()
        }
    }

    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform::new([self.origin_x, self.pixel_size_x, 0.0, self.origin_y, 0.0, self.pixel_size_y])
    }
}

impl std::fmt::Display for MapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "origin: ({}, {}), pixel size: ({}, {}), projection: {}",
            self.origin_x, self.origin_y, self.pixel_size_x, self.pixel_size_y, self.projection
        )
    }
}

/// Everything the warping collaborator needs to correct the detected shift
/// of the target image.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiftReport {
    /// Shift in target image pixel units, `None` when the run failed.
    pub shift_px: Option<(f64, f64)>,
    /// Shift in map units, `None` when the run failed.
    pub shift_map: Option<(f64, f64)>,
    pub original_map_info: MapInfo,
    pub updated_map_info: Option<MapInfo>,
    pub reference_projection: String,
    pub reference_geo_transform: GeoTransform,
    /// x and y coordinates of the top left 2x2 grid nodes of the reference
    /// image, anchoring the grid the correction aligns to.
    pub reference_grid: [[f64; 2]; 2],
    /// `None` while the run has not finished.
    pub success: Option<bool>,
}

impl ShiftReport {
    /// The same correction with the shift direction reversed, for fitting
    /// the reference image onto the target instead of the other way around.
    ///
    /// `subject_georef` is the georeference of the image the inverted
    /// correction gets applied to (the reference image); the original and
    /// updated map info are rebased onto its grid, and the grid anchor
    /// fields switch to the image the forward correction was computed for.
    pub fn inverted(&self, subject_georef: &GeoReference) -> ShiftReport {
        let original_map_info = MapInfo::from_geo_reference(subject_georef);
        let updated_map_info = self.shift_map.map(|(x, y)| original_map_info.shifted_origin(-x, -y));

        let forward_gt = self.original_map_info.geo_transform().coefficients();

        ShiftReport {
            shift_px: self.shift_px.map(|(x, y)| (-x, -y)),
            shift_map: self.shift_map.map(|(x, y)| (-x, -y)),
            original_map_info,
            updated_map_info,
            reference_projection: self.original_map_info.projection.clone(),
            reference_geo_transform: self.original_map_info.geo_transform(),
            reference_grid: [
                [forward_gt[0], forward_gt[0] + forward_gt[1]],
                [forward_gt[3], forward_gt[3] + forward_gt[5]],
            ],
            success: self.success,
        }
    }
}

/// The outcome of a coregistration run. Shift fields stay `None` on any
/// failure; `success` is `None` until the run has been executed.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiftResult {
    /// Shift in target image pixel units.
    pub x_shift_px: Option<f64>,
    pub y_shift_px: Option<f64>,
    /// Shift in map units.
    pub x_shift_map: Option<f64>,
    pub y_shift_map: Option<f64>,
    /// Length of the shift vector in map units.
    pub vec_length_map: Option<f64>,
    /// Angle of the shift vector in degrees from north.
    pub vec_angle_deg: Option<f64>,
    /// 0..100 reliability score of the detected shift.
    pub reliability: Option<f64>,
    /// SSIM of the matching window before shift correction.
    pub ssim_before: Option<f64>,
    /// SSIM of the matching window after shift correction.
    pub ssim_after: Option<f64>,
    pub success: Option<bool>,
}

impl ShiftResult {
    pub fn ssim_improved(&self) -> Option<bool> {
        match (self.ssim_before, self.ssim_after) {
            (Some(before), Some(after)) => Some(after >= before),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{CellSize, Point, RasterSize};

    use super::*;

    #[test]
    fn inverted_report_rebases_on_the_subject_image() {
        let tgt_georef = GeoReference::with_top_left_origin(
            "EPSG:32632",
            RasterSize::square(16),
            Point::new(100.0, 200.0),
            CellSize::square(2.0),
            None,
        );
        let ref_georef = GeoReference::with_top_left_origin(
            "EPSG:32632",
            RasterSize::square(32),
            Point::new(90.0, 210.0),
            CellSize::square(1.0),
            None,
        );

        let report = ShiftReport {
            shift_px: Some((3.0, -2.0)),
            shift_map: Some((6.0, 4.0)),
            original_map_info: MapInfo::from_geo_reference(&tgt_georef),
            updated_map_info: Some(MapInfo::from_geo_reference(&tgt_georef).shifted_origin(6.0, 4.0)),
            reference_projection: "EPSG:32632".to_string(),
            reference_geo_transform: ref_georef.geo_transform(),
            reference_grid: [[90.0, 91.0], [210.0, 209.0]],
            success: Some(true),
        };

        let inverted = report.inverted(&ref_georef);
        assert_eq!(inverted.shift_px, Some((-3.0, 2.0)));
        assert_eq!(inverted.shift_map, Some((-6.0, -4.0)));

        // the base grid is now the grid of the image being deshifted
        assert_eq!(inverted.original_map_info.origin_x, 90.0);
        assert_eq!(inverted.original_map_info.origin_y, 210.0);
        assert_eq!(inverted.original_map_info.pixel_size_x, 1.0);
        let updated = inverted.updated_map_info.unwrap();
        assert_eq!(updated.origin_x, 84.0);
        assert_eq!(updated.origin_y, 206.0);

        // the anchors switch to the image the forward correction was made for
        assert_eq!(inverted.reference_geo_transform, tgt_georef.geo_transform());
        assert_eq!(inverted.reference_grid, [[100.0, 102.0], [200.0, 198.0]]);
    }
}
