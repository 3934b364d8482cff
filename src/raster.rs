use crate::{BandIndex, Cell, DenseArray, Error, GeoReference, Point, RasterSize, Result};

/// A sub window of a raster: pixel origin of the north-west corner plus the
/// window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterWindow {
    pub origin: Cell,
    pub size: RasterSize,
}

impl RasterWindow {
    pub fn new(origin: Cell, size: RasterSize) -> Self {
        RasterWindow { origin, size }
    }

    pub fn full(size: RasterSize) -> Self {
        RasterWindow {
            origin: Cell::from_row_col(0, 0),
            size,
        }
    }
}

/// Read-only handle on a georeferenced raster, the boundary towards the
/// raster i/o collaborator. Implementations expose the pixel grid, the
/// geotransform and per band windowed reads; the matching code never touches
/// storage formats directly.
pub trait RasterView {
    fn geo_reference(&self) -> &GeoReference;

    fn band_count(&self) -> usize;

    /// Reads a window of the given band (1-based) as floating point values.
    /// Nodata values are passed through unchanged.
    fn read_band_window(&self, band: BandIndex, window: &RasterWindow) -> Result<DenseArray<f64>>;

    fn read_band(&self, band: BandIndex) -> Result<DenseArray<f64>> {
        self.read_band_window(band, &RasterWindow::full(self.geo_reference().raster_size()))
    }
}

/// In-memory raster, used for tests and as the result type of the warper.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseRaster {
    georef: GeoReference,
    bands: Vec<DenseArray<f64>>,
}

impl DenseRaster {
    pub fn new(georef: GeoReference, bands: Vec<DenseArray<f64>>) -> Result<Self> {
        for band in &bands {
            if band.size() != georef.raster_size() {
                return Err(Error::InvalidArgument(format!(
                    "Band size {} does not match the georeference {}",
                    band.size(),
                    georef.raster_size()
                )));
            }
        }

        Ok(DenseRaster { georef, bands })
    }

    pub fn with_single_band(georef: GeoReference, data: DenseArray<f64>) -> Result<Self> {
        DenseRaster::new(georef, vec![data])
    }

    pub fn band(&self, band: BandIndex) -> &DenseArray<f64> {
        &self.bands[band.get() - 1]
    }
}

impl RasterView for DenseRaster {
    fn geo_reference(&self) -> &GeoReference {
        &self.georef
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn read_band_window(&self, band: BandIndex, window: &RasterWindow) -> Result<DenseArray<f64>> {
        let band_data = self
            .bands
            .get(band.get() - 1)
            .ok_or_else(|| Error::InvalidArgument(format!("Band {band} out of range (bands: {})", self.bands.len())))?;

        band_data.sub_array(window.origin, window.size)
    }
}

/// Boolean mask over a raster extent marking unusable pixels (clouds, ...).
/// Lives in the same projection as the raster it masks.
#[derive(Debug, Clone)]
pub struct BadDataMask {
    georef: GeoReference,
    mask: DenseArray<bool>,
}

impl BadDataMask {
    pub fn new(georef: GeoReference, mask: DenseArray<bool>) -> Result<Self> {
        if mask.size() != georef.raster_size() {
            return Err(Error::InvalidArgument(format!(
                "Mask size {} does not match the georeference {}",
                mask.size(),
                georef.raster_size()
            )));
        }

        Ok(BadDataMask { georef, mask })
    }

    pub fn geo_reference(&self) -> &GeoReference {
        &self.georef
    }

    /// True when the pixel under the map position is marked bad. Positions
    /// outside the mask extent are considered good.
    pub fn is_bad_at(&self, p: Point) -> bool {
        let cell = self.georef.point_to_cell(p);
        self.georef.is_cell_on_map(cell) && self.mask.cell_value(cell)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CellSize, array::{Columns, Rows}};

    use super::*;

    fn georef(rows: i32, cols: i32) -> GeoReference {
        GeoReference::with_top_left_origin(
            "EPSG:32632",
            RasterSize::with_rows_cols(Rows(rows), Columns(cols)),
            Point::new(0.0, 100.0),
            CellSize::square(10.0),
            None,
        )
    }

    #[test]
    fn windowed_band_read() {
        let data = DenseArray::new(RasterSize::with_rows_cols(Rows(3), Columns(3)), (0..9).map(f64::from).collect()).unwrap();
        let raster = DenseRaster::with_single_band(georef(3, 3), data).unwrap();

        let window = RasterWindow::new(Cell::from_row_col(1, 0), RasterSize::with_rows_cols(Rows(2), Columns(2)));
        let win = raster.read_band_window(crate::FIRST_BAND, &window).unwrap();
        assert_eq!(win.as_slice(), &[3.0, 4.0, 6.0, 7.0]);

        assert!(raster.read_band_window(BandIndex::new(2).unwrap(), &window).is_err());
    }

    #[test]
    fn bad_data_mask_lookup() {
        let mut mask = DenseArray::filled_with(false, RasterSize::with_rows_cols(Rows(3), Columns(3)));
        mask.as_mut_slice()[4] = true;
        let mask = BadDataMask::new(georef(3, 3), mask).unwrap();

        assert!(mask.is_bad_at(Point::new(15.0, 85.0)));
        assert!(!mask.is_bad_at(Point::new(5.0, 95.0)));
        assert!(!mask.is_bad_at(Point::new(-100.0, -100.0)));
    }
}
