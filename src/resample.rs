//! Resampling of a raster window onto a different grid of the same
//! projection. Covers the interpolating kernels as well as the aggregating
//! algorithms of the usual warp tool palette.

use itertools::Itertools;

use crate::{DenseArray, Error, GeoReference, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumThreads {
    AllCpus,
    Count(usize),
}

impl Default for NumThreads {
    fn default() -> Self {
        NumThreads::Count(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResampleAlg {
    Nearest,
    Bilinear,
    #[default]
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
    Max,
    Min,
    Med,
    Q1,
    Q3,
}

impl ResampleAlg {
    pub fn is_aggregation(&self) -> bool {
        matches!(
            self,
            ResampleAlg::Average | ResampleAlg::Mode | ResampleAlg::Max | ResampleAlg::Min | ResampleAlg::Med | ResampleAlg::Q1 | ResampleAlg::Q3
        )
    }

    fn kernel_radius(&self) -> i32 {
        match self {
            ResampleAlg::Nearest => 0,
            ResampleAlg::Bilinear => 1,
            ResampleAlg::Cubic | ResampleAlg::CubicSpline => 2,
            ResampleAlg::Lanczos => 3,
            _ => 0,
        }
    }

    fn kernel_weight(&self, t: f64) -> f64 {
        let t = t.abs();
        match self {
            ResampleAlg::Bilinear => {
                if t < 1.0 { 1.0 - t } else { 0.0 }
            }
            ResampleAlg::Cubic => {
                // Keys convolution kernel with a = -0.5
                const A: f64 = -0.5;
                if t < 1.0 {
                    (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
                } else if t < 2.0 {
                    A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
                } else {
                    0.0
                }
            }
            ResampleAlg::CubicSpline => {
                if t < 1.0 {
                    2.0 / 3.0 - t * t + t * t * t / 2.0
                } else if t < 2.0 {
                    (2.0 - t).powi(3) / 6.0
                } else {
                    0.0
                }
            }
            ResampleAlg::Lanczos => {
                const A: f64 = 3.0;
                if t == 0.0 {
                    1.0
                } else if t < A {
                    let pt = std::f64::consts::PI * t;
                    A * pt.sin() * (pt / A).sin() / (pt * pt)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

impl std::str::FromStr for ResampleAlg {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "nearest" => Ok(ResampleAlg::Nearest),
            "bilinear" => Ok(ResampleAlg::Bilinear),
            "cubic" => Ok(ResampleAlg::Cubic),
            "cubic_spline" => Ok(ResampleAlg::CubicSpline),
            "lanczos" => Ok(ResampleAlg::Lanczos),
            "average" => Ok(ResampleAlg::Average),
            "mode" => Ok(ResampleAlg::Mode),
            "max" => Ok(ResampleAlg::Max),
            "min" => Ok(ResampleAlg::Min),
            "med" => Ok(ResampleAlg::Med),
            "q1" => Ok(ResampleAlg::Q1),
            "q3" => Ok(ResampleAlg::Q3),
            _ => Err(Error::InvalidArgument(format!("'{name}' is not a supported resampling algorithm"))),
        }
    }
}

impl std::fmt::Display for ResampleAlg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResampleAlg::Nearest => "nearest",
            ResampleAlg::Bilinear => "bilinear",
            ResampleAlg::Cubic => "cubic",
            ResampleAlg::CubicSpline => "cubic_spline",
            ResampleAlg::Lanczos => "lanczos",
            ResampleAlg::Average => "average",
            ResampleAlg::Mode => "mode",
            ResampleAlg::Max => "max",
            ResampleAlg::Min => "min",
            ResampleAlg::Med => "med",
            ResampleAlg::Q1 => "q1",
            ResampleAlg::Q3 => "q3",
        };
        f.write_str(name)
    }
}

struct SampleGrid<'a> {
    data: &'a DenseArray<f64>,
    nodata: Option<f64>,
}

impl SampleGrid<'_> {
    fn get(&self, row: i32, col: i32) -> Option<f64> {
        if row < 0 || col < 0 || row >= self.data.rows() as i32 || col >= self.data.columns() as i32 {
            return None;
        }

        let v = self.data.value(row as usize, col as usize);
        if is_nodata(v, self.nodata) { None } else { Some(v) }
    }
}

fn is_nodata(v: f64, nodata: Option<f64>) -> bool {
    if v.is_nan() {
        return true;
    }

    match nodata {
        Some(nod) => v == nod,
        None => false,
    }
}

/// Resamples `src` onto the grid described by `dst_georef`. Both grids have
/// to be in the same projection, which is all the matching core needs.
/// Nodata cells are excluded from the kernels and aggregations; target cells
/// without any valid contribution become nodata (or NaN when no nodata value
/// is defined).
pub fn resample(
    src: &DenseArray<f64>,
    src_georef: &GeoReference,
    dst_georef: &GeoReference,
    alg: ResampleAlg,
    num_threads: NumThreads,
) -> Result<DenseArray<f64>> {
    if !src_georef.projection_equals(dst_georef) {
        return Err(Error::UnequalProjections {
            reference: src_georef.projection().to_string(),
            target: dst_georef.projection().to_string(),
        });
    }

    if src.size() != src_georef.raster_size() {
        return Err(Error::InvalidArgument(format!(
            "Source data size {} does not match its georeference {}",
            src.size(),
            src_georef.raster_size()
        )));
    }

    // No work when the destination already is a sub grid of the source.
    if src_georef.grid_equals(dst_georef) {
        let (col, row) = src_georef.point_to_pixel_fraction(dst_georef.top_left());
        let origin = crate::Cell::from_row_col(row.round() as i32, col.round() as i32);
        let size = dst_georef.raster_size();
        if origin.row >= 0
            && origin.col >= 0
            && origin.row + size.rows.count() <= src_georef.rows()
            && origin.col + size.cols.count() <= src_georef.columns()
        {
            return src.sub_array(origin, size);
        }
    }

    let nodata = src_georef.nodata();
    let fill = nodata.unwrap_or(f64::NAN);
    let mut dst = DenseArray::filled_with(fill, dst_georef.raster_size());
    let cols = dst_georef.columns() as usize;

    let thread_count = match num_threads {
        NumThreads::AllCpus => None,
        NumThreads::Count(val) => Some(val),
    };

    if thread_count.is_some_and(|count| count <= 1) || !cfg!(feature = "rayon") {
        for (row, row_slice) in dst.as_mut_slice().chunks_mut(cols).enumerate() {
            resample_row(row_slice, row as i32, src, src_georef, dst_georef, alg, nodata, fill);
        }
    } else {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;

            let mut pool_builder = rayon::ThreadPoolBuilder::new();
            if let Some(count) = thread_count {
                pool_builder = pool_builder.num_threads(count);
            }
            let pool = pool_builder
                .build()
                .map_err(|e| Error::Runtime(format!("Failed to create threadpool: {e}")))?;

            pool.install(|| {
                dst.as_mut_slice().par_chunks_mut(cols).enumerate().for_each(|(row, row_slice)| {
                    resample_row(row_slice, row as i32, src, src_georef, dst_georef, alg, nodata, fill);
                });
            });
        }
    }

    Ok(dst)
}

#[allow(clippy::too_many_arguments)]
fn resample_row(
    row_slice: &mut [f64],
    row: i32,
    src: &DenseArray<f64>,
    src_georef: &GeoReference,
    dst_georef: &GeoReference,
    alg: ResampleAlg,
    nodata: Option<f64>,
    fill: f64,
) {
    let grid = SampleGrid { data: src, nodata };

    for (col, dst_val) in row_slice.iter_mut().enumerate() {
        let center = dst_georef.cell_center(crate::Cell::from_row_col(row, col as i32));
        let (src_col, src_row) = src_georef.point_to_pixel_fraction(center);

        let value = if alg.is_aggregation() {
            aggregate_sample(&grid, src_georef, dst_georef, row, col as i32, alg)
        } else if alg == ResampleAlg::Nearest {
            grid.get(src_row.floor() as i32, src_col.floor() as i32)
        } else {
            kernel_sample(&grid, src_row, src_col, alg)
        };

        *dst_val = value.unwrap_or(fill);
    }
}

fn kernel_sample(grid: &SampleGrid, src_row: f64, src_col: f64, alg: ResampleAlg) -> Option<f64> {
    // positions relative to the source cell centers
    let x = src_col - 0.5;
    let y = src_row - 0.5;

    let radius = alg.kernel_radius();
    let base_col = x.floor() as i32;
    let base_row = y.floor() as i32;

    let mut sum = 0.0;
    let mut weight_sum = 0.0;

    for row in (base_row - radius + 1)..=(base_row + radius) {
        let wy = alg.kernel_weight(y - row as f64);
        if wy == 0.0 {
            continue;
        }

        for col in (base_col - radius + 1)..=(base_col + radius) {
            let wx = alg.kernel_weight(x - col as f64);
            if wx == 0.0 {
                continue;
            }

            if let Some(v) = grid.get(row, col) {
                sum += v * wx * wy;
                weight_sum += wx * wy;
            }
        }
    }

    if weight_sum.abs() < 1e-12 {
        None
    } else {
        Some(sum / weight_sum)
    }
}

fn aggregate_sample(
    grid: &SampleGrid,
    src_georef: &GeoReference,
    dst_georef: &GeoReference,
    row: i32,
    col: i32,
    alg: ResampleAlg,
) -> Option<f64> {
    let gt = dst_georef.geo_transform();
    let nw = gt.apply(col as f64, row as f64);
    let se = gt.apply(col as f64 + 1.0, row as f64 + 1.0);

    let (col0, row0) = src_georef.point_to_pixel_fraction(nw);
    let (col1, row1) = src_georef.point_to_pixel_fraction(se);

    let mut values = Vec::new();
    for r in (row0.floor() as i32).max(0)..(row1.ceil() as i32) {
        for c in (col0.floor() as i32).max(0)..(col1.ceil() as i32) {
            // contribute when the source cell center falls inside the target cell
            let center_row = r as f64 + 0.5;
            let center_col = c as f64 + 0.5;
            if center_row >= row0 && center_row < row1 && center_col >= col0 && center_col < col1
                && let Some(v) = grid.get(r, c)
            {
                values.push(v);
            }
        }
    }

    if values.is_empty() {
        return None;
    }

    Some(match alg {
        ResampleAlg::Average => values.iter().sum::<f64>() / values.len() as f64,
        ResampleAlg::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ResampleAlg::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        ResampleAlg::Med => quantile(&mut values, 0.5),
        ResampleAlg::Q1 => quantile(&mut values, 0.25),
        ResampleAlg::Q3 => quantile(&mut values, 0.75),
        ResampleAlg::Mode => mode(&mut values),
        _ => unreachable!("not an aggregation algorithm"),
    })
}

fn quantile(values: &mut [f64], q: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        values[lower]
    } else {
        values[lower] + (pos - lower as f64) * (values[upper] - values[lower])
    }
}

fn mode(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);

    values
        .iter()
        .copied()
        .dedup_with_count()
        .max_by_key(|(count, _)| *count)
        .map(|(_, value)| value)
        .unwrap_or(values[0])
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{CellSize, Point, RasterSize, array::{Columns, Rows}};

    fn georef(rows: i32, cols: i32, top_left: Point, cell: f64) -> GeoReference {
        GeoReference::with_top_left_origin(
            "EPSG:32632",
            RasterSize::with_rows_cols(Rows(rows), Columns(cols)),
            top_left,
            CellSize::square(cell),
            None,
        )
    }

    fn ramp(rows: i32, cols: i32) -> DenseArray<f64> {
        DenseArray::new(
            RasterSize::with_rows_cols(Rows(rows), Columns(cols)),
            (0..rows * cols).map(f64::from).collect(),
        )
        .unwrap()
    }

    #[test]
    fn aligned_grid_is_copied() {
        let src = ramp(4, 4);
        let src_ref = georef(4, 4, Point::new(0.0, 4.0), 1.0);
        let dst_ref = georef(2, 2, Point::new(1.0, 3.0), 1.0);

        let out = resample(&src, &src_ref, &dst_ref, ResampleAlg::Cubic, NumThreads::default()).unwrap();
        assert_eq!(out.as_slice(), &[5.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    fn bilinear_half_pixel_shift() {
        let src = ramp(4, 4);
        let src_ref = georef(4, 4, Point::new(0.0, 4.0), 1.0);
        // half a pixel to the east
        let dst_ref = georef(2, 2, Point::new(1.5, 3.0), 1.0);

        let out = resample(&src, &src_ref, &dst_ref, ResampleAlg::Bilinear, NumThreads::default()).unwrap();
        assert_abs_diff_eq!(out.value(0, 0), 5.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out.value(1, 1), 10.5, epsilon = 1e-12);
    }

    #[test]
    fn cubic_reproduces_values_on_grid_points() {
        let src = ramp(6, 6);
        let src_ref = georef(6, 6, Point::new(0.0, 6.0), 1.0);
        // misaligned by half a pixel, the Keys kernel has linear precision so
        // the ramp must be reproduced exactly
        let dst_ref = georef(2, 2, Point::new(2.5, 4.0), 1.0);

        let out = resample(&src, &src_ref, &dst_ref, ResampleAlg::Cubic, NumThreads::default()).unwrap();
        assert_abs_diff_eq!(out.value(0, 0), 14.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out.value(1, 1), 21.5, epsilon = 1e-9);
    }

    #[test]
    fn average_aggregates_source_cells() {
        let src = ramp(4, 4);
        let src_ref = georef(4, 4, Point::new(0.0, 4.0), 1.0);
        let dst_ref = georef(2, 2, Point::new(0.0, 4.0), 2.0);

        let out = resample(&src, &src_ref, &dst_ref, ResampleAlg::Average, NumThreads::default()).unwrap();
        assert_abs_diff_eq!(out.value(0, 0), 2.5, epsilon = 1e-12); // mean of 0,1,4,5
        assert_abs_diff_eq!(out.value(1, 1), 12.5, epsilon = 1e-12); // mean of 10,11,14,15
    }

    #[test]
    fn nodata_is_excluded_from_kernels() {
        let mut src = ramp(4, 4);
        src.as_mut_slice()[5] = -9999.0;
        let mut src_ref = georef(4, 4, Point::new(0.0, 4.0), 1.0);
        src_ref.set_nodata(Some(-9999.0));
        let dst_ref = {
            let mut g = georef(2, 2, Point::new(1.5, 3.0), 1.0);
            g.set_nodata(Some(-9999.0));
            g
        };

        let out = resample(&src, &src_ref, &dst_ref, ResampleAlg::Bilinear, NumThreads::default()).unwrap();
        // value interpolated from the remaining neighbors, not poisoned by nodata
        assert!(out.value(0, 0) != -9999.0);
        assert!(out.value(0, 0).is_finite());
    }

    #[test]
    fn aggregation_statistics() {
        let values = [1.0, 3.0, 3.0, 2.0];

        assert_eq!(mode(&mut values.to_vec()), 3.0);
        assert_eq!(quantile(&mut values.to_vec(), 0.5), 2.5);
        assert_eq!(quantile(&mut values.to_vec(), 0.25), 1.75);
        assert_eq!(quantile(&mut values.to_vec(), 0.75), 3.0);
    }

    #[test]
    fn algorithm_names_parse() {
        for name in [
            "nearest",
            "bilinear",
            "cubic",
            "cubic_spline",
            "lanczos",
            "average",
            "mode",
            "max",
            "min",
            "med",
            "q1",
            "q3",
        ] {
            assert_eq!(name.parse::<ResampleAlg>().unwrap().to_string(), name);
        }

        assert!("bicubic".parse::<ResampleAlg>().is_err());
    }
}
