//! Phase correlation of the two matching windows: shifted cross power
//! spectrum, integer shift detection with an iterative validation loop,
//! sub-pixel refinement and a reliability score.

use log::{debug, warn};
use num_complex::Complex;
use rustfft::FftNum;

use crate::{
    DenseArray, Error, RasterSize, Result,
    array::{Columns, Rows},
    fft::{FftBackend, FftPrecision},
};

const MIN_SCPS_SIZE: usize = 3;

#[derive(Debug, Clone)]
pub struct ShiftEstimate {
    pub x_int: i32,
    pub y_int: i32,
    pub x_sub: f64,
    pub y_sub: f64,
    /// Total shift in FFT pixel units (matching grid pixels).
    pub x_total: f64,
    pub y_total: f64,
    /// 0..100 score comparing the correlation peak against the background.
    pub reliability: f64,
    /// The shifted cross power spectrum the estimate was derived from.
    pub scps: DenseArray<f64>,
    /// Window size that went into the FFT after binary/quadratic sizing.
    pub fft_win_size: RasterSize,
}

/// Engine state for a single coregistration run. The FFT fallback flag is
/// scoped to this instance.
pub struct PhaseCorrelator {
    binary_ws: bool,
    force_quadratic_win: bool,
    precision: FftPrecision,
    max_iter: usize,
    max_shift: f64,
    backend_single: FftBackend<f32>,
    backend_double: FftBackend<f64>,
}

impl PhaseCorrelator {
    pub fn new(binary_ws: bool, force_quadratic_win: bool, precision: FftPrecision, max_iter: usize, max_shift: f64) -> Self {
        PhaseCorrelator {
            binary_ws,
            force_quadratic_win,
            precision,
            max_iter,
            max_shift,
            backend_single: FftBackend::new(),
            backend_double: FftBackend::new(),
        }
    }

    /// Estimates the translational offset between two equal sized windows.
    pub fn estimate(&mut self, im0: &DenseArray<f64>, im1: &DenseArray<f64>) -> Result<ShiftEstimate> {
        let mut scps = self.shifted_cross_power_spectrum(im0, im1)?;

        let (mut x_int, mut y_int) = integer_shifts(&scps);

        if (x_int, y_int) != (0, 0) {
            let mut count_iter = 1;
            let (mut candidate_x, mut candidate_y) = (x_int, y_int);
            let (mut residual, mut validation_scps) = self.validate_integer_shifts(im0, im1, candidate_x, candidate_y)?;

            loop {
                if residual == (0, 0) {
                    x_int = candidate_x;
                    y_int = candidate_y;
                    scps = validation_scps;
                    break;
                }

                count_iter += 1;
                if count_iter > self.max_iter {
                    return Err(Error::NoMatchFound(self.max_iter));
                }

                debug!("No clear match found yet, jumping to iteration {count_iter} with input shifts {residual:?}");
                (candidate_x, candidate_y) = residual;
                (residual, validation_scps) = self.validate_integer_shifts(im0, im1, candidate_x, candidate_y)?;
            }
        }

        let fft_win_size = scps.size();
        let (x_sub, y_sub) = subpixel_shifts(&scps);
        let (x_total, y_total) = (x_int as f64 + x_sub, y_int as f64 + y_sub);

        if f64::max(x_total.abs(), y_total.abs()) > self.max_shift {
            return Err(Error::ShiftTooLarge {
                x: x_total,
                y: y_total,
                max_shift: self.max_shift,
            });
        }

        let reliability = shift_reliability(&scps);

        Ok(ShiftEstimate {
            x_int,
            y_int,
            x_sub,
            y_sub,
            x_total,
            y_total,
            reliability,
            scps,
            fft_win_size,
        })
    }

    /// The quadrant swapped magnitude of the inverse transformed, normalized
    /// cross power spectrum. The peak position encodes the translation
    /// between the inputs.
    pub fn shifted_cross_power_spectrum(&mut self, im0: &DenseArray<f64>, im1: &DenseArray<f64>) -> Result<DenseArray<f64>> {
        if im0.size() != im1.size() {
            return Err(Error::InvalidArgument(format!(
                "The reference and the target window must have the same dimensions: {} <-> {}",
                im0.size(),
                im1.size()
            )));
        }

        if im0.rows() % 2 != 0 || im0.columns() % 2 != 0 {
            warn!("Odd dimensions in the match images: {}", im0.size());
        }

        let shape = (im0.rows(), im0.columns());
        let ws = if self.binary_ws { shrink_to_binary_size(shape) } else { Some(shape) };
        let ws = ws.map(|(rows, cols)| {
            if self.force_quadratic_win {
                let side = rows.min(cols);
                (side, side)
            } else {
                (rows, cols)
            }
        });

        let Some((rows, cols)) = ws else {
            return Err(Error::WindowTooSmall(
                "the matching window became too small for calculating a reliable match".to_string(),
            ));
        };
        if rows == 0 || cols == 0 {
            return Err(Error::WindowTooSmall(
                "the matching window became too small for calculating a reliable match".to_string(),
            ));
        }

        let center = (im0.rows() as f64 / 2.0, im0.columns() as f64 / 2.0);
        let in0 = im0.clipped_around(center, (rows, cols))?;
        let in1 = im1.clipped_around(center, (rows, cols))?;

        let size = RasterSize::with_rows_cols(Rows(rows as i32), Columns(cols as i32));
        let cps = match self.precision {
            FftPrecision::Single => cross_power_spectrum(&mut self.backend_single, &in0, &in1, size),
            FftPrecision::Double => cross_power_spectrum(&mut self.backend_double, &in0, &in1, size),
        };

        Ok(fftshift(&cps))
    }

    /// Virtually removes the candidate integer shift by re-centered clipping
    /// of the reference window and recomputes the spectrum. Returns the
    /// residual integer shift of the deshifted pair.
    fn validate_integer_shifts(
        &mut self,
        im0: &DenseArray<f64>,
        im1: &DenseArray<f64>,
        x_intshift: i32,
        y_intshift: i32,
    ) -> Result<((i32, i32), DenseArray<f64>)> {
        let (gdsh_im0, crsp_im1) = self.deshifted_clips(im0, im1, x_intshift, y_intshift)?;
        let scps = self.shifted_cross_power_spectrum(&gdsh_im0, &crsp_im1)?;

        if scps.rows() < MIN_SCPS_SIZE || scps.columns() < MIN_SCPS_SIZE {
            return Err(Error::WindowTooSmall(
                "the cross power spectrum became too small for computing the point of registration".to_string(),
            ));
        }

        Ok((integer_shifts(&scps), scps))
    }

    fn deshifted_clips(
        &self,
        im0: &DenseArray<f64>,
        im1: &DenseArray<f64>,
        x_intshift: i32,
        y_intshift: i32,
    ) -> Result<(DenseArray<f64>, DenseArray<f64>)> {
        let old_center = (im0.rows() as f64 / 2.0, im0.columns() as f64 / 2.0);
        let new_center = (old_center.0 + y_intshift as f64, old_center.1 + x_intshift as f64);

        let x_left = new_center.1;
        let x_right = im0.columns() as f64 - new_center.1;
        let y_above = new_center.0;
        let y_below = im0.rows() as f64 - new_center.0;

        let mut max_cols = (2.0 * x_left.min(x_right)) as i64;
        let mut max_rows = (2.0 * y_above.min(y_below)) as i64;
        if self.force_quadratic_win {
            let side = max_cols.min(max_rows);
            max_cols = side;
            max_rows = side;
        }

        if max_rows < MIN_SCPS_SIZE as i64 || max_cols < MIN_SCPS_SIZE as i64 {
            return Err(Error::WindowTooSmall(
                "the matching window became too small while removing the integer shift".to_string(),
            ));
        }

        let gdsh_im0 = im0.clipped_around(new_center, (max_rows as usize, max_cols as usize))?;
        let crsp_im1 = im1.clipped_around(
            (im1.rows() as f64 / 2.0, im1.columns() as f64 / 2.0),
            (gdsh_im0.rows(), gdsh_im0.columns()),
        )?;

        Ok((gdsh_im0, crsp_im1))
    }
}

fn cross_power_spectrum<T: FftNum + num::Float>(
    backend: &mut FftBackend<T>,
    in0: &DenseArray<f64>,
    in1: &DenseArray<f64>,
    size: RasterSize,
) -> DenseArray<f64> {
    let fft0 = backend.fft2_forward(in0, size);
    let fft1 = backend.fft2_forward(in1, size);

    let max_mag = fft1.iter().map(|v| v.norm()).fold(T::zero(), T::max);
    let eps = max_mag * T::from(1e-15).unwrap_or_else(T::zero);

    let mut cross: Vec<Complex<T>> = fft0
        .iter()
        .zip(fft1.iter())
        .map(|(f, g)| (*f * g.conj()) / (f.norm() * g.norm() + eps))
        .collect();

    backend.fft2_inverse(&mut cross, size);

    let magnitudes: Vec<f64> = cross.iter().map(|v| v.norm().to_f64().unwrap_or(0.0)).collect();
    DenseArray::new(size, magnitudes).expect("spectrum size mismatch")
}

/// Swaps the quadrants so the zero frequency component sits at
/// (rows / 2, cols / 2).
fn fftshift(arr: &DenseArray<f64>) -> DenseArray<f64> {
    let rows = arr.rows();
    let cols = arr.columns();

    let mut out = DenseArray::zeros(arr.size());
    for row in 0..rows {
        let dst_row = (row + rows / 2) % rows;
        for col in 0..cols {
            let dst_col = (col + cols / 2) % cols;
            out.as_mut_slice()[dst_row * cols + dst_col] = arr.value(row, col);
        }
    }

    out
}

/// Shrinks the window to the nearest power of two per axis,
/// from the usual FFT friendly range (8 .. 8192).
fn shrink_to_binary_size(shape: (usize, usize)) -> Option<(usize, usize)> {
    let largest_fit = |len: usize| (3..14).map(|i| 1usize << i).take_while(|s| *s <= len).last();

    let rows = largest_fit(shape.0)?;
    let cols = largest_fit(shape.1)?;
    Some((rows, cols))
}

fn integer_shifts(scps: &DenseArray<f64>) -> (i32, i32) {
    let peak = scps.argmax();
    (
        peak.col - scps.columns() as i32 / 2,
        peak.row - scps.rows() as i32 / 2,
    )
}

fn value_or_zero(scps: &DenseArray<f64>, row: i32, col: i32) -> f64 {
    if row < 0 || col < 0 || row >= scps.rows() as i32 || col >= scps.columns() as i32 {
        // a peak on the spectrum border has no neighbor there
        0.0
    } else {
        scps.value(row as usize, col as usize)
    }
}

/// Sub-pixel refinement from the side maxima directly next to the central
/// peak. The ratio of the side maximum against the peak approximates the
/// fractional offset along that axis.
fn subpixel_shifts(scps: &DenseArray<f64>) -> (f64, f64) {
    let peak_row = scps.rows() as i32 / 2;
    let peak_col = scps.columns() as i32 / 2;

    let left = value_or_zero(scps, peak_row, peak_col - 1);
    let right = value_or_zero(scps, peak_row, peak_col + 1);
    let above = value_or_zero(scps, peak_row - 1, peak_col);
    let below = value_or_zero(scps, peak_row + 1, peak_col);

    let (x_val, x_dir) = if left > right { (left, -1.0) } else { (right, 1.0) };
    let (y_val, y_dir) = if above > below { (above, -1.0) } else { (below, 1.0) };

    let max = scps.max_value();
    let x_sub = x_dir * x_val / (max + x_val);
    let y_sub = y_dir * y_val / (max + y_val);

    (x_sub, y_sub)
}

/// Reliability percentage of the detected shift: mean power in the 3x3 peak
/// block against the mean plus two standard deviations of the remaining
/// spectrum. A peak on the spectrum border yields 0.
pub(crate) fn shift_reliability(scps: &DenseArray<f64>) -> f64 {
    let peak = scps.argmax();
    let rows = scps.rows() as i32;
    let cols = scps.columns() as i32;

    if peak.row == 0 || peak.col == 0 || peak.row == rows - 1 || peak.col == cols - 1 {
        return 0.0;
    }

    let mut peak_sum = 0.0;
    let mut rest = Vec::with_capacity(scps.as_slice().len());
    for row in 0..rows {
        for col in 0..cols {
            let v = scps.value(row as usize, col as usize);
            if (row - peak.row).abs() <= 1 && (col - peak.col).abs() <= 1 {
                peak_sum += v;
            } else {
                rest.push(v);
            }
        }
    }

    if rest.is_empty() {
        return 0.0;
    }

    let power_at_peak = peak_sum / 9.0;
    let rest = DenseArray::new(RasterSize::with_rows_cols(Rows(1), Columns(rest.len() as i32)), rest).expect("rest size");
    let power_without_peak = rest.mean() + 2.0 * rest.std();

    (100.0 - power_without_peak / power_at_peak * 100.0).clamp(0.0, 100.0)
}
