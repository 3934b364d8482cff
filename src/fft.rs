//! Two dimensional FFT plumbing on top of the planned rustfft transforms,
//! with a direct DFT fallback for the (rare) case where the planned path
//! produces an all-zero spectrum.

use log::warn;
use num_complex::Complex;
use rustfft::{FftDirection, FftNum, FftPlanner};

use crate::{DenseArray, RasterSize};

/// Complex working precision of the cross power spectrum calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FftPrecision {
    /// 32-bit complex components.
    #[default]
    Single,
    /// 64-bit complex components.
    Double,
}

/// Per run FFT state: the plan cache and the sticky fallback flag. The flag
/// deliberately lives here instead of in a process wide global, concurrent
/// runs must not influence each other.
pub(crate) struct FftBackend<T: FftNum> {
    planner: FftPlanner<T>,
    /// `None` until the planned path has been exercised once.
    planned_works: Option<bool>,
}

impl<T: FftNum + num::Float> FftBackend<T> {
    pub fn new() -> Self {
        FftBackend {
            planner: FftPlanner::new(),
            planned_works: None,
        }
    }

    /// Forward 2-D FFT of a real input array.
    pub fn fft2_forward(&mut self, input: &DenseArray<f64>, size: RasterSize) -> Vec<Complex<T>> {
        debug_assert_eq!(input.size(), size);

        let mut buffer: Vec<Complex<T>> = input
            .iter()
            .map(|&v| Complex::new(T::from(v).unwrap_or_else(T::zero), T::zero()))
            .collect();

        self.transform(&mut buffer, size, FftDirection::Forward);

        if self.planned_works.is_none() {
            if spectrum_is_flat(&buffer) {
                // The planned transform returned a zero spectrum on its first
                // use; remember that for the rest of the run and redo the
                // work with the direct transform.
                self.planned_works = Some(false);
                warn!("Planned FFT backend produced all-zero output, falling back to the direct transform for this run.");

                buffer = input
                    .iter()
                    .map(|&v| Complex::new(T::from(v).unwrap_or_else(T::zero), T::zero()))
                    .collect();
                self.transform(&mut buffer, size, FftDirection::Forward);
            } else {
                self.planned_works = Some(true);
            }
        }

        buffer
    }

    /// Inverse 2-D FFT, normalized by the cell count like the usual inverse
    /// transform conventions.
    pub fn fft2_inverse(&mut self, buffer: &mut [Complex<T>], size: RasterSize) {
        self.transform(buffer, size, FftDirection::Inverse);

        let norm = T::from(size.cell_count() as f64).unwrap_or_else(T::one);
        for v in buffer.iter_mut() {
            *v = *v / norm;
        }
    }

    fn transform(&mut self, buffer: &mut [Complex<T>], size: RasterSize, direction: FftDirection) {
        if self.planned_works == Some(false) {
            direct_dft2(buffer, size, direction);
            return;
        }

        let rows = size.rows.count() as usize;
        let cols = size.cols.count() as usize;

        // rows are contiguous, transform them in one pass
        let row_fft = self.planner.plan_fft(cols, direction);
        row_fft.process(buffer);

        // transpose, transform the columns, transpose back
        let mut transposed = transpose(buffer, rows, cols);
        let col_fft = self.planner.plan_fft(rows, direction);
        col_fft.process(&mut transposed);
        let back = transpose(&transposed, cols, rows);
        buffer.copy_from_slice(&back);
    }
}

fn transpose<T: Copy>(data: &[T], rows: usize, cols: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(data.len());
    for col in 0..cols {
        for row in 0..rows {
            out.push(data[row * cols + col]);
        }
    }
    out
}

fn spectrum_is_flat<T: FftNum + num::Float>(buffer: &[Complex<T>]) -> bool {
    let Some(first) = buffer.first() else {
        return true;
    };

    buffer.iter().all(|v| v == first)
}

/// Textbook separable DFT, only used when the planned path is marked broken.
fn direct_dft2<T: FftNum + num::Float>(buffer: &mut [Complex<T>], size: RasterSize, direction: FftDirection) {
    let rows = size.rows.count() as usize;
    let cols = size.cols.count() as usize;
    let sign = match direction {
        FftDirection::Forward => -1.0,
        FftDirection::Inverse => 1.0,
    };

    let dft_1d = |input: &[Complex<T>], output: &mut [Complex<T>]| {
        let n = input.len();
        for (k, out) in output.iter_mut().enumerate() {
            let mut acc = Complex::new(T::zero(), T::zero());
            for (i, v) in input.iter().enumerate() {
                let angle = sign * std::f64::consts::TAU * (k * i) as f64 / n as f64;
                let w = Complex::new(
                    T::from(angle.cos()).unwrap_or_else(T::zero),
                    T::from(angle.sin()).unwrap_or_else(T::zero),
                );
                acc = acc + *v * w;
            }
            *out = acc;
        }
    };

    let mut scratch = vec![Complex::new(T::zero(), T::zero()); rows.max(cols)];

    for row in 0..rows {
        let slice = &mut buffer[row * cols..(row + 1) * cols];
        dft_1d(&slice.to_vec(), &mut scratch[..cols]);
        slice.copy_from_slice(&scratch[..cols]);
    }

    let mut column = vec![Complex::new(T::zero(), T::zero()); rows];
    for col in 0..cols {
        for row in 0..rows {
            column[row] = buffer[row * cols + col];
        }
        dft_1d(&column, &mut scratch[..rows]);
        for row in 0..rows {
            buffer[row * cols + col] = scratch[row];
        }
    }
}
