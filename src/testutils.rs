//! Synthetic imagery for the unit tests. All generators are deterministic.

use num_complex::Complex;

use crate::{
    CellSize, DenseArray, DenseRaster, GeoReference, Point, RasterSize,
    array::{Columns, Rows},
    fft::FftBackend,
};

pub fn sized(rows: i32, cols: i32) -> RasterSize {
    RasterSize::with_rows_cols(Rows(rows), Columns(cols))
}

/// Simple deterministic pseudo random sequence.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(2685821657736338717).wrapping_add(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / u32::MAX as f64
    }
}

/// Checkerboard with 32 px squares plus a smooth random undulation, so the
/// spectrum has broadband content and phase correlation sees a unique peak.
pub fn textured_pattern(rows: usize, cols: usize) -> DenseArray<f64> {
    let mut rng = Lcg::new(42);

    // coarse noise grid, bilinearly upsampled
    const COARSE: usize = 8;
    let coarse_rows = rows / COARSE + 2;
    let coarse_cols = cols / COARSE + 2;
    let coarse: Vec<f64> = (0..coarse_rows * coarse_cols).map(|_| (rng.next_f64() - 0.5) * 40.0).collect();

    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let checker = if (row / 32 + col / 32) % 2 == 0 { 60.0 } else { -60.0 };

            let fy = row as f64 / COARSE as f64;
            let fx = col as f64 / COARSE as f64;
            let (iy, ix) = (fy.floor() as usize, fx.floor() as usize);
            let (ty, tx) = (fy.fract(), fx.fract());
            let at = |r: usize, c: usize| coarse[r * coarse_cols + c];
            let smooth = at(iy, ix) * (1.0 - ty) * (1.0 - tx)
                + at(iy, ix + 1) * (1.0 - ty) * tx
                + at(iy + 1, ix) * ty * (1.0 - tx)
                + at(iy + 1, ix + 1) * ty * tx;

            data.push(128.0 + checker + smooth);
        }
    }

    DenseArray::new(sized(rows as i32, cols as i32), data).expect("pattern size")
}

/// Uniform random values in [0, 255].
pub fn noise_pattern(rows: usize, cols: usize, seed: u64) -> DenseArray<f64> {
    let mut rng = Lcg::new(seed);
    let data = (0..rows * cols).map(|_| rng.next_f64() * 255.0).collect();
    DenseArray::new(sized(rows as i32, cols as i32), data).expect("pattern size")
}

/// Pixel translated copy: `out[r][c] = src[r + dy][c + dx]`, positions
/// outside the source become `fill`. The phase correlation engine reports
/// this translation as (dx, dy).
pub fn integer_shifted(src: &DenseArray<f64>, dx: i32, dy: i32, fill: f64) -> DenseArray<f64> {
    let rows = src.rows() as i32;
    let cols = src.columns() as i32;

    let mut data = Vec::with_capacity(src.as_slice().len());
    for row in 0..rows {
        for col in 0..cols {
            let (src_row, src_col) = (row + dy, col + dx);
            if src_row >= 0 && src_row < rows && src_col >= 0 && src_col < cols {
                data.push(src.value(src_row as usize, src_col as usize));
            } else {
                data.push(fill);
            }
        }
    }

    DenseArray::new(src.size(), data).expect("pattern size")
}

/// Band limited (circular) translation by a fractional pixel offset, applied
/// as a phase ramp in the frequency domain.
pub fn fourier_shifted(src: &DenseArray<f64>, dx: f64, dy: f64) -> DenseArray<f64> {
    let rows = src.rows();
    let cols = src.columns();
    let size = src.size();

    let mut backend = FftBackend::<f64>::new();
    let mut spectrum = backend.fft2_forward(src, size);

    let signed_freq = |k: usize, n: usize| {
        if k <= n / 2 { k as f64 } else { k as f64 - n as f64 }
    };

    for row in 0..rows {
        let fy = signed_freq(row, rows);
        for col in 0..cols {
            let fx = signed_freq(col, cols);
            let angle = std::f64::consts::TAU * (fx * dx / cols as f64 + fy * dy / rows as f64);
            spectrum[row * cols + col] *= Complex::from_polar(1.0, angle);
        }
    }

    backend.fft2_inverse(&mut spectrum, size);

    let data = spectrum.iter().map(|v| v.re).collect();
    DenseArray::new(size, data).expect("pattern size")
}

/// Wraps a pattern into a single band raster with a 1 m grid.
pub fn raster_with_pattern(pattern: DenseArray<f64>, top_left: Point) -> DenseRaster {
    let georef = GeoReference::with_top_left_origin("EPSG:32632", pattern.size(), top_left, CellSize::square(1.0), None);
    DenseRaster::with_single_band(georef, pattern).expect("raster construction")
}
