//! Mean structural similarity over two image windows, used as an
//! independent before/after sanity check of the shift correction.

use crate::{DenseArray, Error, Result};

const WINDOW: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Mean SSIM of two equally sized windows using uniform local
/// statistics windows and the given dynamic range.
pub fn ssim(a: &DenseArray<f64>, b: &DenseArray<f64>, dynamic_range: f64) -> Result<f64> {
    if a.size() != b.size() {
        return Err(Error::InvalidArgument(format!(
            "SSIM input shapes are not equal: {} <-> {}",
            a.size(),
            b.size()
        )));
    }

    let rows = a.rows();
    let cols = a.columns();
    if rows < WINDOW || cols < WINDOW {
        return Err(Error::WindowTooSmall(format!(
            "SSIM needs at least {WINDOW}x{WINDOW} pixels, got {}",
            a.size()
        )));
    }

    if dynamic_range <= 0.0 {
        return Err(Error::InvalidArgument(format!("Invalid dynamic range: {dynamic_range}")));
    }

    let c1 = (K1 * dynamic_range).powi(2);
    let c2 = (K2 * dynamic_range).powi(2);

    let np = (WINDOW * WINDOW) as f64;
    let cov_norm = 1.0 / (np - 1.0); // sample statistics

    let mut sum = 0.0;
    let mut count = 0usize;

    for row in 0..=(rows - WINDOW) {
        for col in 0..=(cols - WINDOW) {
            let mut sum_a = 0.0;
            let mut sum_b = 0.0;
            let mut sum_aa = 0.0;
            let mut sum_bb = 0.0;
            let mut sum_ab = 0.0;

            for r in row..row + WINDOW {
                for c in col..col + WINDOW {
                    let va = a.value(r, c);
                    let vb = b.value(r, c);
                    sum_a += va;
                    sum_b += vb;
                    sum_aa += va * va;
                    sum_bb += vb * vb;
                    sum_ab += va * vb;
                }
            }

            let mean_a = sum_a / np;
            let mean_b = sum_b / np;
            let var_a = cov_norm * (sum_aa - np * mean_a * mean_a);
            let var_b = cov_norm * (sum_bb - np * mean_b * mean_b);
            let cov = cov_norm * (sum_ab - np * mean_a * mean_b);

            let s = ((2.0 * mean_a * mean_b + c1) * (2.0 * cov + c2))
                / ((mean_a * mean_a + mean_b * mean_b + c1) * (var_a + var_b + c2));

            sum += s;
            count += 1;
        }
    }

    Ok(sum / count as f64)
}
