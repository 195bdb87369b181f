//! Closed-form elevation of a vertical line and the masked max-reduction.
//!
//! For observer-relative endpoints `(x1, y1, z1)`, `(x2, y2, z2)` the vertical
//! plane through the observer at azimuth θ meets the 3-D line at elevation
//!
//! ```text
//! atan( ((y1·z2 − y2·z1)·cos θ + (x2·z1 − x1·z2)·sin θ) / (x2·y1 − x1·y2) )
//! ```
//!
//! A positive value occludes toward θ, a negative one toward θ − π, since both
//! directions lie in the same plane.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};

/// Per-line coefficients `(p, q, d)` such that `tan α = (p cos θ + q sin θ) / d`.
#[inline(always)]
pub fn line_coefficients(row: ArrayView1<f64>) -> (f64, f64, f64) {
    let (x1, y1, z1) = (row[0], row[1], row[2]);
    let (x2, y2, z2) = (row[3], row[4], row[5]);
    (y1 * z2 - y2 * z1, x2 * z1 - x1 * z2, x2 * y1 - x1 * y2)
}

/// Signed elevation of a single observer-relative line at azimuth `theta`.
#[inline]
pub fn elevation(row: ArrayView1<f64>, theta: f64) -> f64 {
    let (p, q, d) = line_coefficients(row);
    ((p * theta.cos() + q * theta.sin()) / d).atan()
}

/// Signed elevation matrix of shape `(lines, azimuths)`.
///
/// `lines` must be observer-relative and free of degenerate rows (non-zero
/// denominator); `theta` holds the un-rebased sample azimuths.
pub fn elevation_matrix(
    lines: ArrayView2<f64>,
    theta: ArrayView1<f64>,
    parallel: bool,
) -> Array2<f64> {
    let coeffs: Vec<(f64, f64, f64)> = lines.outer_iter().map(line_coefficients).collect();
    let cos_t = theta.mapv(f64::cos);
    let sin_t = theta.mapv(f64::sin);

    let mut alpha = Array2::<f64>::zeros((lines.nrows(), theta.len()));
    let zip = Zip::indexed(&mut alpha);
    let eval = |(i, j): (usize, usize), a: &mut f64| {
        let (p, q, d) = coeffs[i];
        *a = ((p * cos_t[j] + q * sin_t[j]) / d).atan();
    };
    if parallel {
        zip.par_for_each(eval);
    } else {
        zip.for_each(eval);
    }
    alpha
}

/// Reduce a signed elevation matrix over its selected entries, per azimuth.
///
/// Returns `(alpha_1, alpha_2)` with
/// `alpha_1[j] = max(0, max_i alpha[i, j])` and
/// `alpha_2[j] = max(0, max_i −alpha[i, j])`, both over rows where
/// `mask[i, j]` holds. Unselected entries are skipped, and the accumulators
/// start at 0, which is the floor both reductions apply anyway.
pub fn masked_reduce(
    alpha: ArrayView2<f64>,
    mask: ArrayView2<bool>,
    parallel: bool,
) -> (Array1<f64>, Array1<f64>) {
    let num_azimuths = alpha.ncols();
    let mut alpha_1 = Array1::<f64>::zeros(num_azimuths);
    let mut alpha_2 = Array1::<f64>::zeros(num_azimuths);

    let zip = Zip::from(&mut alpha_1)
        .and(&mut alpha_2)
        .and(alpha.columns())
        .and(mask.columns());
    let reduce = |a1: &mut f64, a2: &mut f64, col: ArrayView1<f64>, sel: ArrayView1<bool>| {
        for (&a, &s) in col.iter().zip(sel.iter()) {
            if s {
                *a1 = a1.max(a);
                *a2 = a2.max(-a);
            }
        }
    };
    if parallel {
        zip.par_for_each(reduce);
    } else {
        zip.for_each(reduce);
    }
    (alpha_1, alpha_2)
}

/// Fold a partial reduction (e.g. from one block of lines) into running maxima.
pub fn merge_max(acc: &mut Array1<f64>, part: &Array1<f64>) {
    Zip::from(acc).and(part).for_each(|a, &p| *a = a.max(p));
}
