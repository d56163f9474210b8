//! Symmetric positive-definite solves.

use nalgebra::{Cholesky, DMatrix, Dyn};

/// Diagonal jitter ladder, relative to the mean diagonal.
const JITTER_LADDER: [f64; 4] = [0.0, 1e-10, 1e-8, 1e-6];

/// Cholesky factorization that retries with increasing diagonal jitter.
///
/// Returns the factorization and the absolute jitter that was added, or `None`
/// if the matrix is not positive definite even with the largest jitter.
pub fn cholesky_with_jitter(a: &DMatrix<f64>) -> Option<(Cholesky<f64, Dyn>, f64)> {
    let n = a.nrows();
    if n == 0 || n != a.ncols() {
        return None;
    }
    let scale = (a.trace() / n as f64).abs().max(f64::MIN_POSITIVE);

    for &rel in &JITTER_LADDER {
        let jitter = rel * scale;
        let mut m = a.clone();
        for i in 0..n {
            m[(i, i)] += jitter;
        }
        if let Some(chol) = m.cholesky() {
            let diag_ok = (0..n).all(|i| {
                let d = chol.l_dirty()[(i, i)];
                d.is_finite() && d > 0.0
            });
            if diag_ok {
                return Some((chol, jitter));
            }
        }
    }
    None
}

/// Inverse of a symmetric positive-definite matrix.
pub fn spd_inverse(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let chol = a.clone().cholesky()?;
    let inv = chol.inverse();
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}
