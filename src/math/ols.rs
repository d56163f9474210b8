//! Linear least squares and polynomial fits.
//!
//! The initial-guess heuristic fits an ordinary quadratic to `(volume, energy)`:
//!
//! ```text
//! minimize Σ (E_i - (a V_i^2 + b V_i + c))^2
//! ```
//!
//! The design matrix is tiny (n × 3), so we solve it with SVD, which also copes
//! with tall (more rows than columns) systems.

use nalgebra::{DMatrix, DVector};

/// Singular values below this fraction of the largest are treated as zero.
const SVD_RCOND: f64 = 1e-12;

/// Solve a least squares problem using SVD.
///
/// Returns `None` for an all-zero design or a non-finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }
    let beta = svd.solve(y, SVD_RCOND * s_max).ok()?;
    beta.iter().all(|v| v.is_finite()).then_some(beta)
}

/// Vandermonde design matrix with columns `x^degree, ..., x, 1`.
pub fn vandermonde(x: &[f64], degree: usize) -> DMatrix<f64> {
    let cols = degree + 1;
    DMatrix::from_fn(x.len(), cols, |i, j| x[i].powi((degree - j) as i32))
}

/// Least-squares polynomial fit.
///
/// Coefficients are returned highest power first (`[a, b, c]` for a quadratic).
/// The caller is responsible for providing at least `degree + 1` distinct `x`.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    if x.len() != y.len() || x.len() <= degree {
        return None;
    }
    let design = vandermonde(x, degree);
    let rhs = DVector::from_column_slice(y);
    solve_least_squares(&design, &rhs).map(|beta| beta.iter().copied().collect())
}
