//! Analytic initial guess from a quadratic pre-fit.
//!
//! Near its minimum any of the EOS forms looks like a parabola in `V`:
//!
//! ```text
//! E(V) ≈ a V^2 + b V + c
//! V0 = -b / (2a)
//! E0 = a V0^2 + b V0 + c
//! B0 = V0 * E''(V0) = 2a V0
//! BP = 4
//! ```

use log::debug;

use crate::domain::{ParameterVector, Sample};
use crate::error::EosError;
use crate::math::polyfit;

/// Pressure derivative of the bulk modulus used for every initial guess.
pub const DEFAULT_BP: f64 = 4.0;

/// Minimum number of distinct volumes for the quadratic pre-fit.
pub const MIN_DISTINCT_VOLUMES: usize = 3;

/// Derive `(E0, B0, BP, V0)` from a least-squares quadratic through the samples.
///
/// # Errors
/// - [`EosError::InsufficientData`] with fewer than three distinct volumes
/// - [`EosError::InvalidInput`] for non-finite samples, or when the quadratic
///   has no vertex
pub fn initial_guess(samples: &[Sample]) -> Result<ParameterVector, EosError> {
    if samples
        .iter()
        .any(|s| !(s.volume.is_finite() && s.energy.is_finite()))
    {
        return Err(EosError::InvalidInput(
            "Initial guess needs finite volumes and energies.".to_string(),
        ));
    }

    let distinct = count_distinct_volumes(samples);
    if distinct < MIN_DISTINCT_VOLUMES {
        return Err(EosError::InsufficientData {
            what: "distinct volumes",
            needed: MIN_DISTINCT_VOLUMES,
            found: distinct,
        });
    }

    let volumes: Vec<f64> = samples.iter().map(|s| s.volume).collect();
    let energies: Vec<f64> = samples.iter().map(|s| s.energy).collect();
    let coeffs = polyfit(&volumes, &energies, 2).ok_or_else(|| {
        EosError::InvalidInput("Quadratic pre-fit is too ill-conditioned to solve.".to_string())
    })?;
    let (a, b, c) = (coeffs[0], coeffs[1], coeffs[2]);

    if a == 0.0 || !a.is_finite() {
        return Err(EosError::InvalidInput(format!(
            "Quadratic pre-fit has no vertex (a={a})."
        )));
    }

    let v0 = -b / (2.0 * a);
    let e0 = a * v0 * v0 + b * v0 + c;
    let b0 = 2.0 * a * v0;
    let guess = ParameterVector::new(e0, b0, DEFAULT_BP, v0);
    if !guess.is_finite() {
        return Err(EosError::InvalidInput(format!(
            "Quadratic pre-fit produced a non-finite guess {guess}."
        )));
    }

    debug!("quadratic pre-fit a={a:.6e} b={b:.6e} c={c:.6e} -> {guess}");
    Ok(guess)
}

fn count_distinct_volumes(samples: &[Sample]) -> usize {
    let mut vols: Vec<f64> = samples.iter().map(|s| s.volume).collect();
    vols.sort_by(f64::total_cmp);
    vols.dedup();
    vols.len()
}
