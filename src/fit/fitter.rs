//! The shared fitting capability and the objective both strategies minimize.
//!
//! Given:
//! - samples `(V_i, E_i)`
//! - a model kind and parameters `p`
//!
//! the residuals are `r_i = E_i - E(p, V_i)` and the objective is `Σ r_i²`.

use nalgebra::DVector;

use crate::domain::{FitConfig, FitResult, FitStrategy, ModelKind, ParameterVector, Sample};
use crate::error::EosError;
use crate::fit::lm::LeastSquaresFitter;
use crate::fit::surrogate::SurrogateOptimizer;
use crate::models::evaluate;

/// Minimum number of samples for a four-parameter fit.
pub const MIN_FIT_SAMPLES: usize = 4;

/// A strategy that refines an initial guess against a sample set.
pub trait ParameterFitter {
    fn strategy(&self) -> FitStrategy;

    /// Fit `model` to `samples` starting from `initial`.
    ///
    /// # Errors
    /// - [`EosError::InsufficientData`] / [`EosError::InvalidInput`] for unusable samples
    /// - [`EosError::InvalidConfig`] for out-of-range solver settings
    /// - [`EosError::Fit`] when the solver ends in the failed state
    fn fit(
        &self,
        model: ModelKind,
        initial: &ParameterVector,
        samples: &[Sample],
    ) -> Result<FitResult, EosError>;
}

/// Build the fitter selected by `config.strategy`.
pub fn build_fitter(config: &FitConfig) -> Box<dyn ParameterFitter + Sync> {
    match config.strategy {
        FitStrategy::LeastSquares => Box::new(LeastSquaresFitter::new(config.least_squares.clone())),
        FitStrategy::Surrogate => Box::new(SurrogateOptimizer::new(config.surrogate.clone())),
    }
}

/// Check that samples are usable for a full fit.
pub fn validate_samples(samples: &[Sample]) -> Result<(), EosError> {
    if samples.len() < MIN_FIT_SAMPLES {
        return Err(EosError::InsufficientData {
            what: "samples",
            needed: MIN_FIT_SAMPLES,
            found: samples.len(),
        });
    }
    if let Some(bad) = samples
        .iter()
        .find(|s| !(s.volume.is_finite() && s.energy.is_finite() && s.volume > 0.0))
    {
        return Err(EosError::InvalidInput(format!(
            "Sample (V={}, E={}) must have finite energy and finite volume > 0.",
            bad.volume, bad.energy
        )));
    }
    Ok(())
}

/// Residual vector `E_i - E(p, V_i)`.
pub fn residuals(model: ModelKind, p: &ParameterVector, samples: &[Sample]) -> Result<Vec<f64>, EosError> {
    samples
        .iter()
        .map(|s| evaluate(model, p, s.volume).map(|e| s.energy - e))
        .collect()
}

pub(crate) fn residual_vector(
    model: ModelKind,
    p: &DVector<f64>,
    samples: &[Sample],
) -> Result<DVector<f64>, EosError> {
    residuals(model, &to_params(p), samples).map(DVector::from_vec)
}

/// Sum of squared residuals.
pub fn sse(model: ModelKind, p: &ParameterVector, samples: &[Sample]) -> Result<f64, EosError> {
    Ok(residuals(model, p, samples)?.iter().map(|r| r * r).sum())
}

pub(crate) fn to_vector(p: &ParameterVector) -> DVector<f64> {
    DVector::from_row_slice(&p.to_array())
}

pub(crate) fn to_params(v: &DVector<f64>) -> ParameterVector {
    ParameterVector::new(v[0], v[1], v[2], v[3])
}
