//! Reporting utilities: residuals and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{FitResult, Sample, SampleResidual};
use crate::error::EosError;
use crate::models::FittedCurve;

/// Compute fitted values and residuals for each sample.
pub fn compute_residuals(samples: &[Sample], fit: &FitResult) -> Result<Vec<SampleResidual>, EosError> {
    let curve = FittedCurve::from(fit);
    samples
        .iter()
        .map(|s| {
            let energy_fit = curve.energy_at(s.volume)?;
            Ok(SampleResidual {
                sample: *s,
                energy_fit,
                residual: s.energy - energy_fit,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitDiagnostics, FitQuality, FitState, FitStrategy, ModelKind, ParameterVector};

    #[test]
    fn compute_residuals_basic() {
        let params = ParameterVector::new(-56.0, 0.5, 4.0, 16.0);
        let fit = FitResult {
            model: ModelKind::Murnaghan,
            strategy: FitStrategy::LeastSquares,
            params,
            state: FitState::Converged { params },
            quality: FitQuality::from_sse(0.0, 2, 4),
            diagnostics: FitDiagnostics::default(),
        };
        let samples = vec![Sample::new(16.0, -56.0), Sample::new(16.0, -55.0)];

        let residuals = compute_residuals(&samples, &fit).unwrap();
        assert_eq!(residuals.len(), 2);
        assert!(residuals[0].residual.abs() < 1e-12);
        assert!((residuals[1].residual - 1.0).abs() < 1e-12);
    }

    #[test]
    fn undefined_model_is_an_error() {
        let params = ParameterVector::new(-56.0, 0.5, 1.0, 16.0);
        let fit = FitResult {
            model: ModelKind::Vinet,
            strategy: FitStrategy::Surrogate,
            params,
            state: FitState::Converged { params },
            quality: FitQuality::from_sse(0.0, 1, 4),
            diagnostics: FitDiagnostics::default(),
        };
        assert!(compute_residuals(&[Sample::new(15.0, -56.0)], &fit).is_err());
    }
}
