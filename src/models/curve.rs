//! A fitted EOS as an evaluable curve.

use crate::domain::{FitResult, ModelKind, ParameterVector};
use crate::error::EosError;
use crate::models::model::{evaluate, pressure};

/// Fitted model plus parameters, callable at arbitrary volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedCurve {
    pub model: ModelKind,
    pub params: ParameterVector,
}

impl FittedCurve {
    pub fn new(model: ModelKind, params: ParameterVector) -> Self {
        Self { model, params }
    }

    pub fn energy_at(&self, volume: f64) -> Result<f64, EosError> {
        evaluate(self.model, &self.params, volume)
    }

    pub fn pressure_at(&self, volume: f64) -> Result<f64, EosError> {
        pressure(self.model, &self.params, volume)
    }

    /// Sample `n` evenly spaced `(volume, energy)` points on `[v_min, v_max]`.
    ///
    /// `n` is raised to at least 2 so both endpoints are included.
    pub fn sample(&self, v_min: f64, v_max: f64, n: usize) -> Result<Vec<(f64, f64)>, EosError> {
        if !(v_min.is_finite() && v_max.is_finite() && v_max > v_min) {
            return Err(EosError::InvalidInput(format!(
                "Invalid volume range: [{v_min}, {v_max}] (must be finite with max > min)."
            )));
        }
        let n = n.max(2);
        (0..n)
            .map(|i| {
                let u = i as f64 / (n as f64 - 1.0);
                let v = v_min + u * (v_max - v_min);
                self.energy_at(v).map(|e| (v, e))
            })
            .collect()
    }
}

impl From<&FitResult> for FittedCurve {
    fn from(fit: &FitResult) -> Self {
        Self::new(fit.model, fit.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_includes_endpoints() {
        let curve = FittedCurve::new(ModelKind::Murnaghan, ParameterVector::new(-56.47, 0.57, 2.74, 16.56));
        let pts = curve.sample(13.0, 19.0, 7).unwrap();
        assert_eq!(pts.len(), 7);
        assert!((pts[0].0 - 13.0).abs() < 1e-12);
        assert!((pts[6].0 - 19.0).abs() < 1e-12);
        assert_eq!(pts[3].1, curve.energy_at(16.0).unwrap());
    }

    #[test]
    fn sample_rejects_empty_range() {
        let curve = FittedCurve::new(ModelKind::Vinet, ParameterVector::new(0.0, 1.0, 4.0, 10.0));
        assert!(curve.sample(5.0, 5.0, 10).is_err());
    }
}
