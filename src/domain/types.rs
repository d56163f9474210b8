//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - passed between the fitters without conversion
//! - exported to JSON/CSV
//! - reloaded later for plotting

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::fit::{LeastSquaresConfig, SurrogateConfig};

/// One `(volume, energy)` observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub volume: f64,
    pub energy: f64,
}

impl Sample {
    pub fn new(volume: f64, energy: f64) -> Self {
        Self { volume, energy }
    }
}

/// EOS parameters `(E0, B0, BP, V0)`.
///
/// When flattened (solver state, bounds, covariance rows) the order is always
/// `[E0, B0, BP, V0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    /// Equilibrium energy.
    pub e0: f64,
    /// Bulk modulus at `V0`.
    pub b0: f64,
    /// Pressure derivative of the bulk modulus.
    pub bp: f64,
    /// Equilibrium volume.
    pub v0: f64,
}

impl ParameterVector {
    pub const LEN: usize = 4;
    pub const NAMES: [&'static str; 4] = ["E0", "B0", "BP", "V0"];

    pub fn new(e0: f64, b0: f64, bp: f64, v0: f64) -> Self {
        Self { e0, b0, bp, v0 }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.e0, self.b0, self.bp, self.v0]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl From<[f64; 4]> for ParameterVector {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[E0={:.6}, B0={:.6}, BP={:.6}, V0={:.6}]",
            self.e0, self.b0, self.bp, self.v0
        )
    }
}

/// Concrete EOS form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Murnaghan,
    BirchMurnaghan,
    Vinet,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Murnaghan, ModelKind::BirchMurnaghan, ModelKind::Vinet];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Murnaghan => "Murnaghan",
            ModelKind::BirchMurnaghan => "Birch-Murnaghan",
            ModelKind::Vinet => "Vinet",
        }
    }

    /// Parameter count used by information criteria.
    pub fn param_count(self) -> usize {
        ParameterVector::LEN
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Which model(s) to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSpec {
    /// Fit every model kind and keep the one with the lowest BIC.
    Auto,
    Murnaghan,
    BirchMurnaghan,
    Vinet,
}

impl ModelSpec {
    pub fn kinds(self) -> Vec<ModelKind> {
        match self {
            ModelSpec::Auto => ModelKind::ALL.to_vec(),
            ModelSpec::Murnaghan => vec![ModelKind::Murnaghan],
            ModelSpec::BirchMurnaghan => vec![ModelKind::BirchMurnaghan],
            ModelSpec::Vinet => vec![ModelKind::Vinet],
        }
    }

    pub fn is_single(self) -> bool {
        !matches!(self, ModelSpec::Auto)
    }
}

/// Fitting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FitStrategy {
    /// Levenberg-Marquardt nonlinear least squares.
    #[value(name = "lsq")]
    LeastSquares,
    /// Gaussian-process Bayesian optimization over a bounded box.
    Surrogate,
}

impl fmt::Display for FitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStrategy::LeastSquares => f.write_str("least-squares"),
            FitStrategy::Surrogate => f.write_str("surrogate"),
        }
    }
}

/// Why a fitter ended in [`FitState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    MaxIterations,
    SingularUpdate,
    InvalidDomain,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MaxIterations => f.write_str("max iterations exceeded"),
            FailureReason::SingularUpdate => f.write_str("singular update"),
            FailureReason::InvalidDomain => f.write_str("invalid domain evaluation"),
        }
    }
}

/// Lifecycle of a single fit: `Initialized -> Fitting -> {Converged | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum FitState {
    Initialized,
    Fitting,
    Converged {
        params: ParameterVector,
    },
    Failed {
        last_iterate: ParameterVector,
        reason: FailureReason,
    },
}

impl FitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FitState::Converged { .. } | FitState::Failed { .. })
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_advance_to(&self, next: &FitState) -> bool {
        matches!(
            (self, next),
            (FitState::Initialized, FitState::Fitting)
                | (FitState::Fitting, FitState::Converged { .. })
                | (FitState::Fitting, FitState::Failed { .. })
        )
    }
}

/// The states a single fit has passed through, starting at `Initialized`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitLifecycle {
    state: FitState,
    history: Vec<FitState>,
}

impl Default for FitLifecycle {
    fn default() -> Self {
        Self {
            state: FitState::Initialized,
            history: vec![FitState::Initialized],
        }
    }
}

impl FitLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    /// Move to `next`. Leaving a terminal state, or skipping `Fitting`, is a bug.
    pub fn advance(&mut self, next: FitState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal fit transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.history.push(next);
    }

    pub fn history(&self) -> &[FitState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<FitState> {
        self.history
    }
}

/// Which stopping rule ended a successful fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Relative SSE reduction (actual and predicted) fell below `ftol`.
    Ftol,
    /// Relative step length fell below `xtol`.
    Xtol,
    /// Gradient inf-norm fell below `gtol`.
    Gtol,
    /// Residuals are exactly zero.
    ZeroResidual,
    /// Surrogate iteration budget used up.
    Budget,
    /// Surrogate best objective stopped improving.
    Stalled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Ftol => "ftol",
            StopReason::Xtol => "xtol",
            StopReason::Gtol => "gtol",
            StopReason::ZeroResidual => "zero residual",
            StopReason::Budget => "iteration budget",
            StopReason::Stalled => "stalled",
        };
        f.write_str(s)
    }
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub bic: f64,
    pub n: usize,
}

impl FitQuality {
    /// Build quality metrics from a sum of squared residuals.
    ///
    /// BIC = `n * ln(SSE/n) + k * ln(n)`. An exact fit (`SSE = 0`) is floored so
    /// the BIC stays finite.
    pub fn from_sse(sse: f64, n: usize, k: usize) -> Self {
        let nf = n.max(1) as f64;
        let rmse = (sse / nf).sqrt();
        let bic = nf * (sse.max(f64::MIN_POSITIVE) / nf).ln() + k as f64 * nf.ln();
        Self { sse, rmse, bic, n }
    }
}

/// Solver-specific diagnostics attached to a fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub iterations: usize,
    /// Number of objective/model evaluations over the whole sample set.
    pub evaluations: usize,
    pub stop_reason: Option<StopReason>,
    /// `energy_obs - energy_fit` per sample, in input order.
    pub residuals: Vec<f64>,
    /// Parameter covariance `s^2 (J^T J)^-1` (least squares only).
    pub covariance: Option<Vec<Vec<f64>>>,
    pub std_errors: Option<Vec<f64>>,
    /// Best-so-far objective after the initial design and after each
    /// iteration (surrogate only).
    pub best_history: Vec<f64>,
    /// Lifecycle states in the order the fitter entered them.
    #[serde(default)]
    pub transitions: Vec<FitState>,
}

/// Output of a single fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub model: ModelKind,
    pub strategy: FitStrategy,
    pub params: ParameterVector,
    pub state: FitState,
    pub quality: FitQuality,
    pub diagnostics: FitDiagnostics,
}

/// Physical quantities derived from fitted parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedQuantities {
    /// Bulk modulus in GPa, assuming eV and Å^3 inputs.
    pub b0_gpa: f64,
    /// `V0^(1/3)`.
    pub cube_root_v0: f64,
    /// Conventional fcc lattice constant for a primitive-cell volume `V0`.
    pub fcc_lattice_constant: f64,
}

/// Summary stats about the samples used for fitting.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_points: usize,
    pub volume_min: f64,
    pub volume_max: f64,
    pub energy_min: f64,
    pub energy_max: f64,
}

/// A per-sample fitted result (used for reports and exports).
#[derive(Debug, Clone)]
pub struct SampleResidual {
    pub sample: Sample,
    pub energy_fit: f64,
    pub residual: f64,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// CSV with `volume,energy` columns; `None` uses the built-in dataset.
    pub data_path: Option<PathBuf>,
    pub model_spec: ModelSpec,
    pub strategy: FitStrategy,
    pub least_squares: LeastSquaresConfig,
    pub surrogate: SurrogateConfig,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,

    pub export_results: Option<PathBuf>,
    pub export_curve: Option<PathBuf>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            model_spec: ModelSpec::Murnaghan,
            strategy: FitStrategy::LeastSquares,
            least_squares: LeastSquaresConfig::default(),
            surrogate: SurrogateConfig::default(),
            plot: true,
            plot_width: 80,
            plot_height: 20,
            export_results: None,
            export_curve: None,
        }
    }
}

/// A saved curve file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub generated: DateTime<Local>,
    pub model: ModelKind,
    pub strategy: FitStrategy,
    pub params: ParameterVector,
    pub fit_quality: FitQuality,
    pub derived: DerivedQuantities,
    pub grid: CurveGrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveGrid {
    pub volume: Vec<f64>,
    pub energy: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_vector_array_order() {
        let p = ParameterVector::new(-56.0, 0.5, 4.0, 16.0);
        assert_eq!(p.to_array(), [-56.0, 0.5, 4.0, 16.0]);
        assert_eq!(ParameterVector::from(p.to_array()), p);
    }

    #[test]
    fn bic_is_finite_for_exact_fit() {
        let q = FitQuality::from_sse(0.0, 5, 4);
        assert!(q.bic.is_finite());
        assert_eq!(q.rmse, 0.0);
    }

    #[test]
    fn auto_spec_expands_to_every_kind() {
        assert_eq!(ModelSpec::Auto.kinds().len(), ModelKind::ALL.len());
        assert!(!ModelSpec::Auto.is_single());
        assert_eq!(ModelSpec::Vinet.kinds(), vec![ModelKind::Vinet]);
    }

    #[test]
    fn lifecycle_records_states_in_order() {
        let p = ParameterVector::new(-1.0, 1.0, 4.0, 10.0);
        let mut life = FitLifecycle::new();
        assert_eq!(life.state(), FitState::Initialized);
        life.advance(FitState::Fitting);
        assert!(!life.state().is_terminal());
        life.advance(FitState::Converged { params: p });
        assert!(life.state().is_terminal());
        assert_eq!(
            life.into_history(),
            vec![FitState::Initialized, FitState::Fitting, FitState::Converged { params: p }]
        );
    }

    #[test]
    fn only_lifecycle_edges_are_legal() {
        let p = ParameterVector::new(-1.0, 1.0, 4.0, 10.0);
        let failed = FitState::Failed {
            last_iterate: p,
            reason: FailureReason::SingularUpdate,
        };
        assert!(FitState::Fitting.can_advance_to(&failed));
        assert!(!FitState::Initialized.can_advance_to(&failed));
        assert!(!FitState::Initialized.can_advance_to(&FitState::Converged { params: p }));
        assert!(!failed.can_advance_to(&FitState::Fitting));
        assert!(!FitState::Fitting.can_advance_to(&FitState::Initialized));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal fit transition")]
    fn skipping_fitting_panics_in_debug() {
        let mut life = FitLifecycle::new();
        life.advance(FitState::Converged {
            params: ParameterVector::new(-1.0, 1.0, 4.0, 10.0),
        });
    }
}
